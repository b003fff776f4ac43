//! Card grid data: cells, positions, and mark sets.
//!
//! A grid is a fixed-size 2D array of tagged [`Cell`]s. Nothing here
//! compares against sentinel strings: a cell is `Empty`, `Free`, or
//! carries its number.

use serde::{Deserialize, Serialize};

use crate::GameMode;

/// One cell of a bingo card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "number", rename_all = "snake_case")]
pub enum Cell {
    /// Unpopulated placeholder (90-ball cards only).
    Empty,
    /// The permanently marked center of a 75-ball card.
    Free,
    /// A callable number.
    Number(u8),
}

impl Cell {
    /// The number in this cell, if any.
    pub fn number(self) -> Option<u8> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    /// `true` for `Empty`.
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A `(row, col)` coordinate on a card, zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

impl Position {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The immutable layout of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "cells")]
pub enum Grid {
    #[serde(rename = "75")]
    Seventy5([[Cell; 5]; 5]),
    #[serde(rename = "90")]
    Ninety([[Cell; 9]; 3]),
}

impl Grid {
    /// The mode this grid belongs to.
    pub fn mode(&self) -> GameMode {
        match self {
            Self::Seventy5(_) => GameMode::Seventy5,
            Self::Ninety(_) => GameMode::Ninety,
        }
    }

    pub fn rows(&self) -> usize {
        self.mode().dimensions().0
    }

    pub fn cols(&self) -> usize {
        self.mode().dimensions().1
    }

    /// Returns `true` if `pos` lies on this grid.
    pub fn contains(&self, pos: Position) -> bool {
        usize::from(pos.row) < self.rows() && usize::from(pos.col) < self.cols()
    }

    /// The cell at `pos`, or `None` if off the grid.
    pub fn cell(&self, pos: Position) -> Option<Cell> {
        self.row(usize::from(pos.row))
            .and_then(|row| row.get(usize::from(pos.col)))
            .copied()
    }

    /// One row of cells.
    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        match self {
            Self::Seventy5(cells) => cells.get(row).map(|r| r.as_slice()),
            Self::Ninety(cells) => cells.get(row).map(|r| r.as_slice()),
        }
    }

    /// Every position, row-major.
    pub fn positions(&self) -> impl Iterator<Item = Position> + use<> {
        let (rows, cols) = (self.rows() as u8, self.cols() as u8);
        (0..rows).flat_map(move |r| (0..cols).map(move |c| Position::new(r, c)))
    }

    /// Every `(position, cell)` pair, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (Position, Cell)> + '_ {
        self.positions()
            .filter_map(move |pos| self.cell(pos).map(|cell| (pos, cell)))
    }

    /// Every numbered cell, row-major.
    pub fn numbers(&self) -> impl Iterator<Item = (Position, u8)> + '_ {
        self.cells()
            .filter_map(|(pos, cell)| cell.number().map(|n| (pos, n)))
    }

    /// Where `number` sits on this card, if it does.
    pub fn find(&self, number: u8) -> Option<Position> {
        self.numbers().find(|&(_, n)| n == number).map(|(pos, _)| pos)
    }
}

/// The set of marked positions on a card.
///
/// Stored as a bitset with a fixed stride of 9 columns so the same type
/// covers both grid shapes (5×5 and 3×9 both fit in 45 bits). Positions
/// outside that range are never marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marks(u64);

impl Marks {
    const STRIDE: u8 = 9;
    const MAX_ROWS: u8 = 5;

    /// An empty mark set.
    pub fn new() -> Self {
        Self(0)
    }

    fn bit(pos: Position) -> Option<u64> {
        if pos.row >= Self::MAX_ROWS || pos.col >= Self::STRIDE {
            return None;
        }
        Some(1u64 << (u32::from(pos.row) * u32::from(Self::STRIDE) + u32::from(pos.col)))
    }

    /// Marks `pos`. Returns `true` if it was not marked before.
    pub fn mark(&mut self, pos: Position) -> bool {
        match Self::bit(pos) {
            Some(bit) => {
                let fresh = self.0 & bit == 0;
                self.0 |= bit;
                fresh
            }
            None => false,
        }
    }

    pub fn is_marked(&self, pos: Position) -> bool {
        Self::bit(pos).is_some_and(|bit| self.0 & bit != 0)
    }

    /// Number of marked positions.
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Marked positions in row-major order.
    pub fn positions(&self) -> Vec<Position> {
        (0..Self::MAX_ROWS)
            .flat_map(|r| (0..Self::STRIDE).map(move |c| Position::new(r, c)))
            .filter(|&pos| self.is_marked(pos))
            .collect()
    }
}
