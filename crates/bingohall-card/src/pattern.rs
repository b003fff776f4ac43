//! Win-pattern evaluation.
//!
//! Everything here is a pure function of `(grid, marks, pattern)`. A cell
//! counts as satisfied when it is FREE, an empty placeholder, or marked.
//! Placeholders never block a pattern, but a segment made only of
//! placeholders does not win on its own.

use bingohall_protocol::{Cell, GameMode, Grid, Marks, PatternType, Position};
use serde::{Deserialize, Serialize};

/// A completed piece of a card, reported alongside a win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Segment {
    Row(u8),
    Column(u8),
    /// Top-left to bottom-right (75-ball only).
    Diagonal,
    /// Top-right to bottom-left (75-ball only).
    AntiDiagonal,
    Corners,
    FullCard,
}

fn satisfied(grid: &Grid, marks: &Marks, pos: Position) -> bool {
    match grid.cell(pos) {
        Some(Cell::Free) | Some(Cell::Empty) => true,
        Some(Cell::Number(_)) => marks.is_marked(pos),
        None => false,
    }
}

/// A segment wins when every cell is satisfied and at least one cell is
/// more than a placeholder.
fn complete(grid: &Grid, marks: &Marks, cells: &[Position]) -> bool {
    let all_satisfied = cells.iter().all(|&pos| satisfied(grid, marks, pos));
    let has_content = cells
        .iter()
        .any(|&pos| grid.cell(pos).is_some_and(|c| !c.is_empty()));
    all_satisfied && has_content
}

fn line_candidates(grid: &Grid) -> Vec<(Segment, Vec<Position>)> {
    let (rows, cols) = (grid.rows() as u8, grid.cols() as u8);
    let mut out = Vec::with_capacity(usize::from(rows + cols) + 2);

    for r in 0..rows {
        out.push((Segment::Row(r), (0..cols).map(|c| Position::new(r, c)).collect()));
    }
    for c in 0..cols {
        out.push((Segment::Column(c), (0..rows).map(|r| Position::new(r, c)).collect()));
    }
    if grid.mode() == GameMode::Seventy5 {
        let n = rows;
        out.push((Segment::Diagonal, (0..n).map(|i| Position::new(i, i)).collect()));
        out.push((
            Segment::AntiDiagonal,
            (0..n).map(|i| Position::new(i, n - 1 - i)).collect(),
        ));
    }
    out
}

fn corners(grid: &Grid) -> [Position; 4] {
    let (last_row, last_col) = (grid.rows() as u8 - 1, grid.cols() as u8 - 1);
    [
        Position::new(0, 0),
        Position::new(0, last_col),
        Position::new(last_row, 0),
        Position::new(last_row, last_col),
    ]
}

/// Every segment of `grid` that satisfies `pattern` under `marks`.
///
/// For [`PatternType::Line`] this lists each completed row, column, and
/// diagonal. The other patterns yield at most one segment.
pub fn winning_segments(grid: &Grid, marks: &Marks, pattern: PatternType) -> Vec<Segment> {
    match pattern {
        PatternType::Line => line_candidates(grid)
            .into_iter()
            .filter(|(_, cells)| complete(grid, marks, cells))
            .map(|(segment, _)| segment)
            .collect(),
        PatternType::Corners => {
            if complete(grid, marks, &corners(grid)) {
                vec![Segment::Corners]
            } else {
                Vec::new()
            }
        }
        PatternType::FullCard => {
            let all_marked = grid
                .numbers()
                .all(|(pos, _)| marks.is_marked(pos));
            if all_marked {
                vec![Segment::FullCard]
            } else {
                Vec::new()
            }
        }
    }
}

/// Returns `true` if `marks` on `grid` satisfy `pattern`.
pub fn is_winning(grid: &Grid, marks: &Marks, pattern: PatternType) -> bool {
    !winning_segments(grid, marks, pattern).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate, initial_marks};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn card75() -> Grid {
        generate(GameMode::Seventy5, &mut StdRng::seed_from_u64(11))
    }

    fn mark_all(grid: &Grid, marks: &mut Marks, positions: impl IntoIterator<Item = Position>) {
        for pos in positions {
            if grid.cell(pos).and_then(Cell::number).is_some() {
                marks.mark(pos);
            }
        }
    }

    #[test]
    fn test_fresh_card_wins_nothing() {
        let grid = card75();
        let marks = initial_marks(&grid);
        for pattern in [PatternType::Line, PatternType::Corners, PatternType::FullCard] {
            assert!(!is_winning(&grid, &marks, pattern), "{pattern:?}");
        }
    }

    #[test]
    fn test_row_line_wins() {
        let grid = card75();
        let mut marks = initial_marks(&grid);
        mark_all(&grid, &mut marks, (0..5).map(|c| Position::new(0, c)));
        assert_eq!(winning_segments(&grid, &marks, PatternType::Line), vec![Segment::Row(0)]);
    }

    #[test]
    fn test_middle_row_uses_free_center() {
        let grid = card75();
        let mut marks = initial_marks(&grid);
        // Four marks plus the FREE cell.
        mark_all(&grid, &mut marks, [0, 1, 3, 4].map(|c| Position::new(2, c)));
        assert_eq!(marks.count(), 5);
        assert!(is_winning(&grid, &marks, PatternType::Line));
    }

    #[test]
    fn test_diagonals_win_on_seventy5() {
        let grid = card75();
        let mut marks = initial_marks(&grid);
        mark_all(&grid, &mut marks, (0..5).map(|i| Position::new(i, 4 - i)));
        assert_eq!(
            winning_segments(&grid, &marks, PatternType::Line),
            vec![Segment::AntiDiagonal]
        );
    }

    #[test]
    fn test_one_unmarked_cell_in_every_line_is_not_a_win() {
        // One hole per row and per column, with (0,0) on the diagonal and
        // (1,3) on the anti-diagonal.
        let grid = card75();
        let holes = [
            Position::new(0, 0),
            Position::new(1, 3),
            Position::new(2, 1),
            Position::new(3, 4),
            Position::new(4, 2),
        ];
        let mut marks = initial_marks(&grid);
        mark_all(&grid, &mut marks, grid.positions().filter(|p| !holes.contains(p)));

        assert!(!is_winning(&grid, &marks, PatternType::Line));
        assert!(!is_winning(&grid, &marks, PatternType::FullCard));
        assert!(!is_winning(&grid, &marks, PatternType::Corners));
    }

    #[test]
    fn test_corners_and_full_card() {
        let grid = card75();
        let mut marks = initial_marks(&grid);
        mark_all(&grid, &mut marks, corners(&grid));
        assert_eq!(
            winning_segments(&grid, &marks, PatternType::Corners),
            vec![Segment::Corners]
        );
        assert!(!is_winning(&grid, &marks, PatternType::FullCard));

        mark_all(&grid, &mut marks, grid.positions());
        assert!(is_winning(&grid, &marks, PatternType::FullCard));
        // Five rows, five columns, two diagonals.
        assert_eq!(winning_segments(&grid, &marks, PatternType::Line).len(), 12);
    }

    #[test]
    fn test_ninety_placeholders_never_block() {
        let grid = generate(GameMode::Ninety, &mut StdRng::seed_from_u64(21));
        let mut marks = initial_marks(&grid);
        mark_all(&grid, &mut marks, (0..9).map(|c| Position::new(1, c)));

        let segments = winning_segments(&grid, &marks, PatternType::Line);
        assert!(segments.contains(&Segment::Row(1)));
        assert!(!segments.contains(&Segment::Diagonal));
        assert!(!is_winning(&grid, &marks, PatternType::FullCard));
    }

    #[test]
    fn test_ninety_all_placeholder_segment_does_not_win() {
        let mut cells = [[Cell::Empty; 9]; 3];
        for (r, row) in cells.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate().take(5) {
                *cell = Cell::Number((c as u8) * 10 + r as u8 + 1);
            }
        }
        let grid = Grid::Ninety(cells);
        let marks = Marks::new();
        // Columns 5..9 are entirely empty placeholders.
        assert!(!is_winning(&grid, &marks, PatternType::Line));
        // Corners (0,8) and (2,8) are empty but (0,0) and (2,0) are not.
        assert!(!is_winning(&grid, &marks, PatternType::Corners));
    }

    #[test]
    fn test_ninety_single_number_column_is_a_line() {
        // Column 0 holds one number over two placeholders. Corner (2,8)
        // is a number so the corners pattern stays open.
        let mut cells = [[Cell::Empty; 9]; 3];
        let filled: [&[usize]; 3] = [&[0, 1, 2, 3, 4], &[1, 2, 3, 4, 5], &[2, 3, 4, 5, 8]];
        for (r, cols) in filled.iter().enumerate() {
            for &c in cols.iter() {
                cells[r][c] = Cell::Number((c as u8) * 10 + r as u8 + 1);
            }
        }
        let grid = Grid::Ninety(cells);

        let mut marks = Marks::new();
        marks.mark(Position::new(0, 0));

        assert_eq!(marks.count(), 1);
        assert_eq!(
            winning_segments(&grid, &marks, PatternType::Line),
            vec![Segment::Column(0)]
        );
        assert!(!is_winning(&grid, &marks, PatternType::Corners));
        assert!(!is_winning(&grid, &marks, PatternType::FullCard));
    }

    #[test]
    fn test_marks_off_the_grid_are_ignored() {
        let grid = generate(GameMode::Ninety, &mut StdRng::seed_from_u64(2));
        let mut marks = Marks::new();
        marks.mark(Position::new(4, 0));
        marks.mark(Position::new(3, 8));
        assert!(!is_winning(&grid, &marks, PatternType::Line));
    }
}
