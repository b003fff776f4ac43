//! Randomized card generation for 75-ball and 90-ball bingo.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use bingohall_protocol::{Cell, GameMode, Grid, Marks, Position};
use rand::Rng;
use rand::seq::index;

/// Numbers each row of a 90-ball card carries.
const NINETY_NUMBERS_PER_ROW: usize = 5;

/// The fixed range column `col` draws from.
///
/// 75-ball: column *k* is `15k+1 ..= 15k+15` (B 1–15, I 16–30, ...).
/// 90-ball: `1..=9`, then `10k ..= 10k+9`, with the last column
/// stretching to `80..=90`.
pub fn column_range(mode: GameMode, col: usize) -> RangeInclusive<u8> {
    let col = col as u8;
    match mode {
        GameMode::Seventy5 => (15 * col + 1)..=(15 * col + 15),
        GameMode::Ninety => match col {
            0 => 1..=9,
            8 => 80..=90,
            c => (10 * c)..=(10 * c + 9),
        },
    }
}

/// Draws `amount` distinct numbers from `range`.
fn distinct_from<R: Rng + ?Sized>(rng: &mut R, range: RangeInclusive<u8>, amount: usize) -> Vec<u8> {
    let start = *range.start();
    let len = usize::from(*range.end() - start) + 1;
    index::sample(rng, len, amount)
        .into_iter()
        .map(|i| start + i as u8)
        .collect()
}

/// Generates a fresh card for `mode`.
pub fn generate<R: Rng + ?Sized>(mode: GameMode, rng: &mut R) -> Grid {
    match mode {
        GameMode::Seventy5 => generate_seventy5(rng),
        GameMode::Ninety => generate_ninety(rng),
    }
}

fn generate_seventy5<R: Rng + ?Sized>(rng: &mut R) -> Grid {
    let mut cells = [[Cell::Empty; 5]; 5];
    for col in 0..5 {
        let numbers = distinct_from(rng, column_range(GameMode::Seventy5, col), 5);
        for (row, n) in numbers.into_iter().enumerate() {
            cells[row][col] = Cell::Number(n);
        }
    }
    cells[2][2] = Cell::Free;
    Grid::Seventy5(cells)
}

fn generate_ninety<R: Rng + ?Sized>(rng: &mut R) -> Grid {
    // Each row independently picks which 5 of the 9 columns it fills.
    let mut filled = [[false; 9]; 3];
    for row in filled.iter_mut() {
        for col in index::sample(rng, 9, NINETY_NUMBERS_PER_ROW) {
            row[col] = true;
        }
    }

    let mut cells = [[Cell::Empty; 9]; 3];
    for col in 0..9 {
        let rows: Vec<usize> = (0..3).filter(|&r| filled[r][col]).collect();
        if rows.is_empty() {
            continue;
        }
        let mut numbers = distinct_from(rng, column_range(GameMode::Ninety, col), rows.len());
        numbers.sort_unstable();
        for (row, n) in rows.into_iter().zip(numbers) {
            cells[row][col] = Cell::Number(n);
        }
    }
    Grid::Ninety(cells)
}

/// Checks that a grid is well formed for its mode: every number lies in
/// its column's range, no column repeats a value, 75-ball cards have
/// exactly the center FREE, and 90-ball rows each carry five numbers.
pub fn is_valid(grid: &Grid) -> bool {
    let mode = grid.mode();
    let (rows, cols) = mode.dimensions();

    for col in 0..cols {
        let range = column_range(mode, col);
        let mut seen = HashSet::new();
        for row in 0..rows {
            let pos = Position::new(row as u8, col as u8);
            match grid.cell(pos) {
                Some(Cell::Number(n)) => {
                    if !range.contains(&n) || !seen.insert(n) {
                        return false;
                    }
                }
                Some(Cell::Free) => {
                    if mode != GameMode::Seventy5 || (row, col) != (2, 2) {
                        return false;
                    }
                }
                Some(Cell::Empty) => {
                    if mode == GameMode::Seventy5 {
                        return false;
                    }
                }
                None => return false,
            }
        }
    }

    match mode {
        GameMode::Seventy5 => grid.cell(Position::new(2, 2)) == Some(Cell::Free),
        GameMode::Ninety => (0..rows).all(|r| {
            grid.row(r).is_some_and(|cells| {
                cells.iter().filter(|c| c.number().is_some()).count() == NINETY_NUMBERS_PER_ROW
            })
        }),
    }
}

/// The marks a card starts with: its FREE cells.
pub fn initial_marks(grid: &Grid) -> Marks {
    let mut marks = Marks::new();
    for (pos, cell) in grid.cells() {
        if cell == Cell::Free {
            marks.mark(pos);
        }
    }
    marks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_column_ranges() {
        assert_eq!(column_range(GameMode::Seventy5, 0), 1..=15);
        assert_eq!(column_range(GameMode::Seventy5, 4), 61..=75);
        assert_eq!(column_range(GameMode::Ninety, 0), 1..=9);
        assert_eq!(column_range(GameMode::Ninety, 3), 30..=39);
        assert_eq!(column_range(GameMode::Ninety, 8), 80..=90);
    }

    #[test]
    fn test_generated_cards_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(is_valid(&generate(GameMode::Seventy5, &mut rng)));
            assert!(is_valid(&generate(GameMode::Ninety, &mut rng)));
        }
    }

    #[test]
    fn test_seventy5_center_is_free_and_premarked() {
        let mut rng = StdRng::seed_from_u64(1);
        let grid = generate(GameMode::Seventy5, &mut rng);
        assert_eq!(grid.cell(Position::new(2, 2)), Some(Cell::Free));
        assert_eq!(grid.numbers().count(), 24);

        let marks = initial_marks(&grid);
        assert!(marks.is_marked(Position::new(2, 2)));
        assert_eq!(marks.count(), 1);
    }

    #[test]
    fn test_ninety_rows_hold_five_numbers_each() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..100 {
            let grid = generate(GameMode::Ninety, &mut rng);
            for r in 0..3 {
                let row = grid.row(r).unwrap();
                assert_eq!(row.iter().filter(|c| c.number().is_some()).count(), 5);
                assert_eq!(row.iter().filter(|c| c.is_empty()).count(), 4);
            }
            assert_eq!(initial_marks(&grid).count(), 0);
        }
    }

    #[test]
    fn test_ninety_columns_ascend_top_to_bottom() {
        let mut rng = StdRng::seed_from_u64(3);
        let grid = generate(GameMode::Ninety, &mut rng);
        for col in 0..9u8 {
            let column: Vec<u8> = (0..3u8)
                .filter_map(|r| grid.cell(Position::new(r, col)).and_then(Cell::number))
                .collect();
            assert!(column.windows(2).all(|w| w[0] < w[1]), "column {col}: {column:?}");
        }
    }

    #[test]
    fn test_is_valid_rejects_out_of_range_and_duplicates() {
        let mut rng = StdRng::seed_from_u64(5);
        let Grid::Seventy5(mut cells) = generate(GameMode::Seventy5, &mut rng) else {
            unreachable!()
        };
        cells[0][0] = Cell::Number(16); // belongs to column 1
        assert!(!is_valid(&Grid::Seventy5(cells)));

        let Grid::Seventy5(mut cells) = generate(GameMode::Seventy5, &mut rng) else {
            unreachable!()
        };
        cells[1][0] = cells[0][0];
        assert!(!is_valid(&Grid::Seventy5(cells)));
    }
}
