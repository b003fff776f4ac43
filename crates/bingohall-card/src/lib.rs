//! Card generation and pattern validation.
//!
//! Both halves are pure: [`generate`] is a function of the mode and a
//! random source, [`is_winning`] a function of the grid, its marks, and
//! the pattern. Neither touches room state, which keeps them trivially
//! testable and safe to call while a room lock is held.

mod generator;
mod pattern;

pub use generator::{column_range, generate, initial_marks, is_valid};
pub use pattern::{Segment, is_winning, winning_segments};
