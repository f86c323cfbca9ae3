//! Schelling-style residential segregation on a square grid.
//!
//! [`engine::Engine`] owns the grid and moves dissatisfied agents round by
//! round; [`measures::Measures`] quantifies the segregation of any grid
//! snapshot.

pub mod config;
pub mod engine;
pub mod grid;
pub mod income;
pub mod measures;
pub mod model;
pub mod report;
pub mod stats;
