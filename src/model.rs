//! Agent model variants.
//!
//! A [`Model`] knows how to populate a grid and how satisfied an agent is
//! with its neighbourhood. The two variants are dispatched by matching so each
//! keeps its own rules.

use crate::config::{Config, IncomeConfig};
use crate::grid::{Agent, Cell, Grid, N_GROUPS};
use crate::income::{self, Calibration};
use anyhow::{Context, Result};
use rand::prelude::*;

/// Largest possible difference between two income groups.
const MAX_GROUP_DIFF: f64 = (N_GROUPS - 1) as f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Model {
    /// Agents only care about the type of their neighbours.
    Simple,
    /// Agents care about both the type and the income group of their neighbours.
    Income(IncomeConfig),
}

impl Model {
    pub fn from_config(cfg: &Config) -> Self {
        match cfg.model.income {
            None => Model::Simple,
            Some(income) => Model::Income(income),
        }
    }

    pub fn is_income(&self) -> bool {
        matches!(self, Model::Income(_))
    }

    /// Satisfaction of the agent at `(row, col)` with its 8-connected neighbourhood.
    ///
    /// Empty cells and agents without neighbours score 1.
    pub fn satisfaction(&self, grid: &Grid, row: usize, col: usize) -> f64 {
        let Some(agt) = grid.get(row, col).agent() else {
            return 1.0;
        };

        let mut n_nbrs = 0;
        let mut score = 0.0;
        for nbr in grid.moore_neighbours(row, col) {
            n_nbrs += 1;
            let same_kind = if nbr.kind() == agt.kind() { 1.0 } else { 0.0 };
            score += match self {
                Model::Simple => same_kind,
                Model::Income(_) => {
                    let group_diff = nbr.group().abs_diff(agt.group()) as f64;
                    same_kind + 1.0 - group_diff / MAX_GROUP_DIFF
                }
            };
        }
        if n_nbrs == 0 {
            return 1.0;
        }

        match self {
            Model::Simple => score / n_nbrs as f64,
            Model::Income(_) => score / (2 * n_nbrs) as f64,
        }
    }

    /// Build a randomly placed population for `cfg`.
    ///
    /// Returns the grid and, for the income model, the calibration it was built from.
    pub fn populate<R: Rng>(
        &self,
        cfg: &Config,
        rng: &mut R,
    ) -> Result<(Grid, Option<Calibration>)> {
        let n_types = cfg.model.n_types;
        let n_agents = cfg.n_agents();

        let (mut cells, calibration) = match self {
            Model::Simple => (simple_agents(n_types, n_agents, rng), None),
            Model::Income(_) if n_agents == 0 => (Vec::new(), None),
            Model::Income(income) => {
                let calibration =
                    income::calibrate(income.mean_income, income.gini, n_agents, rng)
                        .context("failed to calibrate incomes")?;
                let cells = income_agents(n_types, n_agents, &calibration.counts);
                (cells, Some(calibration))
            }
        };

        cells.resize(n_agents + cfg.n_empty(), Cell::Empty);
        cells.shuffle(rng);

        let grid = Grid::from_cells(cfg.grid.size, cells).context("population has wrong size")?;
        Ok((grid, calibration))
    }
}

fn simple_agents<R: Rng>(n_types: usize, n_agents: usize, rng: &mut R) -> Vec<Cell> {
    let n_per_type = n_agents / n_types;
    let mut cells = Vec::with_capacity(n_agents);
    for kind in 1..=n_types {
        cells.extend(std::iter::repeat_n(
            Cell::Occupied(Agent::new(kind, 1)),
            n_per_type,
        ));
    }
    for _ in 0..n_agents % n_types {
        let kind = rng.random_range(1..=n_types);
        cells.push(Cell::Occupied(Agent::new(kind, 1)));
    }
    cells
}

fn income_agents(n_types: usize, n_agents: usize, counts: &[usize; N_GROUPS]) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(n_agents);
    for (i_grp, &count) in counts.iter().enumerate() {
        for kind in 1..=n_types {
            cells.extend(std::iter::repeat_n(
                Cell::Occupied(Agent::new(kind, i_grp + 1)),
                count / n_types,
            ));
        }
    }

    // Leftovers from the integer division go round-robin over groups and types.
    for i_agt in 0..n_agents - cells.len() {
        let group = i_agt % N_GROUPS + 1;
        let kind = i_agt % n_types + 1;
        cells.push(Cell::Occupied(Agent::new(kind, group)));
    }
    cells
}
