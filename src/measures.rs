//! Segregation measures of a grid snapshot.
//!
//! Every measure falls back to 0 when it would divide by zero (no agents,
//! no variance, no contributing pairs).

use crate::grid::{Agent, Cell, Grid, N_GROUPS};
use crate::model::Model;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measures {
    pub isolation: f64,
    pub exposure: f64,
    pub morans_i: f64,
    pub dissimilarity: f64,
    /// Exposure minus isolation (0 when isolation is 0).
    pub x: f64,
    /// Dissimilarity minus Moran's I.
    pub y: f64,
}

impl Measures {
    /// Compute all measures of `grid`, scoring cells with `model`.
    pub fn compute(grid: &Grid, n_types: usize, empty_ratio: f64, model: &Model) -> Self {
        let income = model.is_income();

        let isolation = isolation_index(grid, empty_ratio, |grid, row, col| {
            model.satisfaction(grid, row, col)
        });
        let exposure = 1.0 - isolation;
        let morans_i = morans_i(grid, empty_ratio, income);
        let dissimilarity = dissimilarity_index(grid, n_types, empty_ratio, income);

        Self {
            isolation,
            exposure,
            morans_i,
            dissimilarity,
            x: if isolation != 0.0 {
                exposure - isolation
            } else {
                0.0
            },
            y: dissimilarity - morans_i,
        }
    }
}

impl fmt::Display for Measures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5} , {:.5})", self.x, self.y)
    }
}

/// Mean satisfaction score over every cell of the grid.
pub fn isolation_index<F>(grid: &Grid, empty_ratio: f64, score: F) -> f64
where
    F: Fn(&Grid, usize, usize) -> f64,
{
    if empty_ratio >= 1.0 {
        return 0.0;
    }
    let scores: Vec<f64> = grid
        .iter()
        .map(|(row, col, _)| score(grid, row, col))
        .collect();
    stats::mean(&scores)
}

/// Global Moran's I over the 4-connected neighbourhood.
///
/// The attribute is the type deviation from the mean type for the simple
/// model (not the raw type, so a grid holding a single type scores 0), and the
/// average of the standardized type and income group for the income model.
///
/// The agent count is the number of occupied cells of `grid`, which equals
/// `size² - floor(size² * empty_ratio)` for every grid the engine builds.
pub fn morans_i(grid: &Grid, empty_ratio: f64, income: bool) -> f64 {
    if empty_ratio >= 1.0 {
        return 0.0;
    }

    let agts: Vec<&Agent> = grid.cells().iter().filter_map(Cell::agent).collect();
    let kinds: Vec<f64> = agts.iter().map(|agt| agt.kind() as f64).collect();
    let groups: Vec<f64> = agts.iter().map(|agt| agt.group() as f64).collect();

    let (kind_mean, kind_std_dev) = (stats::mean(&kinds), stats::std_dev(&kinds));
    let (group_mean, group_std_dev) = (stats::mean(&groups), stats::std_dev(&groups));
    if kind_std_dev == 0.0 || (income && group_std_dev == 0.0) {
        return 0.0;
    }

    let attribute = |agt: &Agent| {
        let kind_dev = agt.kind() as f64 - kind_mean;
        if income {
            let group_dev = agt.group() as f64 - group_mean;
            (kind_dev / kind_std_dev + group_dev / group_std_dev) / 2.0
        } else {
            kind_dev
        }
    };

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut weight_sum = 0;
    for (row, col, cell) in grid.iter() {
        let Some(agt) = cell.agent() else {
            continue;
        };
        let attr = attribute(agt);
        denominator += attr * attr;

        // Each adjacent pair is visited once from each end.
        for nbr in grid.von_neumann_neighbours(row, col) {
            weight_sum += 1;
            numerator += attr * attribute(nbr);
        }
    }

    if weight_sum == 0 || denominator == 0.0 {
        return 0.0;
    }
    (agts.len() as f64 * numerator) / (weight_sum as f64 * denominator)
}

/// Row-based dissimilarity index.
///
/// For each pair of types, the absolute difference between the shares of
/// both types living in a row is averaged over all rows containing both.
/// The income model adds the same term over income groups.
pub fn dissimilarity_index(grid: &Grid, n_types: usize, empty_ratio: f64, income: bool) -> f64 {
    if empty_ratio >= 1.0 {
        return 0.0;
    }

    let kind_term = pairwise_share_diff(grid, n_types, Agent::kind);
    if income {
        let group_term = pairwise_share_diff(grid, N_GROUPS, Agent::group);
        (kind_term + group_term) / 4.0
    } else {
        kind_term / 2.0
    }
}

/// Mean over rows and label pairs of `|count_i / total_i - count_j / total_j|`,
/// skipping rows where either label is absent.
fn pairwise_share_diff<F>(grid: &Grid, n_labels: usize, label: F) -> f64
where
    F: Fn(&Agent) -> usize,
{
    let n_labels = grid
        .cells()
        .iter()
        .filter_map(Cell::agent)
        .map(&label)
        .max()
        .map_or(n_labels, |max| max.max(n_labels));

    let mut row_counts = vec![vec![0usize; n_labels + 1]; grid.size()];
    let mut totals = vec![0usize; n_labels + 1];
    for (row, _, cell) in grid.iter() {
        if let Some(agt) = cell.agent() {
            row_counts[row][label(agt)] += 1;
            totals[label(agt)] += 1;
        }
    }

    let mut diff_sum = 0.0;
    let mut n_terms = 0;
    for counts in &row_counts {
        for i in 1..=n_labels {
            for j in i + 1..=n_labels {
                if counts[i] == 0 || counts[j] == 0 {
                    continue;
                }
                let share_i = counts[i] as f64 / totals[i] as f64;
                let share_j = counts[j] as f64 / totals[j] as f64;
                diff_sum += (share_i - share_j).abs();
                n_terms += 1;
            }
        }
    }

    if n_terms == 0 {
        return 0.0;
    }
    diff_sum / n_terms as f64
}
