//! Income distribution calibration.
//!
//! Incomes are drawn from a lognormal distribution whose mean is fixed by the
//! configured mean income and whose shape parameter `sigma` is searched by
//! bisection until the sampled Gini coefficient matches the target. The final
//! sample is then bucketed into [`N_GROUPS`] ordinal income groups by
//! standard-deviation bands around the configured mean.

use crate::grid::N_GROUPS;
use crate::stats;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::LogNormal;

/// Targets below this value are treated as perfect equality.
const GINI_EQUALITY: f64 = 0.03;
/// Targets above this value are treated as perfect inequality.
const GINI_INEQUALITY: f64 = 0.97;

const TOLERANCE: f64 = 0.01;
const MAX_ITERATIONS: usize = 100;

/// Outcome of an income calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Shape parameter used for the final sample (`None` for the exact edge cases).
    pub sigma: Option<f64>,
    /// Gini coefficient of the final sample.
    pub gini: f64,
    /// Whether the bisection reached the tolerance.
    pub converged: bool,
    /// Number of agents in each income group.
    pub counts: [usize; N_GROUPS],
}

/// Produce per-group agent counts whose income distribution has the target
/// mean and Gini coefficient.
pub fn calibrate<R: Rng>(
    mean_income: f64,
    gini: f64,
    n_agents: usize,
    rng: &mut R,
) -> Result<Calibration> {
    let mut counts = [0; N_GROUPS];

    if n_agents == 0 {
        return Ok(Calibration {
            sigma: None,
            gini: 0.0,
            converged: true,
            counts,
        });
    }
    if gini < GINI_EQUALITY {
        counts[0] = n_agents;
        return Ok(Calibration {
            sigma: None,
            gini: 0.0,
            converged: true,
            counts,
        });
    }
    if gini > GINI_INEQUALITY {
        counts[0] = n_agents - 1;
        counts[N_GROUPS - 1] = 1;
        return Ok(Calibration {
            sigma: None,
            gini: 1.0 - 1.0 / n_agents as f64,
            converged: true,
            counts,
        });
    }

    let (sigma, converged) =
        search_sigma(mean_income, gini, n_agents, rng).context("failed to search sigma")?;
    if !converged {
        log::warn!("calibration did not reach Gini {gini} within {TOLERANCE}, using sigma {sigma}");
    }

    let mut incomes = sample_incomes(mean_income, sigma, n_agents, rng)?;
    incomes.sort_by(f64::total_cmp);

    Ok(Calibration {
        sigma: Some(sigma),
        gini: compute_gini(&incomes),
        converged,
        counts: group_by_std_dev(&incomes, mean_income),
    })
}

/// Bisection over the lognormal shape parameter.
///
/// Returns the sigma whose sample came closest to the target and whether it
/// is within tolerance.
fn search_sigma<R: Rng>(
    mean_income: f64,
    gini: f64,
    n_agents: usize,
    rng: &mut R,
) -> Result<(f64, bool)> {
    let (mut left, mut right) = if gini < 0.3 {
        (0.1, 1.0)
    } else if gini > 0.7 {
        (0.5, 3.0)
    } else {
        (0.1, 2.0)
    };

    let mut best_sigma = (left + right) / 2.0;
    let mut best_err = f64::INFINITY;

    let mut i_iter = 0;
    while right - left > TOLERANCE && i_iter < MAX_ITERATIONS {
        let sigma = (left + right) / 2.0;
        let mut incomes = sample_incomes(mean_income, sigma, n_agents, rng)?;
        incomes.sort_by(f64::total_cmp);
        let sample_gini = compute_gini(&incomes);
        log::debug!("iteration {i_iter}: sigma = {sigma:.5}, gini = {sample_gini:.5}");

        let err = (sample_gini - gini).abs();
        if err < best_err {
            best_err = err;
            best_sigma = sigma;
        }
        if err < TOLERANCE {
            break;
        }
        if sample_gini > gini {
            right = sigma;
        } else {
            left = sigma;
        }
        i_iter += 1;
    }

    Ok((best_sigma, best_err < TOLERANCE))
}

fn sample_incomes<R: Rng>(
    mean_income: f64,
    sigma: f64,
    n_agents: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    // Location parameter that keeps the distribution mean at `mean_income`.
    let mu = mean_income.ln() - sigma.powi(2) / 2.0;
    let dist = LogNormal::new(mu, sigma)?;
    Ok(dist.sample_iter(rng).take(n_agents).collect())
}

/// Gini coefficient of an ascending-sorted sample.
pub fn compute_gini(sorted: &[f64]) -> f64 {
    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    if sorted.is_empty() || sum == 0.0 {
        return 0.0;
    }
    let weighted_sum: f64 = sorted
        .iter()
        .enumerate()
        .map(|(idx, &val)| (2.0 * (idx + 1) as f64 - n - 1.0) * val)
        .sum();
    weighted_sum / (n * sum)
}

/// Count an ascending-sorted sample into the bands
/// `(-inf, m - s)`, `[m - s, m)`, `[m, m + s)`, `[m + s, m + 2s)`, `[m + 2s, inf)`
/// where `m` is the configured mean and `s` the sample standard deviation.
fn group_by_std_dev(sorted: &[f64], mean_income: f64) -> [usize; N_GROUPS] {
    let std_dev = stats::std_dev(sorted);
    let bounds = [
        mean_income - std_dev,
        mean_income,
        mean_income + std_dev,
        mean_income + 2.0 * std_dev,
    ];

    let mut counts = [0; N_GROUPS];
    let mut prev_idx = 0;
    for (i_grp, bound) in bounds.iter().enumerate() {
        let idx = sorted.partition_point(|&val| val < *bound);
        counts[i_grp] = idx - prev_idx;
        prev_idx = idx;
    }
    counts[N_GROUPS - 1] = sorted.len() - prev_idx;
    counts
}
