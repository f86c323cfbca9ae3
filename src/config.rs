use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path, str::FromStr};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Agent model parameters.
    pub model: ModelConfig,
    /// Grid parameters.
    pub grid: GridConfig,
    /// Driver parameters.
    pub run: RunConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of agent types.
    pub n_types: usize,
    /// Minimum satisfaction score an agent accepts before moving.
    pub threshold: f64,
    /// Income parameters. Their presence selects the income model.
    pub income: Option<IncomeConfig>,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct IncomeConfig {
    /// Target mean income of the population.
    pub mean_income: f64,
    /// Target Gini coefficient of the income distribution.
    pub gini: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Side length of the square grid.
    pub size: usize,
    /// Fraction of cells left empty.
    pub empty_ratio: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seed of the random number generator (drawn from the OS if absent).
    pub seed: Option<u64>,
    /// Maximum number of rounds performed by the driver.
    pub max_rounds: usize,
    /// Number of rounds between progress reports.
    pub rounds_per_report: usize,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        contents.parse()
    }

    /// Number of empty cells of a freshly initialized grid.
    pub fn n_empty(&self) -> usize {
        let n_cells = self.grid.size * self.grid.size;
        (n_cells as f64 * self.grid.empty_ratio) as usize
    }

    /// Number of agents of a freshly initialized grid.
    pub fn n_agents(&self) -> usize {
        self.grid.size * self.grid.size - self.n_empty()
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.model.n_types, 2..).context("invalid number of agent types")?;
        check_num(self.model.threshold, 0.0..=1.0).context("invalid threshold")?;
        if let Some(income) = &self.model.income {
            if !income.mean_income.is_finite() {
                bail!("mean income must be finite, but is {:?}", income.mean_income);
            }
            check_num(income.mean_income, f64::MIN_POSITIVE..).context("invalid mean income")?;
            check_num(income.gini, 0.0..=1.0).context("invalid Gini coefficient")?;
        }

        check_num(self.grid.size, 1..10_000).context("invalid grid size")?;
        check_num(self.grid.empty_ratio, 0.0..=1.0).context("invalid empty ratio")?;

        check_num(self.run.max_rounds, 1..).context("invalid maximum number of rounds")?;
        check_num(self.run.rounds_per_report, 1..)
            .context("invalid number of rounds per report")?;

        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to deserialize config")?;
        config.validate().context("failed to validate config")?;
        Ok(config)
    }
}

/// Change of a single parameter requested by the driver.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Update {
    Threshold(f64),
    EmptyRatio(f64),
    GridSize(usize),
    NTypes(usize),
    MeanIncome(f64),
    Gini(f64),
}

impl Update {
    /// Return a validated copy of `cfg` with this update applied.
    ///
    /// `cfg` itself is never modified, so a rejected update leaves no trace.
    pub fn apply(&self, cfg: &Config) -> Result<Config> {
        let mut cfg = cfg.clone();
        match *self {
            Update::Threshold(val) => cfg.model.threshold = val,
            Update::EmptyRatio(val) => cfg.grid.empty_ratio = val,
            Update::GridSize(val) => cfg.grid.size = val,
            Update::NTypes(val) => cfg.model.n_types = val,
            Update::MeanIncome(val) => income_mut(&mut cfg)?.mean_income = val,
            Update::Gini(val) => income_mut(&mut cfg)?.gini = val,
        }
        cfg.validate()
            .with_context(|| format!("failed to apply {self:?}"))?;
        Ok(cfg)
    }

    /// Whether the grid has to be rebuilt after this update.
    pub fn needs_reset(&self) -> bool {
        !matches!(self, Update::Threshold(_))
    }
}

fn income_mut(cfg: &mut Config) -> Result<&mut IncomeConfig> {
    cfg.model
        .income
        .as_mut()
        .context("parameter only applies to the income model")
}

impl FromStr for Update {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, val) = s
            .split_once('=')
            .with_context(|| format!("expected name=value, got {s:?}"))?;
        let val = val.trim();
        let update = match name.trim() {
            "threshold" => Update::Threshold(parse_val(val)?),
            "empty_ratio" => Update::EmptyRatio(parse_val(val)?),
            "grid_size" => Update::GridSize(parse_val(val)?),
            "n_types" => Update::NTypes(parse_val(val)?),
            "mean_income" => Update::MeanIncome(parse_val(val)?),
            "gini" => Update::Gini(parse_val(val)?),
            other => bail!("unknown parameter {other:?}"),
        };
        Ok(update)
    }
}

fn parse_val<T>(val: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    val.parse()
        .with_context(|| format!("failed to parse value {val:?}"))
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
