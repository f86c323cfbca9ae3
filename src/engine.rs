use crate::config::{Config, Update};
use crate::grid::Grid;
use crate::income::Calibration;
use crate::measures::Measures;
use crate::model::Model;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;

/// Simulation engine.
///
/// Holds the configuration, the grid, the agents currently below the
/// satisfaction threshold and the random number generator, and provides
/// methods to step, reset and reconfigure the simulation.
pub struct Engine {
    cfg: Config,
    model: Model,
    grid: Grid,
    calibration: Option<Calibration>,
    dissatisfied: Vec<(usize, usize)>,
    round: usize,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial grid.
    ///
    /// The generator is seeded from `cfg.run.seed` when present, from the OS otherwise.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let mut rng = match cfg.run.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let model = Model::from_config(&cfg);
        let (grid, calibration) = model
            .populate(&cfg, &mut rng)
            .context("failed to populate grid")?;

        let mut engine = Self {
            cfg,
            model,
            grid,
            calibration,
            dissatisfied: Vec::new(),
            round: 0,
            rng,
        };
        engine.dissatisfied = engine.find_dissatisfied();
        engine.log_initialization();

        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Calibration the current grid was built from (income model only).
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Agents below the satisfaction threshold, in row-major order of the last scan.
    pub fn dissatisfied(&self) -> &[(usize, usize)] {
        &self.dissatisfied
    }

    /// Number of rounds in which at least one agent moved since the last reset.
    pub fn round(&self) -> usize {
        self.round
    }

    /// Perform one round of relocations.
    ///
    /// Every dissatisfied agent moves to an empty cell chosen uniformly among
    /// the cells empty at that moment. Returns whether any agent moved.
    pub fn step(&mut self) -> bool {
        let mut empty = self.grid.empty_cells();
        let mut n_moved = 0;

        for &from in &self.dissatisfied {
            if empty.is_empty() {
                break;
            }
            let i_empty = self.rng.random_range(0..empty.len());
            let to = empty[i_empty];
            self.grid.relocate(from, to);
            // The vacated cell takes the place of the filled one.
            empty[i_empty] = from;
            n_moved += 1;
        }

        log::debug!("round {}: {n_moved} agents moved", self.round + 1);
        if n_moved == 0 {
            return false;
        }

        self.dissatisfied = self.find_dissatisfied();
        self.round += 1;
        true
    }

    /// Step until no agent moves or `max_rounds` rounds were performed.
    ///
    /// `observe` is called after every round in which agents moved.
    /// Returns the number of such rounds.
    pub fn run_until_settled<F>(&mut self, max_rounds: usize, mut observe: F) -> usize
    where
        F: FnMut(&Self),
    {
        let mut n_rounds = 0;
        while n_rounds < max_rounds && self.step() {
            n_rounds += 1;
            observe(self);
        }
        n_rounds
    }

    /// Rebuild the grid from the current configuration.
    pub fn reset(&mut self) -> Result<()> {
        let (grid, calibration) = self
            .model
            .populate(&self.cfg, &mut self.rng)
            .context("failed to populate grid")?;
        self.grid = grid;
        self.calibration = calibration;
        self.round = 0;
        self.dissatisfied = self.find_dissatisfied();
        self.log_initialization();
        Ok(())
    }

    /// Change a single parameter.
    ///
    /// Threshold changes only rescan the grid; every other change rebuilds it.
    /// On error the engine is left as it was.
    pub fn update(&mut self, update: Update) -> Result<()> {
        let cfg = update.apply(&self.cfg)?;
        log::info!("applying {update:?}");

        if !update.needs_reset() {
            self.cfg = cfg;
            self.dissatisfied = self.find_dissatisfied();
            return Ok(());
        }

        let model = Model::from_config(&cfg);
        let (grid, calibration) = model
            .populate(&cfg, &mut self.rng)
            .context("failed to populate grid")?;
        self.cfg = cfg;
        self.model = model;
        self.grid = grid;
        self.calibration = calibration;
        self.round = 0;
        self.dissatisfied = self.find_dissatisfied();
        self.log_initialization();
        Ok(())
    }

    /// Percentage of agents at or above the satisfaction threshold.
    pub fn satisfaction_percentage(&self) -> f64 {
        let n_agents = self.grid.n_agents();
        if n_agents == 0 {
            return 100.0;
        }
        100.0 * (n_agents - self.dissatisfied.len()) as f64 / n_agents as f64
    }

    /// Segregation measures of the current grid.
    pub fn measures(&self) -> Measures {
        Measures::compute(
            &self.grid,
            self.cfg.model.n_types,
            self.cfg.grid.empty_ratio,
            &self.model,
        )
    }

    fn find_dissatisfied(&self) -> Vec<(usize, usize)> {
        let threshold = self.cfg.model.threshold;
        self.grid
            .iter()
            .filter(|(row, col, _)| self.model.satisfaction(&self.grid, *row, *col) < threshold)
            .map(|(row, col, _)| (row, col))
            .collect()
    }

    fn log_initialization(&self) {
        log::info!(
            "initialized {0}x{0} grid with {1} agents and {2} empty cells, {3} dissatisfied",
            self.grid.size(),
            self.grid.n_agents(),
            self.grid.n_empty(),
            self.dissatisfied.len()
        );
        if let Some(calibration) = &self.calibration {
            log::info!("{calibration:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{income_config, simple_config};

    #[test]
    fn agents_are_conserved() {
        let mut engine = Engine::new(simple_config(20, 0.2, 0.6)).expect("engine");
        let n_agents = engine.grid().n_agents();
        assert_eq!(n_agents, 320);

        for _ in 0..20 {
            engine.step();
            assert_eq!(engine.grid().n_agents(), n_agents);
            assert_eq!(engine.grid().n_empty(), 80);
        }
    }

    #[test]
    fn income_agents_are_conserved() {
        let mut engine = Engine::new(income_config(15, 0.15, 0.34)).expect("engine");
        let mut before: Vec<_> = engine
            .grid()
            .cells()
            .iter()
            .filter_map(|c| c.agent())
            .copied()
            .collect();
        before.sort();

        engine.run_until_settled(10, |_| {});

        let mut after: Vec<_> = engine
            .grid()
            .cells()
            .iter()
            .filter_map(|c| c.agent())
            .copied()
            .collect();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn round_counts_only_moving_steps() {
        let mut engine = Engine::new(simple_config(20, 0.2, 0.6)).expect("engine");
        let mut n_moving = 0;
        for _ in 0..10 {
            if engine.step() {
                n_moving += 1;
            }
        }
        assert_eq!(engine.round(), n_moving);
    }

    #[test]
    fn satisfied_grid_does_not_change() {
        let mut engine = Engine::new(simple_config(10, 0.2, 0.0)).expect("engine");
        assert!(engine.dissatisfied().is_empty());

        let grid = engine.grid().clone();
        assert!(!engine.step());
        assert_eq!(engine.grid(), &grid);
        assert_eq!(engine.round(), 0);
        assert_eq!(engine.satisfaction_percentage(), 100.0);
    }

    #[test]
    fn full_grid_never_moves() {
        let mut engine = Engine::new(simple_config(4, 0.0, 0.0)).expect("engine");
        assert_eq!(engine.satisfaction_percentage(), 100.0);
        for _ in 0..5 {
            assert!(!engine.step());
        }

        // Even with everybody unhappy there is nowhere to go.
        engine.update(Update::Threshold(1.0)).expect("valid update");
        let grid = engine.grid().clone();
        assert!(!engine.step());
        assert_eq!(engine.grid(), &grid);
    }

    #[test]
    fn satisfaction_percentage_is_bounded() {
        for (empty_ratio, threshold) in [(0.0, 1.0), (0.3, 0.5), (0.9, 0.8), (1.0, 0.5)] {
            let engine = Engine::new(simple_config(8, empty_ratio, threshold)).expect("engine");
            let pct = engine.satisfaction_percentage();
            assert!((0.0..=100.0).contains(&pct), "{pct}");
        }
        let engine = Engine::new(simple_config(8, 1.0, 0.5)).expect("engine");
        assert_eq!(engine.satisfaction_percentage(), 100.0);
    }

    #[test]
    fn seeded_engines_are_reproducible() {
        let engine_a = Engine::new(income_config(12, 0.1, 0.4)).expect("engine");
        let engine_b = Engine::new(income_config(12, 0.1, 0.4)).expect("engine");
        assert_eq!(engine_a.grid(), engine_b.grid());

        let engine_a = Engine::new(simple_config(12, 0.1, 0.4)).expect("engine");
        let engine_b = Engine::new(simple_config(12, 0.1, 0.4)).expect("engine");
        assert_eq!(engine_a.grid(), engine_b.grid());
        assert_eq!(engine_a.dissatisfied(), engine_b.dissatisfied());
    }

    #[test]
    fn threshold_update_keeps_grid() {
        let mut engine = Engine::new(simple_config(10, 0.2, 0.3)).expect("engine");
        engine.step();
        let grid = engine.grid().clone();
        let round = engine.round();

        engine.update(Update::Threshold(0.9)).expect("valid update");
        assert_eq!(engine.grid(), &grid);
        assert_eq!(engine.round(), round);
        for &(row, col) in engine.dissatisfied() {
            assert!(engine.model().satisfaction(engine.grid(), row, col) < 0.9);
        }
    }

    #[test]
    fn resetting_updates_rebuild_grid() {
        let mut engine = Engine::new(simple_config(10, 0.2, 0.5)).expect("engine");
        engine.step();

        engine.update(Update::GridSize(6)).expect("valid update");
        assert_eq!(engine.grid().size(), 6);
        assert_eq!(engine.round(), 0);
        assert_eq!(engine.grid().n_empty(), 7);

        engine.update(Update::EmptyRatio(0.5)).expect("valid update");
        assert_eq!(engine.grid().n_empty(), 18);

        engine.update(Update::NTypes(4)).expect("valid update");
        let max_kind = engine
            .grid()
            .cells()
            .iter()
            .filter_map(|c| c.agent())
            .map(|a| a.kind())
            .max();
        assert_eq!(max_kind, Some(4));
    }

    #[test]
    fn rejected_update_changes_nothing() {
        let mut engine = Engine::new(simple_config(10, 0.2, 0.5)).expect("engine");
        let grid = engine.grid().clone();
        let cfg = engine.config().clone();

        assert!(engine.update(Update::EmptyRatio(-0.1)).is_err());
        assert!(engine.update(Update::NTypes(1)).is_err());
        assert!(engine.update(Update::Gini(0.2)).is_err());
        assert_eq!(engine.grid(), &grid);
        assert_eq!(engine.config(), &cfg);
    }

    #[test]
    fn income_updates_recalibrate() {
        let mut engine = Engine::new(income_config(20, 0.1, 0.4)).expect("engine");
        engine.update(Update::Gini(0.01)).expect("valid update");
        let calibration = engine.calibration().expect("income model calibrates");
        assert_eq!(calibration.counts, [360, 0, 0, 0, 0]);

        engine.update(Update::Gini(0.99)).expect("valid update");
        let calibration = engine.calibration().expect("income model calibrates");
        assert_eq!(calibration.counts, [359, 0, 0, 0, 1]);

        engine.update(Update::MeanIncome(25_000.0)).expect("valid update");
        assert_eq!(engine.grid().n_agents(), 360);
    }

    #[test]
    fn runs_until_settled() {
        let mut engine = Engine::new(simple_config(15, 0.3, 0.3)).expect("engine");
        let mut n_observed = 0;
        let n_rounds = engine.run_until_settled(200, |_| n_observed += 1);
        assert_eq!(n_rounds, n_observed);
        assert_eq!(engine.round(), n_rounds);
        assert!(n_rounds <= 200);
        if n_rounds < 200 {
            assert!(!engine.step());
        }
    }

    #[test]
    fn reset_restarts_rounds() {
        let mut engine = Engine::new(simple_config(10, 0.2, 0.6)).expect("engine");
        engine.run_until_settled(3, |_| {});
        engine.reset().expect("reset");
        assert_eq!(engine.round(), 0);
        assert_eq!(engine.grid().n_empty(), 20);
    }
}
