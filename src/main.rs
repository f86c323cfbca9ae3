use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use schelling::config::{Config, Update};
use schelling::engine::Engine;
use schelling::report::{self, Record};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    config: PathBuf,

    /// Override the seed of the configuration file.
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Step the simulation until no agent moves and print the final measures.
    Run {
        /// Parameter change applied after initialization (e.g. `threshold=0.5`).
        #[arg(long = "set")]
        updates: Vec<Update>,

        /// File to save the recorded statistics to.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the measures of the initial grid.
    Measure {
        #[arg(long = "set")]
        updates: Vec<Update>,
    },

    /// Print the income calibration of the initial grid.
    Calibrate,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mut cfg = Config::from_file(&args.config).context("failed to construct cfg")?;
    if args.seed.is_some() {
        cfg.run.seed = args.seed;
    }
    log::info!("{cfg:#?}");

    match args.command {
        Command::Run { updates, output } => run_simulation(cfg, &updates, output)?,
        Command::Measure { updates } => {
            let engine = build_engine(cfg, &updates)?;
            println!("{}", engine.measures());
        }
        Command::Calibrate => print_calibration(cfg)?,
    }

    Ok(())
}

fn build_engine(cfg: Config, updates: &[Update]) -> Result<Engine> {
    let mut engine = Engine::new(cfg).context("failed to construct engine")?;
    for &update in updates {
        engine.update(update).context("failed to update engine")?;
    }
    Ok(engine)
}

fn run_simulation(cfg: Config, updates: &[Update], output: Option<PathBuf>) -> Result<()> {
    let mut engine = build_engine(cfg, updates)?;
    let max_rounds = engine.config().run.max_rounds;
    let rounds_per_report = engine.config().run.rounds_per_report;

    let mut records = vec![Record::new(&engine)];
    let n_rounds = engine.run_until_settled(max_rounds, |engine| {
        if engine.round() % rounds_per_report == 0 {
            let record = Record::new(engine);
            log::info!(
                "round {:>6}: {:06.2}% satisfied, measure {}",
                record.round,
                record.satisfaction,
                record.measures
            );
            records.push(record);
        }
    });
    if records.last().map(|record| record.round) != Some(engine.round()) {
        records.push(Record::new(&engine));
    }

    if n_rounds < max_rounds {
        log::info!("settled after {n_rounds} rounds");
    } else {
        log::info!("stopped after {n_rounds} rounds without settling");
    }
    log::info!(
        "{:.2}% satisfied, {:?}",
        engine.satisfaction_percentage(),
        engine.measures()
    );
    println!("{}", engine.measures());

    if let Some(output) = output {
        report::save_records(&output, &records)
            .with_context(|| format!("failed to save records to {output:?}"))?;
        log::info!("saved {} records to {output:?}", records.len());
    }

    Ok(())
}

fn print_calibration(cfg: Config) -> Result<()> {
    if cfg.model.income.is_none() {
        bail!("calibration requires the income model");
    }
    let engine = Engine::new(cfg).context("failed to construct engine")?;
    let Some(calibration) = engine.calibration() else {
        bail!("grid has no agents to calibrate");
    };

    match calibration.sigma {
        Some(sigma) => println!("sigma: {sigma:.5}"),
        None => println!("sigma: -"),
    }
    println!("gini: {:.5}", calibration.gini);
    println!("converged: {}", calibration.converged);
    for (i_grp, count) in calibration.counts.iter().enumerate() {
        println!("group {}: {count}", i_grp + 1);
    }

    Ok(())
}
