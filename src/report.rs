use crate::engine::Engine;
use crate::measures::Measures;
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Statistics of the simulation at a single round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Rounds performed since the last reset.
    pub round: usize,

    /// Percentage of satisfied agents.
    pub satisfaction: f64,

    /// Segregation measures of the grid.
    pub measures: Measures,
}

impl Record {
    pub fn new(engine: &Engine) -> Self {
        Self {
            round: engine.round(),
            satisfaction: engine.satisfaction_percentage(),
            measures: engine.measures(),
        }
    }
}

/// Save a sequence of records to a MessagePack file.
pub fn save_records<P: AsRef<Path>>(file: P, records: &[Record]) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write(&mut writer, records).context("failed to serialize records")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

/// Load records previously written by [`save_records`].
pub fn load_records<P: AsRef<Path>>(file: P) -> Result<Vec<Record>> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(file);
    let records = decode::from_read(&mut reader).context("failed to deserialize records")?;
    Ok(records)
}
