//! Output surfaces of the simulation engine.
//!
//! The engine itself performs no I/O: per-step statistics go to a
//! [`StepSink`], infection and death notifications go to an [`EventSink`],
//! and the sinks decide what to do with them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Aggregate statistics emitted once per completed time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub current_infected: usize,
    pub total_infected: usize,
    pub alive: usize,
    pub dead: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Infection,
    Death,
}

/// One infection activation or death, tagged with the step it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub step: usize,
    pub kind: EventKind,
}

/// Aggregate counts of the population, for on-demand reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub population_size: usize,
    pub vaccinated: usize,
    /// Vaccinated plus recovered agents.
    pub immune: usize,
    pub current_infected: usize,
    pub dead: usize,
}

/// Receiver for the per-step record stream.
///
/// Implementations must accept records without stalling the stepping loop;
/// any expensive export belongs in [`StepSink::finalize`], which the engine
/// calls once after the last step.
pub trait StepSink {
    fn record(&mut self, record: &StepRecord) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
}

/// Receiver for the per-event notification stream.
pub trait EventSink {
    fn notify(&mut self, event: Event) -> Result<()>;
}

/// Step sink that buffers records in memory and exports them as a CSV file
/// on finalize.
pub struct CsvReport {
    file: PathBuf,
    records: Vec<StepRecord>,
}

impl CsvReport {
    pub fn new<P: AsRef<Path>>(file: P) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            records: Vec::new(),
        }
    }
}

impl StepSink for CsvReport {
    fn record(&mut self, record: &StepRecord) -> Result<()> {
        self.records.push(*record);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.file)
            .with_context(|| format!("failed to create {:?}", self.file))?;

        for record in &self.records {
            writer
                .serialize(record)
                .context("failed to serialize step record")?;
        }

        writer.flush().context("failed to flush step records")?;
        Ok(())
    }
}

/// Event sink that forwards notifications to the log facade.
pub struct EventLogger;

impl EventSink for EventLogger {
    fn notify(&mut self, event: Event) -> Result<()> {
        log::debug!("step {}: {:?}", event.step, event.kind);
        Ok(())
    }
}
