use crate::config::Config;
use crate::engine::Engine;
use crate::report::{CsvReport, EventLogger, StepRecord};
use crate::stats::Accumulator;
use anyhow::{Context, Result, bail};
use glob::glob;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Serialize)]
struct ResultRow<'a> {
    observable: &'a str,
    mean: f64,
    std_dev: f64,
}

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn run_simulation(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let mut engine = Engine::new(self.cfg.clone()).context("failed to construct engine")?;
        let mut steps = CsvReport::new(self.statistics_file(run_idx));
        let mut events = EventLogger;

        engine
            .run(&mut steps, &mut events)
            .context("failed to run simulation")?;

        let summary = engine.summary();
        log::info!(
            "{} after {} steps: {} currently infected, {} immune ({} vaccinated), {} dead, population {}",
            self.cfg.disease_name,
            self.cfg.total_time_steps,
            summary.current_infected,
            summary.immune,
            summary.vaccinated,
            summary.dead,
            summary.population_size
        );

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        if n_runs == 0 {
            bail!("no runs to analyze");
        }

        let mut total_infected_acc = Accumulator::new();
        let mut dead_acc = Accumulator::new();
        for run_idx in 0..n_runs {
            let record = self
                .final_record(run_idx)
                .context("failed to read final record")?;
            total_infected_acc.add(record.total_infected as f64);
            dead_acc.add(record.dead as f64);
        }

        let file = self.sim_dir.join("results.csv");
        let mut writer =
            csv::Writer::from_path(&file).with_context(|| format!("failed to create {file:?}"))?;

        let report = total_infected_acc.report();
        writer.serialize(ResultRow {
            observable: "total_infected",
            mean: report.mean,
            std_dev: report.std_dev,
        })?;
        let report = dead_acc.report();
        writer.serialize(ResultRow {
            observable: "dead",
            mean: report.mean,
            std_dev: report.std_dev,
        })?;
        writer.flush().context("failed to flush results")?;

        log::info!("analyzed {n_runs} runs into {file:?}");

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for entry in glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
        {
            if entry.is_dir() {
                fs::remove_dir_all(&entry)
                    .with_context(|| format!("failed to remove {entry:?}"))?;
                log::info!("removed {entry:?}");
            }
        }

        let results = self.sim_dir.join("results.csv");
        if results.exists() {
            fs::remove_file(&results)
                .with_context(|| format!("failed to remove {results:?}"))?;
            log::info!("removed {results:?}");
        }

        Ok(())
    }

    fn final_record(&self, run_idx: usize) -> Result<StepRecord> {
        let file = self.statistics_file(run_idx);
        let mut reader = csv::Reader::from_path(&file)
            .with_context(|| format!("failed to open {file:?}"))?;

        let mut last = None;
        for record in reader.deserialize() {
            last = Some(record.context("failed to parse step record")?);
        }
        last.with_context(|| format!("no step records in {file:?}"))
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn statistics_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("statistics.csv")
    }
}
