use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of agents in the population.
    pub population_size: usize,
    /// Name of the simulated disease (opaque label).
    pub disease_name: String,
    /// Basic reproduction number, as a percentage in `[0, 100]`.
    pub r0: f64,
    /// Probability that an infected agent dies at round resolution.
    pub mortality_rate: f64,
    /// Number of time steps to simulate.
    pub total_time_steps: usize,
    /// Fraction of the initial population that is vaccinated.
    pub vaccination_fraction: f64,
    /// Number of agents infected at the start of the simulation.
    pub initial_infected_count: usize,
    /// Seed for the random number generator, for reproducible runs.
    pub seed: Option<u64>,
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
        let text = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&text).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Per-contact transmission probability, normalized from the percent `r0`.
    pub fn transmission_prob(&self) -> f64 {
        self.r0 / 100.0
    }

    fn validate(&self) -> Result<()> {
        check_num(self.population_size, 1..).context("invalid population size")?;
        check_num(self.r0, 0.0..=100.0).context("invalid basic reproduction number")?;
        check_num(self.mortality_rate, 0.0..=1.0).context("invalid mortality rate")?;
        check_num(self.vaccination_fraction, 0.0..=1.0).context("invalid vaccination fraction")?;
        check_num(self.initial_infected_count, 0..self.population_size)
            .context("invalid initial infected count")?;

        Ok(())
    }
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
