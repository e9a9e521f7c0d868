//! Population data types.

use anyhow::Result;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

/// Health state of one agent.
///
/// `Vaccinated`, `Recovered` and `Dead` are absorbing: a vaccinated or
/// recovered agent is permanently immune and never becomes infected again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    Susceptible,
    Vaccinated,
    Infected,
    NewlyInfected,
    Recovered,
    Dead,
}

impl Agent {
    pub fn is_alive(self) -> bool {
        self != Agent::Dead
    }

    pub fn is_infected(self) -> bool {
        self == Agent::Infected
    }

    pub fn is_susceptible(self) -> bool {
        self == Agent::Susceptible
    }
}

/// Closed population of agents with aggregate counters.
///
/// The agent vector is fixed in size and order for the lifetime of the
/// simulation; only the agents' states mutate. The transition methods
/// ([`Population::expose`], [`Population::activate`], [`Population::recover`],
/// [`Population::kill`]) are the only way states change after seeding, which
/// keeps the counters in lockstep with the agent vector.
pub struct Population {
    agt_vec: Vec<Agent>,
    current_infected: usize,
    total_infected: usize,
    dead: usize,
}

impl Population {
    /// Create a population with the first `n_infected` agents infected and
    /// every other agent independently vaccinated with probability
    /// `vaccination_fraction`.
    pub fn seed<R: Rng>(
        size: usize,
        n_infected: usize,
        vaccination_fraction: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let vac_dist = Bernoulli::new(vaccination_fraction)?;

        let mut agt_vec = Vec::with_capacity(size);
        for i_agt in 0..size {
            let agt = if i_agt < n_infected {
                Agent::Infected
            } else if vac_dist.sample(rng) {
                Agent::Vaccinated
            } else {
                Agent::Susceptible
            };
            agt_vec.push(agt);
        }

        Ok(Self {
            agt_vec,
            current_infected: n_infected,
            total_infected: n_infected,
            dead: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.agt_vec.len()
    }

    pub fn agent(&self, i_agt: usize) -> Agent {
        self.agt_vec[i_agt]
    }

    /// Indices of currently infected agents, in population order.
    pub fn infected(&self) -> impl Iterator<Item = usize> + '_ {
        self.agt_vec
            .iter()
            .enumerate()
            .filter(|(_, agt)| agt.is_infected())
            .map(|(i_agt, _)| i_agt)
    }

    pub fn current_infected(&self) -> usize {
        self.current_infected
    }

    pub fn total_infected(&self) -> usize {
        self.total_infected
    }

    pub fn dead_count(&self) -> usize {
        self.dead
    }

    pub fn alive_count(&self) -> usize {
        self.agt_vec.len() - self.dead
    }

    pub fn vaccinated_count(&self) -> usize {
        self.agt_vec
            .iter()
            .filter(|&&agt| agt == Agent::Vaccinated)
            .count()
    }

    pub fn recovered_count(&self) -> usize {
        self.agt_vec
            .iter()
            .filter(|&&agt| agt == Agent::Recovered)
            .count()
    }

    /// Mark a susceptible agent as newly infected.
    ///
    /// Repeated exposure within one round is idempotent only because the
    /// caller checks susceptibility first; a newly infected agent is no
    /// longer susceptible.
    pub fn expose(&mut self, i_agt: usize) {
        debug_assert_eq!(self.agt_vec[i_agt], Agent::Susceptible);
        self.agt_vec[i_agt] = Agent::NewlyInfected;
    }

    /// Turn a newly infected agent into a currently infected one.
    pub fn activate(&mut self, i_agt: usize) {
        debug_assert_eq!(self.agt_vec[i_agt], Agent::NewlyInfected);
        self.agt_vec[i_agt] = Agent::Infected;
        self.current_infected += 1;
        self.total_infected += 1;
    }

    /// Resolve an infected agent as recovered, with permanent immunity.
    pub fn recover(&mut self, i_agt: usize) {
        debug_assert_eq!(self.agt_vec[i_agt], Agent::Infected);
        self.agt_vec[i_agt] = Agent::Recovered;
        self.current_infected -= 1;
    }

    /// Resolve an infected agent as dead.
    pub fn kill(&mut self, i_agt: usize) {
        debug_assert_eq!(self.agt_vec[i_agt], Agent::Infected);
        self.agt_vec[i_agt] = Agent::Dead;
        self.current_infected -= 1;
        self.dead += 1;
    }

    /// Check that the counters match the agent vector.
    ///
    /// Counter drift is a programming error, so this asserts instead of
    /// returning a result.
    pub fn debug_assert_consistent(&self) {
        debug_assert_eq!(
            self.current_infected,
            self.agt_vec.iter().filter(|agt| agt.is_infected()).count()
        );
        debug_assert_eq!(
            self.dead,
            self.agt_vec.iter().filter(|agt| !agt.is_alive()).count()
        );
        debug_assert!(self.total_infected >= self.current_infected);
    }
}
