use crate::config::Config;
use crate::model::{Agent, Population};
use crate::report::{Event, EventKind, EventSink, StepRecord, StepSink, Summary};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Bernoulli, Uniform};

/// Number of contacts with living targets each infected agent makes per step.
const CONTACTS_PER_INFECTED: usize = 100;

/// Simulation engine.
///
/// Holds the configuration, population, and random number generator, and
/// advances the epidemic one time step at a time: contact sampling for every
/// infected agent, then round resolution, then one record to the step sink.
pub struct Engine {
    cfg: Config,
    pop: Population,
    rng: ChaCha12Rng,
    step: usize,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a freshly
    /// seeded population.
    ///
    /// The generator is seeded from `cfg.seed` when present, so two engines
    /// built from the same configuration produce identical runs; otherwise
    /// it is seeded from OS entropy.
    pub fn new(cfg: Config) -> Result<Self> {
        let mut rng = match cfg.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let pop = Population::seed(
            cfg.population_size,
            cfg.initial_infected_count,
            cfg.vaccination_fraction,
            &mut rng,
        )
        .context("failed to seed population")?;

        Ok(Self {
            cfg,
            pop,
            rng,
            step: 0,
        })
    }

    /// Perform the configured number of time steps, then finalize the step
    /// sink.
    ///
    /// The loop always runs the full duration, even after the epidemic has
    /// burned out.
    pub fn run(&mut self, steps: &mut dyn StepSink, events: &mut dyn EventSink) -> Result<()> {
        let mut i_agt_inf = Vec::with_capacity(self.pop.size());

        for _ in 0..self.cfg.total_time_steps {
            self.perform_step(&mut i_agt_inf, steps, events)
                .context("failed to perform step")?;
        }

        steps.finalize().context("failed to finalize step records")?;

        Ok(())
    }

    /// Current aggregate counts of the population.
    pub fn summary(&self) -> Summary {
        Summary {
            population_size: self.pop.size(),
            vaccinated: self.pop.vaccinated_count(),
            immune: self.pop.vaccinated_count() + self.pop.recovered_count(),
            current_infected: self.pop.current_infected(),
            dead: self.pop.dead_count(),
        }
    }

    fn perform_step(
        &mut self,
        i_agt_inf: &mut Vec<usize>,
        steps: &mut dyn StepSink,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        // Contacts run against the pre-step infected set: sampling only ever
        // creates newly infected agents, and those activate at resolution, so
        // agents infected this round cannot contact before the next step.
        i_agt_inf.clear();
        i_agt_inf.extend(self.pop.infected());
        for &i_agt in i_agt_inf.iter() {
            self.infected_contacts(i_agt)
                .context("failed to sample contacts")?;
        }

        self.resolve_round(events).context("failed to resolve round")?;

        self.pop.debug_assert_consistent();

        steps.record(&StepRecord {
            step: self.step,
            current_infected: self.pop.current_infected(),
            total_infected: self.pop.total_infected(),
            alive: self.pop.alive_count(),
            dead: self.pop.dead_count(),
        })?;

        self.step += 1;

        Ok(())
    }

    /// Sample contacts for one infected agent.
    ///
    /// Draws targets uniformly from the whole population, with replacement,
    /// until `CONTACTS_PER_INFECTED` draws have landed on living agents;
    /// draws that land on dead agents are discarded without counting, so
    /// contact pressure concentrates on the living. Each living, susceptible
    /// target is infected with the transmission probability. All other
    /// targets are unaffected, as is the source agent.
    fn infected_contacts(&mut self, i_src: usize) -> Result<()> {
        // The population is frozen while contacts are sampled, so a single
        // check guarantees the rejection loop terminates.
        if self.pop.alive_count() == 0 {
            bail!("no living contacts available");
        }
        debug_assert!(self.pop.agent(i_src).is_infected());

        let trans_dist = Bernoulli::new(self.cfg.transmission_prob())?;
        let tgt_dist = Uniform::new(0, self.pop.size())?;

        let mut n_contacts = 0;
        while n_contacts < CONTACTS_PER_INFECTED {
            let i_tgt = tgt_dist.sample(&mut self.rng);
            if !self.pop.agent(i_tgt).is_alive() {
                continue;
            }
            n_contacts += 1;

            if self.pop.agent(i_tgt).is_susceptible() && trans_dist.sample(&mut self.rng) {
                self.pop.expose(i_tgt);
            }
        }

        Ok(())
    }

    /// Resolve the round: every infected agent dies or recovers, and every
    /// newly infected agent becomes infected for the next step.
    ///
    /// Each agent's transition depends only on its own pre-round state, so
    /// the iteration order does not affect the outcome.
    fn resolve_round(&mut self, events: &mut dyn EventSink) -> Result<()> {
        let death_dist = Bernoulli::new(self.cfg.mortality_rate)?;

        for i_agt in 0..self.pop.size() {
            let agt = self.pop.agent(i_agt);
            if agt.is_infected() {
                if death_dist.sample(&mut self.rng) {
                    self.pop.kill(i_agt);
                    events.notify(Event {
                        step: self.step,
                        kind: EventKind::Death,
                    })?;
                } else {
                    self.pop.recover(i_agt);
                }
            } else if agt == Agent::NewlyInfected {
                self.pop.activate(i_agt);
                events.notify(Event {
                    step: self.step,
                    kind: EventKind::Infection,
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemoryReport {
        records: Vec<StepRecord>,
        finalized: bool,
    }

    impl MemoryReport {
        fn new() -> Self {
            Self {
                records: Vec::new(),
                finalized: false,
            }
        }
    }

    impl StepSink for MemoryReport {
        fn record(&mut self, record: &StepRecord) -> Result<()> {
            self.records.push(*record);
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.finalized = true;
            Ok(())
        }
    }

    struct MemoryEvents {
        events: Vec<Event>,
    }

    impl MemoryEvents {
        fn new() -> Self {
            Self { events: Vec::new() }
        }
    }

    impl EventSink for MemoryEvents {
        fn notify(&mut self, event: Event) -> Result<()> {
            self.events.push(event);
            Ok(())
        }
    }

    fn config(
        population_size: usize,
        r0: f64,
        mortality_rate: f64,
        total_time_steps: usize,
        vaccination_fraction: f64,
        initial_infected_count: usize,
    ) -> Config {
        Config {
            population_size,
            disease_name: "measles".to_string(),
            r0,
            mortality_rate,
            total_time_steps,
            vaccination_fraction,
            initial_infected_count,
            seed: Some(42),
        }
    }

    fn run_engine(cfg: Config) -> (Engine, MemoryReport, MemoryEvents) {
        let mut engine = Engine::new(cfg).expect("failed to construct engine");
        let mut steps = MemoryReport::new();
        let mut events = MemoryEvents::new();
        engine
            .run(&mut steps, &mut events)
            .expect("failed to run engine");
        (engine, steps, events)
    }

    #[test]
    fn emits_one_record_per_step_and_finalizes() {
        let (_, steps, _) = run_engine(config(300, 5.0, 0.3, 12, 0.2, 3));

        assert_eq!(steps.records.len(), 12);
        for (i_step, record) in steps.records.iter().enumerate() {
            assert_eq!(record.step, i_step);
        }
        assert!(steps.finalized);
    }

    #[test]
    fn conserves_population_and_keeps_counters_monotonic() {
        let (_, steps, _) = run_engine(config(300, 8.0, 0.4, 15, 0.1, 5));

        let mut prev_total = 0;
        let mut prev_dead = 0;
        for record in &steps.records {
            assert_eq!(record.alive + record.dead, 300);
            assert!(record.total_infected >= record.current_infected);
            assert!(record.total_infected >= prev_total);
            assert!(record.dead >= prev_dead);
            prev_total = record.total_infected;
            prev_dead = record.dead;
        }
    }

    #[test]
    fn counters_match_the_agent_vector_after_a_run() {
        let (engine, steps, _) = run_engine(config(250, 10.0, 0.2, 10, 0.3, 4));

        let pop = &engine.pop;
        let n_infected = (0..pop.size())
            .filter(|&i_agt| pop.agent(i_agt).is_infected())
            .count();
        let n_dead = (0..pop.size())
            .filter(|&i_agt| !pop.agent(i_agt).is_alive())
            .count();

        let last = steps.records.last().expect("run must emit records");
        assert_eq!(pop.current_infected(), n_infected);
        assert_eq!(pop.dead_count(), n_dead);
        assert_eq!(last.current_infected, n_infected);
        assert_eq!(last.dead, n_dead);
    }

    #[test]
    fn zero_transmission_never_spreads() {
        let (_, steps, events) = run_engine(config(200, 0.0, 0.0, 5, 0.0, 10));

        // All initial infected recover at the first resolution and nobody
        // else ever catches the disease.
        assert_eq!(steps.records[0].current_infected, 0);
        for record in &steps.records {
            assert_eq!(record.total_infected, 10);
            assert_eq!(record.dead, 0);
        }
        assert!(events.events.is_empty());
    }

    #[test]
    fn total_vaccination_blocks_every_infection() {
        let (_, steps, events) = run_engine(config(150, 80.0, 0.5, 8, 1.0, 0));

        for record in &steps.records {
            assert_eq!(record.current_infected, 0);
            assert_eq!(record.total_infected, 0);
            assert_eq!(record.dead, 0);
        }
        assert!(events.events.is_empty());
    }

    #[test]
    fn certain_death_kills_every_infected_agent_next_resolution() {
        let (_, steps, events) = run_engine(config(120, 0.0, 1.0, 3, 0.0, 10));

        assert_eq!(steps.records[0].dead, 10);
        assert_eq!(steps.records[0].current_infected, 0);
        assert_eq!(steps.records[0].alive, 110);
        assert_eq!(
            events
                .events
                .iter()
                .filter(|event| event.kind == EventKind::Death)
                .count(),
            10
        );
    }

    #[test]
    fn certain_death_chain_adds_previous_infected_to_dead() {
        let (_, steps, _) = run_engine(config(400, 100.0, 1.0, 6, 0.0, 5));

        for i_step in 1..steps.records.len() {
            let prev = &steps.records[i_step - 1];
            let curr = &steps.records[i_step];
            assert_eq!(curr.dead, prev.dead + prev.current_infected);
        }
    }

    #[test]
    fn full_transmission_single_step_scenario() {
        let (engine, steps, events) = run_engine(config(500, 100.0, 0.0, 1, 0.0, 10));

        let record = &steps.records[0];
        assert_eq!(record.alive, 500);
        assert_eq!(record.dead, 0);
        // The 10 seeds all recover; everyone infected after the step is a
        // distinct susceptible contacted at least once.
        assert_eq!(engine.pop.recovered_count(), 10);
        assert_eq!(record.total_infected, 10 + record.current_infected);
        assert!(record.current_infected > 0);
        assert!(record.current_infected <= 490);
        assert_eq!(
            events
                .events
                .iter()
                .filter(|event| event.kind == EventKind::Infection)
                .count(),
            record.current_infected
        );
    }

    #[test]
    fn immunity_is_permanent() {
        let mut engine =
            Engine::new(config(250, 40.0, 0.0, 0, 0.3, 5)).expect("failed to construct engine");
        let mut steps = MemoryReport::new();
        let mut events = MemoryEvents::new();
        let mut i_agt_inf = Vec::new();

        let mut immune: Vec<usize> = Vec::new();
        for _ in 0..10 {
            engine
                .perform_step(&mut i_agt_inf, &mut steps, &mut events)
                .expect("failed to perform step");

            for &i_agt in &immune {
                assert!(matches!(
                    engine.pop.agent(i_agt),
                    Agent::Recovered | Agent::Vaccinated
                ));
            }

            immune = (0..engine.pop.size())
                .filter(|&i_agt| {
                    matches!(engine.pop.agent(i_agt), Agent::Recovered | Agent::Vaccinated)
                })
                .collect();
        }
    }

    #[test]
    fn identical_seeds_reproduce_the_run() {
        let cfg = config(300, 15.0, 0.3, 10, 0.2, 5);
        let (_, steps_a, events_a) = run_engine(cfg.clone());
        let (_, steps_b, events_b) = run_engine(cfg);

        assert_eq!(steps_a.records, steps_b.records);
        assert_eq!(events_a.events, events_b.events);
    }

    #[test]
    fn contact_sampling_fails_once_everyone_is_dead() {
        let (mut engine, steps, _) = run_engine(config(2, 100.0, 1.0, 2, 0.0, 1));

        assert_eq!(steps.records[1].alive, 0);
        assert_eq!(engine.pop.alive_count(), 0);

        let err = engine
            .infected_contacts(0)
            .expect_err("contact sampling must fail with no survivors");
        assert!(err.to_string().contains("no living contacts available"));
    }

    #[test]
    fn summary_reports_aggregate_counts() {
        let (engine, steps, _) = run_engine(config(200, 20.0, 0.5, 10, 0.25, 5));

        let summary = engine.summary();
        let last = steps.records.last().expect("run must emit records");
        assert_eq!(summary.population_size, 200);
        assert_eq!(summary.current_infected, last.current_infected);
        assert_eq!(summary.dead, last.dead);
        assert_eq!(summary.vaccinated, engine.pop.vaccinated_count());
        assert_eq!(
            summary.immune,
            engine.pop.vaccinated_count() + engine.pop.recovered_count()
        );
    }
}
