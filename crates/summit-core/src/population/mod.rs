//! Generations of genomes, evaluated one agent at a time
//!
//! Each generation every agent plays one episode. When the last agent
//! finishes, natural selection builds the next generation:
//!
//! 1. speciate and rank species by best fitness
//! 2. drop species that stopped improving (the top two always survive)
//! 3. cull every species to its better half
//! 4. on stagnation, mass extinction keeps only the top species
//! 5. allot offspring in proportion to average fitness and breed

mod names;
mod species;

pub use names::NamePool;
pub use species::{Species, speciate};

use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use summit_neat::{CompatibilityConfig, GenomeNetwork, InnovationTracker, MutationConfig, crossover};
use web_time::Instant;

/// Species this large get their champion copied unchanged
const CHAMPION_MIN_SPECIES_SIZE: usize = 5;

/// Best species that survive even when stale
const ALWAYS_KEEP_SPECIES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub size: usize,
    /// Species kept by a mass extinction
    pub extinction_save_top: usize,
    /// Generations without a new best fitness before a mass extinction
    pub extinction_staleness: u32,
    /// Generations a species may go without improving before it is dropped
    pub species_staleness: u32,
    pub compatibility: CompatibilityConfig,
    /// Share of children made by cloning instead of crossover
    pub clone_chance: f32,
    /// Frames after a restart before the next agent may start
    pub grace_buffer_frames: u32,
    /// Seconds after a death before the next agent may start
    pub death_reset_seconds: f32,
    /// Frames an agent may play before its episode times out
    pub max_frames_per_agent: u32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 50,
            extinction_save_top: 5,
            extinction_staleness: 20,
            species_staleness: 15,
            compatibility: CompatibilityConfig::default(),
            clone_chance: 0.25,
            grace_buffer_frames: 160,
            death_reset_seconds: 3.5,
            max_frames_per_agent: 1800,
        }
    }
}

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeEnd {
    Death,
    Timeout,
    GoalReached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub genome: GenomeNetwork,
    pub fitness: f32,
    /// Name of the species the agent was bred in or assigned to
    pub species: String,
    pub evaluated: bool,
}

/// What happened in one round of natural selection
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: u32,
    pub best_fitness: f32,
    pub best_agent: String,
    pub species_count: usize,
    pub mass_extinction: bool,
}

/// Start conditions for the next agent: enough frames since the last restart
/// and enough wall-clock time since the last death
#[derive(Debug, Clone)]
pub struct SpawnGate {
    grace_frames: u32,
    death_delay: Duration,
    frames_since_restart: u32,
    died_at: Option<Instant>,
}

impl SpawnGate {
    pub fn new(grace_frames: u32, death_delay: Duration) -> Self {
        Self {
            grace_frames,
            death_delay,
            frames_since_restart: 0,
            died_at: None,
        }
    }

    pub fn from_config(config: &PopulationConfig) -> Self {
        Self::new(
            config.grace_buffer_frames,
            Duration::from_secs_f32(config.death_reset_seconds.max(0.0)),
        )
    }

    pub fn tick(&mut self) {
        self.frames_since_restart = self.frames_since_restart.saturating_add(1);
    }

    pub fn on_restart(&mut self) {
        self.frames_since_restart = 0;
    }

    pub fn on_death(&mut self, now: Instant) {
        self.died_at = Some(now);
    }

    pub fn frames_since_restart(&self) -> u32 {
        self.frames_since_restart
    }

    pub fn ready(&self, now: Instant) -> bool {
        let grace_elapsed = self.frames_since_restart >= self.grace_frames;
        let death_elapsed = self
            .died_at
            .is_none_or(|died| now.saturating_duration_since(died) >= self.death_delay);
        grace_elapsed && death_elapsed
    }
}

pub struct Population {
    config: PopulationConfig,
    mutation: MutationConfig,
    tracker: InnovationTracker,
    agents: Vec<Agent>,
    current: usize,
    species: Vec<Species>,
    generation: u32,
    best_fitness: f32,
    best_agent: Option<Agent>,
    generations_without_improvement: u32,
    best_history: Vec<f32>,
    organism_names: NamePool,
    species_names: NamePool,
    extinction_requested: bool,
    rng: Xoshiro256PlusPlus,
}

impl Population {
    pub fn new(
        config: PopulationConfig,
        mutation: MutationConfig,
        input_count: usize,
        output_count: usize,
        organism_names: NamePool,
        species_names: NamePool,
        seed: u64,
    ) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut tracker = InnovationTracker::for_network(input_count, output_count);
        let mut organism_names = organism_names;

        let agents = (0..config.size.max(1))
            .map(|_| {
                let mut genome = GenomeNetwork::minimal(
                    input_count,
                    output_count,
                    &mut tracker,
                    mutation.weight_maximum,
                    &mut rng,
                );
                genome.mutate(&mutation, &mut tracker, &mut rng);
                Agent {
                    name: organism_names.next_name(),
                    genome,
                    fitness: 0.0,
                    species: String::new(),
                    evaluated: false,
                }
            })
            .collect();

        log::info!(
            "Created population of {} ({} inputs, {} outputs)",
            config.size,
            input_count,
            output_count
        );

        Self {
            config,
            mutation,
            tracker,
            agents,
            current: 0,
            species: Vec::new(),
            generation: 0,
            best_fitness: f32::MIN,
            best_agent: None,
            generations_without_improvement: 0,
            best_history: Vec::new(),
            organism_names,
            species_names,
            extinction_requested: false,
            rng,
        }
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_agent(&self) -> &Agent {
        &self.agents[self.current]
    }

    /// Best fitness of each finished generation, oldest first
    pub fn best_history(&self) -> &[f32] {
        &self.best_history
    }

    /// Best agent seen in any generation
    pub fn best_agent(&self) -> Option<&Agent> {
        self.best_agent.as_ref()
    }

    /// Run a mass extinction at the next natural selection
    pub fn request_mass_extinction(&mut self) {
        self.extinction_requested = true;
    }

    /// Record the current agent's fitness and move on. Returns a summary when
    /// this was the generation's last agent and a new generation was bred.
    pub fn finish_current(&mut self, fitness: f32, end: EpisodeEnd) -> Option<GenerationSummary> {
        let agent = &mut self.agents[self.current];
        agent.fitness = fitness;
        agent.evaluated = true;
        log::debug!(
            "Agent {} '{}' finished ({:?}) with fitness {:.2}",
            self.current,
            agent.name,
            end,
            fitness
        );

        self.current += 1;
        if self.current < self.agents.len() {
            return None;
        }
        Some(self.natural_selection())
    }

    /// Breed the next generation from the evaluated agents
    pub fn natural_selection(&mut self) -> GenerationSummary {
        speciate(
            &mut self.species,
            self.agents.iter().map(|a| &a.genome),
            &self.config.compatibility,
            &mut self.species_names,
        );

        let agents = &mut self.agents;
        for s in &mut self.species {
            s.update_fitness(|i| agents[i].fitness);
            for &member in &s.members {
                agents[member].species = s.name.clone();
            }
            s.members
                .sort_by(|&a, &b| agents[b].fitness.total_cmp(&agents[a].fitness));
        }
        self.species.sort_by(|a, b| b.best_fitness.total_cmp(&a.best_fitness));

        // Generation best and global record
        let (best_index, generation_best) = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, a)| (i, a.fitness))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        if generation_best > self.best_fitness {
            self.best_fitness = generation_best;
            self.best_agent = Some(self.agents[best_index].clone());
            self.generations_without_improvement = 0;
        } else {
            self.generations_without_improvement += 1;
        }
        self.best_history.push(generation_best);
        let best_agent = self.agents[best_index].name.clone();

        // Stale species go, the best ones stay regardless
        let limit = self.config.species_staleness;
        let mut rank = 0;
        self.species.retain(|s| {
            let keep = rank < ALWAYS_KEEP_SPECIES || s.staleness < limit;
            rank += 1;
            keep
        });

        let sizes_before_cull: Vec<usize> = self.species.iter().map(|s| s.members.len()).collect();
        for s in &mut self.species {
            let keep = s.members.len().div_ceil(2).max(1);
            s.members.truncate(keep);
        }

        let mass_extinction = self.extinction_requested
            || self.generations_without_improvement >= self.config.extinction_staleness;
        if mass_extinction && self.species.len() > self.config.extinction_save_top {
            log::warn!(
                "Mass extinction: keeping {} of {} species",
                self.config.extinction_save_top,
                self.species.len()
            );
            self.species.truncate(self.config.extinction_save_top.max(1));
        }
        if mass_extinction {
            self.extinction_requested = false;
            self.generations_without_improvement = 0;
        }

        let next = self.breed(&sizes_before_cull);

        for s in &mut self.species {
            if let Some(&champion) = s.members.first() {
                s.representative = self.agents[champion].genome.clone();
            }
        }

        self.agents = next;
        self.current = 0;
        self.generation += 1;

        let summary = GenerationSummary {
            generation: self.generation,
            best_fitness: generation_best,
            best_agent,
            species_count: self.species.len(),
            mass_extinction,
        };
        log::info!(
            "Generation {} bred: best {:.2} ('{}'), {} species{}",
            summary.generation,
            summary.best_fitness,
            summary.best_agent,
            summary.species_count,
            if mass_extinction { ", after mass extinction" } else { "" }
        );
        summary
    }

    fn allot_offspring(&self) -> Vec<usize> {
        let size = self.config.size.max(1);
        let weights: Vec<f32> = self
            .species
            .iter()
            .map(|s| s.average_fitness.max(0.0))
            .collect();
        let total: f32 = weights.iter().sum();

        let mut allotted: Vec<usize> = if total > 0.0 {
            weights
                .iter()
                .map(|w| (w / total * size as f32).floor() as usize)
                .collect()
        } else {
            vec![size / self.species.len().max(1); self.species.len()]
        };

        // Rounding leftovers go to the best species first
        let mut assigned: usize = allotted.iter().sum();
        let count = allotted.len();
        let mut i = 0;
        while assigned < size && count > 0 {
            allotted[i % count] += 1;
            assigned += 1;
            i += 1;
        }
        allotted
    }

    fn breed(&mut self, sizes_before_cull: &[usize]) -> Vec<Agent> {
        let allotted = self.allot_offspring();
        let mut next = Vec::with_capacity(self.config.size);

        for (s_index, s) in self.species.iter().enumerate() {
            let mut count = allotted[s_index];
            if count == 0 || s.members.is_empty() {
                continue;
            }

            if sizes_before_cull[s_index] >= CHAMPION_MIN_SPECIES_SIZE {
                let champion = &self.agents[s.members[0]];
                next.push(Agent {
                    name: champion.name.clone(),
                    genome: champion.genome.clone(),
                    fitness: 0.0,
                    species: s.name.clone(),
                    evaluated: false,
                });
                count -= 1;
            }

            for _ in 0..count {
                let genome = if s.members.len() == 1
                    || self.rng.random::<f32>() < self.config.clone_chance
                {
                    let Some(&parent) = s.members.choose(&mut self.rng) else {
                        continue;
                    };
                    self.agents[parent].genome.clone()
                } else {
                    let (Some(&a), Some(&b)) = (
                        s.members.choose(&mut self.rng),
                        s.members.choose(&mut self.rng),
                    ) else {
                        continue;
                    };
                    crossover(
                        &self.agents[a].genome,
                        self.agents[a].fitness,
                        &self.agents[b].genome,
                        self.agents[b].fitness,
                        &mut self.rng,
                    )
                };

                let mut genome = genome;
                genome.mutate(&self.mutation, &mut self.tracker, &mut self.rng);
                next.push(Agent {
                    name: self.organism_names.next_name(),
                    genome,
                    fitness: 0.0,
                    species: s.name.clone(),
                    evaluated: false,
                });
            }
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_population(size: usize) -> Population {
        let config = PopulationConfig {
            size,
            ..PopulationConfig::default()
        };
        Population::new(
            config,
            MutationConfig::default(),
            4,
            2,
            NamePool::new(["Ada", "Bo", "Cy"].map(String::from), 3),
            NamePool::new(["Fern", "Moss"].map(String::from), 4),
            7,
        )
    }

    #[test]
    fn test_spawn_gate_needs_grace_frames() {
        let mut gate = SpawnGate::new(3, Duration::ZERO);
        let now = Instant::now();
        assert!(!gate.ready(now));
        for _ in 0..3 {
            gate.tick();
        }
        assert!(gate.ready(now));
        gate.on_restart();
        assert!(!gate.ready(now));
    }

    #[test]
    fn test_spawn_gate_waits_after_death() {
        let mut gate = SpawnGate::new(0, Duration::from_millis(3500));
        let died = Instant::now();
        gate.on_death(died);

        assert!(!gate.ready(died + Duration::from_millis(3000)));
        assert!(gate.ready(died + Duration::from_millis(3500)));
    }

    #[test]
    fn test_agents_get_unique_names() {
        let population = small_population(8);
        let mut names: Vec<&str> = population.agents().iter().map(|a| a.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_generation_rolls_over_after_last_agent() {
        let mut population = small_population(6);

        for i in 0..5 {
            assert!(population.finish_current(i as f32, EpisodeEnd::Death).is_none());
        }
        let summary = population.finish_current(10.0, EpisodeEnd::GoalReached).unwrap();

        assert_eq!(summary.generation, 1);
        assert_eq!(summary.best_fitness, 10.0);
        assert_eq!(population.current_index(), 0);
        assert_eq!(population.agents().len(), 6);
        assert_eq!(population.best_history(), &[10.0]);
        assert!(population.agents().iter().all(|a| !a.evaluated));
        assert!(population.agents().iter().all(|a| a.genome.is_feed_forward()));
    }

    #[test]
    fn test_offspring_leftovers_fill_population() {
        let mut population = small_population(10);
        let genome = population.agents()[0].genome.clone();
        population.species = ["A", "B", "C"]
            .into_iter()
            .map(|name| {
                let mut s = Species::new(name.to_string(), genome.clone());
                s.average_fitness = 1.0;
                s
            })
            .collect();

        assert_eq!(population.allot_offspring(), vec![4, 3, 3]);

        population.species.iter_mut().for_each(|s| s.average_fitness = 0.0);
        assert_eq!(population.allot_offspring(), vec![4, 3, 3]);
    }

    #[test]
    fn test_requested_extinction_trims_species() {
        let mut population = small_population(12);
        population.config.compatibility.threshold = 0.0;
        population.config.extinction_save_top = 1;
        population.request_mass_extinction();

        for i in 0..12 {
            population.finish_current(i as f32, EpisodeEnd::Timeout);
        }

        assert!(population.species().len() <= 1);
        assert_eq!(population.agents().len(), 12);
    }
}
