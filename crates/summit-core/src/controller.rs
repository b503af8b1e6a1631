//! The per-tick entry point
//!
//! Order within a tick:
//! 1. death ends the active episode
//! 2. with no active agent, the spawn gate decides whether the next one starts
//! 3. the lifecycle may force the frame (cutscene skip, restart handling)
//! 4. an agent over its frame budget times out and a restart is requested
//! 5. evaluate, correct, decode, learn from the previous transition, emit
//!
//! All state that carries across ticks lives in [`TickContext`] and is only
//! written from [`BotController::tick`].

use glam::Vec2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use summit_neat::NetworkLayout;
use web_time::Instant;

use crate::config::BotConfig;
use crate::decoder::{ChannelBias, ControlDecoder};
use crate::error::ConfigError;
use crate::fitness::FitnessTracker;
use crate::frame::{Buttons, ControllerFrame, LongJumpTimer};
use crate::lifecycle::{Lifecycle, LifecyclePhase, OverrideReason};
use crate::perception::{EnvironmentSnapshot, HostStatus};
use crate::population::{EpisodeEnd, GenerationSummary, NamePool, Population, SpawnGate};
use crate::qlearning::{self, ActionKey, ActionPattern, QTable, StateKey, state_key};

/// Transition whose outcome is observed on the next tick
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition {
    pub state: StateKey,
    pub action: ActionKey,
}

/// Cross-tick state with a single writer
#[derive(Debug, Clone, Default)]
pub struct TickContext {
    pub long_jump: LongJumpTimer,
    pub lifecycle: Lifecycle,
    /// Last emitted frame
    pub previous_frame: ControllerFrame,
    pub pending: Option<PendingTransition>,
    /// Frames the active agent has controlled
    pub episode_frames: u32,
    pub total_frames: u64,
}

impl TickContext {
    pub fn new(long_jump_frames: u32) -> Self {
        Self {
            long_jump: LongJumpTimer::new(long_jump_frames),
            ..Self::default()
        }
    }
}

struct Episode {
    fitness: FitnessTracker,
}

pub struct BotController {
    config: BotConfig,
    decoder: ControlDecoder,
    population: Population,
    qtable: QTable,
    context: TickContext,
    gate: SpawnGate,
    episode: Option<Episode>,
    targets: Vec<Vec2>,
    last_summary: Option<GenerationSummary>,
    rng: Xoshiro256PlusPlus,
}

impl BotController {
    /// Build a controller from configuration: name pools and the value table
    /// are read from the configured paths, failures degrade to empty.
    pub fn new(config: BotConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;

        let organism_names = NamePool::from_file(&config.paths.organism_names, seed);
        let species_names = NamePool::from_file(&config.paths.species_names, seed.wrapping_add(1));
        let population = Population::new(
            config.population.clone(),
            config.mutation.clone(),
            config.input_count(),
            config.output_count(),
            organism_names,
            species_names,
            seed,
        );

        let qtable = match qlearning::load_table(&config.paths.value_table) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("Value table unusable ({}), starting empty", e);
                QTable::new()
            }
        };

        Ok(Self::from_parts(config, population, qtable, seed))
    }

    pub fn from_parts(
        config: BotConfig,
        population: Population,
        qtable: QTable,
        seed: u64,
    ) -> Self {
        Self {
            decoder: ControlDecoder::new(config.decoder.clone()),
            gate: SpawnGate::from_config(&config.population),
            context: TickContext::new(config.decoder.long_jump_frames),
            population,
            qtable,
            episode: None,
            targets: Vec::new(),
            last_summary: None,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            config,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    pub fn qtable(&self) -> &QTable {
        &self.qtable
    }

    pub fn context(&self) -> &TickContext {
        &self.context
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.context.lifecycle.phase(&self.context.previous_frame)
    }

    /// Ordered fitness targets for upcoming episodes
    pub fn set_targets(&mut self, targets: Vec<Vec2>) {
        self.targets = targets;
    }

    pub fn has_active_agent(&self) -> bool {
        self.episode.is_some()
    }

    /// Fitness so far of the active agent
    pub fn current_fitness(&self) -> Option<f32> {
        self.episode.as_ref().map(|e| e.fitness.fitness())
    }

    /// Summary of the most recent natural selection
    pub fn last_summary(&self) -> Option<&GenerationSummary> {
        self.last_summary.as_ref()
    }

    pub fn take_summary(&mut self) -> Option<GenerationSummary> {
        self.last_summary.take()
    }

    /// Draw data for the genome currently being evaluated
    pub fn current_layout(&self, size: Vec2) -> NetworkLayout {
        NetworkLayout::compute(&self.population.current_agent().genome, size)
    }

    /// Flush the value table. Failures are logged and training goes on.
    pub fn save_value_table(&self) -> bool {
        match qlearning::save_table(&self.qtable, &self.config.paths.value_table) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to save value table, continuing in memory: {}", e);
                false
            }
        }
    }

    /// Decide this tick's frame
    pub fn tick(
        &mut self,
        snapshot: &EnvironmentSnapshot,
        status: &HostStatus,
        now: Instant,
    ) -> ControllerFrame {
        self.context.total_frames += 1;
        self.gate.tick();

        if status.is_dead && self.episode.is_some() {
            let penalty = -self.config.qlearning.death_penalty;
            self.end_episode(EpisodeEnd::Death, Some(penalty));
            self.gate.on_death(now);
            self.gate.on_restart();
        }

        if self.episode.is_none() && !status.is_dead && self.gate.ready(now) {
            self.start_episode(snapshot.position());
        }

        if let Some(forced) = self
            .context
            .lifecycle
            .step(&self.context.previous_frame, status)
        {
            if forced.reason == OverrideReason::RestartRequest {
                self.gate.on_restart();
            }
            // Forced frames are not agent actions and carry no held jump
            self.context.pending = None;
            self.context.long_jump.cancel();
            return self.emit(forced.frame());
        }

        if self.episode.is_none() {
            let mut frame = ControllerFrame::neutral();
            self.context.long_jump.apply(&mut frame, false);
            return self.emit(frame);
        }

        if self.context.episode_frames >= self.config.population.max_frames_per_agent {
            self.end_episode(EpisodeEnd::Timeout, None);
            return self.request_restart();
        }

        if snapshot.input_len() != self.config.input_count() {
            log::error!(
                "Snapshot provides {} inputs, network expects {}; emitting neutral frame",
                snapshot.input_len(),
                self.config.input_count()
            );
            let mut frame = ControllerFrame::neutral();
            self.context.long_jump.apply(&mut frame, false);
            return self.emit(frame);
        }

        self.control(snapshot)
    }

    fn control(&mut self, snapshot: &EnvironmentSnapshot) -> ControllerFrame {
        let Some(episode) = self.episode.as_mut() else {
            return self.emit(ControllerFrame::neutral());
        };
        let reward = episode.fitness.update(snapshot.position());
        let goal_reached = episode.fitness.goal_reached();
        let state = state_key(snapshot);

        if goal_reached {
            self.end_episode(EpisodeEnd::GoalReached, Some(reward));
            return self.request_restart();
        }

        let outputs = self
            .population
            .current_agent()
            .genome
            .evaluate(&snapshot.to_input_vector());

        let proposed = self.decoder.decode_channels(&outputs, &ChannelBias::none());
        let bias = self.qtable.select_correction(
            &self.config.qlearning,
            &state,
            &ActionPattern::of(&proposed.frame),
            &mut self.rng,
        );
        let frame = self
            .decoder
            .decode(&outputs, &bias, &mut self.context.long_jump);

        if let Some(previous) = self.context.pending.take() {
            self.qtable.observe(
                &self.config.qlearning,
                &previous.state,
                &previous.action,
                reward,
                &state,
            );
        }
        self.context.pending = Some(PendingTransition {
            state,
            action: ActionPattern::of(&frame).key(),
        });
        self.context.episode_frames += 1;

        self.emit(frame)
    }

    fn start_episode(&mut self, spawn: Vec2) {
        let agent = self.population.current_agent();
        log::info!(
            "Gen {} agent {}/{} '{}' ({}) starting",
            self.population.generation(),
            self.population.current_index() + 1,
            self.population.agents().len(),
            agent.name,
            agent.species
        );
        self.episode = Some(Episode {
            fitness: FitnessTracker::new(self.config.fitness.clone(), spawn, self.targets.clone()),
        });
        self.context.episode_frames = 0;
        self.context.pending = None;
        self.context.long_jump.cancel();
    }

    /// Finalize the active agent. A terminal reward closes out the pending
    /// transition; without one the transition is dropped.
    fn end_episode(&mut self, end: EpisodeEnd, terminal_reward: Option<f32>) {
        let Some(episode) = self.episode.take() else {
            return;
        };

        if let (Some(previous), Some(reward)) = (self.context.pending.take(), terminal_reward) {
            self.qtable.observe_terminal(
                &self.config.qlearning,
                &previous.state,
                &previous.action,
                reward,
            );
        }
        self.context.pending = None;
        self.context.long_jump.cancel();

        let fitness = episode.fitness.fitness();
        log::info!(
            "Agent '{}' ended by {:?} after {} frames, fitness {:.2}",
            self.population.current_agent().name,
            end,
            self.context.episode_frames,
            fitness
        );
        if let Some(summary) = self.population.finish_current(fitness, end) {
            self.last_summary = Some(summary);
        }
    }

    fn request_restart(&mut self) -> ControllerFrame {
        self.gate.on_restart();
        let mut frame = ControllerFrame::only(Buttons::QUICK_RESTART);
        self.context.long_jump.apply(&mut frame, false);
        self.emit(frame)
    }

    fn emit(&mut self, frame: ControllerFrame) -> ControllerFrame {
        self.context.previous_frame = frame;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::{CutsceneStatus, ScalarSenses};
    use crate::population::PopulationConfig;
    use summit_neat::MutationConfig;

    fn config() -> BotConfig {
        let mut config = BotConfig::default();
        config.vision.width = 3;
        config.vision.height = 3;
        config.population = PopulationConfig {
            size: 3,
            grace_buffer_frames: 0,
            death_reset_seconds: 0.0,
            max_frames_per_agent: 5,
            ..PopulationConfig::default()
        };
        config
    }

    fn controller() -> BotController {
        let config = config();
        let population = Population::new(
            config.population.clone(),
            MutationConfig::default(),
            config.input_count(),
            config.output_count(),
            NamePool::empty(),
            NamePool::empty(),
            1,
        );
        BotController::from_parts(config, population, QTable::new(), 1)
    }

    fn snapshot(x: f32) -> EnvironmentSnapshot {
        EnvironmentSnapshot::new(3, 3, vec![0.0; 9], ScalarSenses::default(), Vec2::new(x, 0.0))
            .unwrap()
    }

    #[test]
    fn test_first_tick_starts_agent() {
        let mut bot = controller();
        bot.tick(&snapshot(0.0), &HostStatus::default(), Instant::now());
        assert!(bot.has_active_agent());
        assert_eq!(bot.context().episode_frames, 1);
        assert!(bot.context().pending.is_some());
    }

    #[test]
    fn test_timeout_requests_restart_and_advances_agent() {
        let mut bot = controller();
        let now = Instant::now();
        for i in 0..5 {
            bot.tick(&snapshot(i as f32), &HostStatus::default(), now);
        }
        let frame = bot.tick(&snapshot(5.0), &HostStatus::default(), now);

        assert_eq!(frame.buttons, Buttons::QUICK_RESTART);
        assert!(!bot.has_active_agent());
        assert_eq!(bot.population().current_index(), 1);

        // Restart confirmation follows on the next tick
        let confirm = bot.tick(&snapshot(0.0), &HostStatus::default(), now);
        assert_eq!(confirm.buttons, Buttons::MENU_CONFIRM);
    }

    #[test]
    fn test_death_learns_penalty() {
        let mut bot = controller();
        let now = Instant::now();
        bot.tick(&snapshot(0.0), &HostStatus::default(), now);
        let pending = bot.context().pending.clone().unwrap();

        let dead = HostStatus {
            is_dead: true,
            ..HostStatus::default()
        };
        bot.tick(&snapshot(0.0), &dead, now);

        assert!(!bot.has_active_agent());
        let value = bot.qtable().value(&pending.state, &pending.action).unwrap();
        assert!(value < 0.0);
    }

    #[test]
    fn test_mismatched_snapshot_is_neutral() {
        let mut bot = controller();
        let wrong =
            EnvironmentSnapshot::new(2, 2, vec![0.0; 4], ScalarSenses::default(), Vec2::ZERO)
                .unwrap();
        let frame = bot.tick(&wrong, &HostStatus::default(), Instant::now());
        assert_eq!(frame, ControllerFrame::neutral());
    }

    /// Active agent with a long jump freshly started
    fn controller_mid_long_jump() -> BotController {
        let mut bot = controller();
        bot.tick(&snapshot(0.0), &HostStatus::default(), Instant::now());
        bot.context.long_jump.apply(&mut ControllerFrame::neutral(), true);
        assert!(bot.context().long_jump.is_holding());
        bot
    }

    #[test]
    fn test_mismatched_snapshot_keeps_long_jump_counting() {
        let mut bot = controller_mid_long_jump();
        let remaining = bot.context().long_jump.remaining();
        let wrong =
            EnvironmentSnapshot::new(2, 2, vec![0.0; 4], ScalarSenses::default(), Vec2::ZERO)
                .unwrap();

        let frame = bot.tick(&wrong, &HostStatus::default(), Instant::now());
        assert_eq!(frame.buttons, Buttons::JUMP);
        assert_eq!(bot.context().long_jump.remaining(), remaining - 1);
    }

    #[test]
    fn test_host_restart_drops_long_jump() {
        let mut bot = controller_mid_long_jump();
        let host = HostStatus {
            quick_restart_pending: true,
            ..HostStatus::default()
        };
        let now = Instant::now();

        let request = bot.tick(&snapshot(1.0), &host, now);
        assert_eq!(request.buttons, Buttons::QUICK_RESTART);
        assert!(!bot.context().long_jump.is_holding());

        let confirm = bot.tick(&snapshot(1.0), &host, now);
        assert_eq!(confirm.buttons, Buttons::MENU_CONFIRM);
    }

    #[test]
    fn test_cutscene_escape_drops_long_jump() {
        let mut bot = controller_mid_long_jump();
        let host = HostStatus {
            cutscene: CutsceneStatus::InCutscene,
            ..HostStatus::default()
        };
        let frame = bot.tick(&snapshot(1.0), &host, Instant::now());
        assert_eq!(frame.buttons, Buttons::ESCAPE);
        assert!(!bot.context().long_jump.is_holding());
    }

    #[test]
    fn test_cutscene_overrides_agent() {
        let mut bot = controller();
        let host = HostStatus {
            cutscene: CutsceneStatus::InCutscene,
            ..HostStatus::default()
        };
        let frame = bot.tick(&snapshot(0.0), &host, Instant::now());
        assert_eq!(frame.buttons, Buttons::ESCAPE);
        assert_eq!(bot.phase(), LifecyclePhase::CutsceneEscaping);
    }
}
