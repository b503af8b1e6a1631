//! Headless training loop: controller and course stepped in lockstep

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use summit_core::population::GenerationSummary;
use summit_core::{BotConfig, BotController, ControllerFrame};
use web_time::Instant;

use super::checkpoint::Checkpoint;
use super::course::{Course, CourseStats, DEFAULT_COURSE, PhysicsConfig};

/// Configuration for a headless run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Generations to breed before stopping
    pub generations: u32,
    /// Save a checkpoint and the value table every N generations (0 = only at the end)
    pub checkpoint_interval: u32,
    /// Simulated frames per second, drives the controller's clock
    pub frame_rate: f32,
    pub seed: u64,
    /// Course map file; the built-in course when unset
    pub course: Option<PathBuf>,
    pub physics: PhysicsConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            generations: 50,
            checkpoint_interval: 5,
            frame_rate: 60.0,
            seed: 42,
            course: None,
            physics: PhysicsConfig::default(),
        }
    }
}

/// Per-generation statistics
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingStats {
    pub generation: u32,
    pub best_fitness: f32,
    pub best_agent: String,
    pub species_count: usize,
    pub mass_extinction: bool,
    /// Course counters accumulated during this generation
    pub deaths: u32,
    pub goals: u32,
    pub cutscenes_skipped: u32,
}

pub struct TrainingEnv {
    config: TrainingConfig,
    controller: BotController,
    course: Course,
    clock_start: Instant,
    frames: u64,
    stats_history: Vec<TrainingStats>,
    last_course_stats: CourseStats,
}

impl TrainingEnv {
    pub fn new(bot: BotConfig, config: TrainingConfig) -> Result<Self> {
        let course = match &config.course {
            Some(path) => Course::from_file(path, config.physics.clone())?,
            None => Course::parse(DEFAULT_COURSE, config.physics.clone())
                .context("Built-in course failed to parse")?,
        };

        let mut controller =
            BotController::new(bot, config.seed).context("Invalid controller configuration")?;
        controller.set_targets(course.targets().to_vec());

        Ok(Self {
            config,
            controller,
            course,
            clock_start: Instant::now(),
            frames: 0,
            stats_history: Vec::new(),
            last_course_stats: CourseStats::default(),
        })
    }

    pub fn controller(&self) -> &BotController {
        &self.controller
    }

    pub fn course(&self) -> &Course {
        &self.course
    }

    pub fn stats_history(&self) -> &[TrainingStats] {
        &self.stats_history
    }

    /// Simulated time of the current frame
    fn now(&self) -> Instant {
        let seconds = self.frames as f64 / f64::from(self.config.frame_rate.max(1.0));
        self.clock_start + Duration::from_secs_f64(seconds)
    }

    /// Run one frame. Returns the summary when a generation was bred.
    pub fn step(&mut self) -> Result<(ControllerFrame, Option<GenerationSummary>)> {
        let vision = &self.controller.config().vision;
        let snapshot = self
            .course
            .snapshot(vision.width, vision.height)
            .context("Course produced a malformed snapshot")?;
        let status = self.course.status();

        let frame = self.controller.tick(&snapshot, &status, self.now());
        self.course.step(&frame);
        self.frames += 1;

        Ok((frame, self.controller.take_summary()))
    }

    /// Upper bound on frames one generation can take
    fn frame_budget_per_generation(&self) -> u64 {
        let bot = self.controller.config();
        let population = &bot.population;
        let per_agent = u64::from(population.max_frames_per_agent)
            + u64::from(population.grace_buffer_frames)
            + u64::from(self.config.physics.respawn_frames)
            + u64::from(self.config.physics.cutscene_frames)
            + (f64::from(population.death_reset_seconds) * f64::from(self.config.frame_rate))
                .ceil() as u64
            + 60;
        per_agent * population.size.max(1) as u64
    }

    /// Create a progress bar style
    fn progress_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} gens ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }

    pub fn run(&mut self) -> Result<Vec<TrainingStats>> {
        let generations = self.config.generations;
        let pb = ProgressBar::new(u64::from(generations));
        pb.set_style(Self::progress_style());
        pb.enable_steady_tick(Duration::from_millis(100));

        pb.println(format!(
            "Starting training: {} generations, {} population, {} targets",
            generations,
            self.controller.config().population.size,
            self.course.targets().len()
        ));

        let budget = self.frame_budget_per_generation();
        let mut generation_start = self.frames;
        let mut completed = 0;

        while completed < generations {
            if self.frames - generation_start > budget {
                pb.abandon_with_message("stalled");
                bail!(
                    "Generation {} did not finish within {} frames",
                    self.controller.population().generation(),
                    budget
                );
            }

            let (_, summary) = self.step()?;
            let Some(summary) = summary else {
                continue;
            };

            completed += 1;
            generation_start = self.frames;
            let stats = self.record(&summary);

            pb.inc(1);
            pb.set_message(format!(
                "best={:.1} species={} deaths={}",
                stats.best_fitness, stats.species_count, stats.deaths
            ));
            if stats.mass_extinction {
                pb.println(format!(
                    "Gen {}: mass extinction, {} species left",
                    stats.generation, stats.species_count
                ));
            }

            if self.config.checkpoint_interval > 0
                && summary.generation % self.config.checkpoint_interval == 0
            {
                self.save_checkpoint(&pb)?;
            }
        }

        self.save_checkpoint(&pb)?;
        pb.finish_with_message(format!(
            "done, best {:.1}",
            self.controller
                .population()
                .best_agent()
                .map(|a| a.fitness)
                .unwrap_or_default()
        ));

        Ok(self.stats_history.clone())
    }

    fn record(&mut self, summary: &GenerationSummary) -> TrainingStats {
        let course = self.course.stats();
        let last = self.last_course_stats;
        self.last_course_stats = course;

        let stats = TrainingStats {
            generation: summary.generation,
            best_fitness: summary.best_fitness,
            best_agent: summary.best_agent.clone(),
            species_count: summary.species_count,
            mass_extinction: summary.mass_extinction,
            deaths: course.deaths - last.deaths,
            goals: course.goals - last.goals,
            cutscenes_skipped: course.cutscenes_skipped - last.cutscenes_skipped,
        };
        self.stats_history.push(stats.clone());
        stats
    }

    /// Save the best genome and flush the value table
    fn save_checkpoint(&self, pb: &ProgressBar) -> Result<()> {
        if let Some(checkpoint) = Checkpoint::from_population(self.controller.population()) {
            let dir = &self.controller.config().paths.checkpoint_dir;
            let path = checkpoint.save(dir)?;
            pb.println(format!(
                "Saved checkpoint at generation {} ({})",
                checkpoint.generation,
                path.display()
            ));
        }

        if !self.controller.save_value_table() {
            pb.println("Value table could not be saved, continuing in memory");
        }
        Ok(())
    }
}
