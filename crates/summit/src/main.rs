use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use glam::Vec2;
use summit::SummitConfig;
use summit::headless::{Checkpoint, TrainingEnv};
use summit_core::neat::NetworkLayout;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run headless evolution training on the course
    #[arg(long)]
    train: bool,

    /// Configuration file (RON). Defaults to summit.ron when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of generations to train
    #[arg(long)]
    generations: Option<u32>,

    /// Population size per generation
    #[arg(long)]
    population: Option<usize>,

    /// Seed for evolution and exploration
    #[arg(long)]
    seed: Option<u64>,

    /// Course map file instead of the built-in course
    #[arg(long)]
    course: Option<PathBuf>,

    /// Output directory for checkpoints
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print a saved checkpoint and exit
    #[arg(long)]
    inspect: Option<PathBuf>,

    /// Print the effective configuration as RON and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Some(path) = &args.inspect {
        return inspect_checkpoint(path);
    }

    let config = load_config(&args)?;

    if args.print_config {
        let ron = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default())
            .context("Failed to serialize configuration")?;
        println!("{}", ron);
        return Ok(());
    }

    if args.train {
        return run_training(config);
    }

    Args::command().print_help()?;
    Ok(())
}

/// Layered configuration with command line overrides on top
fn load_config(args: &Args) -> anyhow::Result<SummitConfig> {
    let mut config = match &args.config {
        Some(path) => SummitConfig::load_from(path)?,
        None => SummitConfig::load()?,
    };

    if let Some(generations) = args.generations {
        config.training.generations = generations;
    }
    if let Some(size) = args.population {
        config.bot.population.size = size;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    if let Some(course) = &args.course {
        config.training.course = Some(course.clone());
    }
    if let Some(output) = &args.output {
        config.bot.paths.checkpoint_dir = output.clone();
    }

    config
        .bot
        .validate()
        .context("Invalid command line overrides")?;
    Ok(config)
}

fn run_training(config: SummitConfig) -> anyhow::Result<()> {
    log::info!("Starting headless training");
    log::info!("  Generations: {}", config.training.generations);
    log::info!("  Population: {}", config.bot.population.size);
    log::info!(
        "  Vision: {}x{} ({} inputs)",
        config.bot.vision.width,
        config.bot.vision.height,
        config.bot.input_count()
    );
    log::info!("  Seed: {}", config.training.seed);
    log::info!(
        "  Course: {}",
        config
            .training
            .course
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    log::info!(
        "  Checkpoints: {}",
        config.bot.paths.checkpoint_dir.display()
    );

    let mut env = TrainingEnv::new(config.bot, config.training)?;
    let stats = env.run()?;

    if let Some(last) = stats.last() {
        log::info!(
            "Training complete: generation {}, best {:.2} ('{}'), {} species",
            last.generation,
            last.best_fitness,
            last.best_agent,
            last.species_count
        );
    }
    let course = env.course().stats();
    log::info!(
        "Course totals: {} frames, {} deaths, {} restarts, {} goals, {}/{} cutscenes skipped",
        course.frames,
        course.deaths,
        course.restarts,
        course.goals,
        course.cutscenes_skipped,
        course.cutscenes_started
    );
    Ok(())
}

fn inspect_checkpoint(path: &std::path::Path) -> anyhow::Result<()> {
    let checkpoint = Checkpoint::load(path)?;
    let genome = &checkpoint.genome;
    let layout = NetworkLayout::compute(genome, Vec2::new(800.0, 600.0));

    println!("Checkpoint {}", path.display());
    println!("  Saved:      {}", checkpoint.created_at);
    println!("  Generation: {}", checkpoint.generation);
    println!(
        "  Champion:   '{}' of {} (fitness {:.2})",
        checkpoint.agent_name, checkpoint.species, checkpoint.fitness
    );
    println!(
        "  Network:    {} inputs, {} outputs, {} nodes in {} layers",
        genome.input_count(),
        genome.output_count(),
        genome.nodes().len(),
        genome.layer_count()
    );
    println!(
        "  Genes:      {} connections, {} enabled",
        genome.connections().len(),
        layout.edges.len()
    );

    let recent: Vec<String> = checkpoint
        .best_history
        .iter()
        .rev()
        .take(10)
        .rev()
        .map(|f| format!("{:.1}", f))
        .collect();
    println!("  Recent best: [{}]", recent.join(", "));
    Ok(())
}
