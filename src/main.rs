//! Loopdeck CLI - live pattern sessions against an external pattern runtime

use clap::{Parser, Subcommand};
use loopdeck::collection::{PatternCollection, PatternRecord};
use loopdeck::combine::combine_program;
use loopdeck::command::{render_grid, render_params, CommandHandler, HELP};
use loopdeck::config::Config;
use loopdeck::generator::PatternGenerator;
use loopdeck::osc_control::OscControlServer;
use loopdeck::repl::Repl;
use loopdeck::runtime::{EvalRuntime, OscRuntime, PrintRuntime};
use loopdeck::session::SessionEngine;
use loopdeck::step_grid::{try_decode_grid, GridSize};
use loopdeck::tempo::strip_tempo_directive;
use loopdeck::watch::TrackFileWatcher;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "loopdeck")]
#[command(about = "Live pattern sessions for Strudel-style runtimes", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/loopdeck/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session on stdin
    Repl {
        /// Print programs instead of sending them to the runtime
        #[arg(long)]
        dry_run: bool,
    },

    /// Interactive session plus an OSC control listener
    Serve {
        /// Control port (default from config: 57131)
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Play a file as a track and re-evaluate it on every save
    Watch {
        /// Track id
        track: String,

        /// Pattern file
        file: PathBuf,

        #[arg(long)]
        dry_run: bool,
    },

    /// Show the step grid of a fragment
    Grid {
        fragment: String,

        /// Grid length, 8 or 16
        #[arg(short, long)]
        steps: Option<usize>,
    },

    /// List the adjustable effect parameters of a fragment
    Params { fragment: String },

    /// Print the program the given collection patterns combine into
    Combine {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Generate a fragment with the configured generator command
    Generate {
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// List the pattern collection
    List,

    /// Add or replace a pattern in the collection
    Add {
        id: String,
        fragment: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Display color, e.g. "#ff5500"
        #[arg(long)]
        color: Option<String>,

        /// Base tempo in BPM
        #[arg(long)]
        bpm: Option<f64>,

        /// Sample to preload before playing
        #[arg(long)]
        sample_url: Option<String>,
    },

    /// Remove a pattern from the collection
    Remove { id: String },
}

/// Long-running session front ends
enum Frontend {
    Repl,
    Serve { port: u16 },
    Watch { track: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Repl { dry_run } => start(&config, dry_run, Frontend::Repl).await?,

        Commands::Serve { port, dry_run } => {
            let port = port.unwrap_or(config.control.port);
            start(&config, dry_run, Frontend::Serve { port }).await?
        }

        Commands::Watch {
            track,
            file,
            dry_run,
        } => start(&config, dry_run, Frontend::Watch { track, file }).await?,

        Commands::Grid { fragment, steps } => {
            let size = match steps {
                Some(steps) => GridSize::from_steps(steps)
                    .ok_or_else(|| format!("grid must have 8 or 16 steps, got {}", steps))?,
                None => config.grid_size(),
            };
            let (_, body) = strip_tempo_directive(&fragment);
            match try_decode_grid(&body, size) {
                Some(grid) => println!("{}", render_grid("grid", &grid)),
                None => println!("not grid-editable"),
            }
        }

        Commands::Params { fragment } => println!("{}", render_params(&fragment)),

        Commands::Combine { ids } => {
            let collection = PatternCollection::load(&config.collection_path())?;
            let mut directive = None;
            let mut bodies = Vec::new();
            for id in &ids {
                let record = collection.require(id)?;
                let (found, body) = strip_tempo_directive(&record.fragment);
                if found.is_some() {
                    directive = found;
                }
                bodies.push(body);
            }
            let program = combine_program(
                bodies.iter().map(String::as_str),
                directive.as_ref().map(|d| d.text.as_str()),
            );
            println!("{}", program.unwrap_or_else(|| "-- silence".to_string()));
        }

        Commands::Generate { prompt } => {
            let generator = PatternGenerator::from_config(&config.generator)?;
            println!("{}", generator.generate(&prompt.join(" ")).await?);
        }

        Commands::List => {
            let collection = PatternCollection::load(&config.collection_path())?;
            if collection.list().is_empty() {
                println!("{} is empty", collection.path().display());
            }
            for record in collection.list() {
                let tempo = record
                    .base_tempo
                    .map(|bpm| format!("  {} bpm", bpm))
                    .unwrap_or_default();
                println!("{:<12} {}{}", record.id, record.display_name, tempo);
                println!("    {}", record.fragment.replace('\n', "\n    "));
            }
        }

        Commands::Add {
            id,
            fragment,
            name,
            description,
            color,
            bpm,
            sample_url,
        } => {
            let mut collection = PatternCollection::load(&config.collection_path())?;
            let mut record = PatternRecord::new(&id, &fragment);
            if let Some(name) = name {
                record.display_name = name;
            }
            record.description = description.unwrap_or_default();
            record.color = color.unwrap_or_default();
            record.base_tempo = bpm;
            record.sample_url = sample_url;
            collection.add(record)?;
            collection.save()?;
            println!("saved {} to {}", id, collection.path().display());
        }

        Commands::Remove { id } => {
            let mut collection = PatternCollection::load(&config.collection_path())?;
            if collection.remove(&id) {
                collection.save()?;
                println!("removed {}", id);
            } else {
                println!("no pattern {}", id);
            }
        }
    }

    Ok(())
}

/// Pick the runtime, then run the front end
async fn start(config: &Config, dry_run: bool, frontend: Frontend) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        run_frontend(PrintRuntime::new(), config, frontend).await
    } else {
        let runtime = OscRuntime::connect(
            &config.osc.host,
            config.osc.port,
            config.osc.reply_timeout(),
        )
        .await?;
        run_frontend(runtime, config, frontend).await
    }
}

async fn run_frontend<R: EvalRuntime>(
    runtime: R,
    config: &Config,
    frontend: Frontend,
) -> Result<(), Box<dyn std::error::Error>> {
    let collection = PatternCollection::load(&config.collection_path())?;
    let generator = match config.generator.command {
        Some(_) => Some(PatternGenerator::from_config(&config.generator)?),
        None => None,
    };
    let engine = SessionEngine::new(runtime, config.default_cps);
    let handler = CommandHandler::new(engine, collection, generator, config.grid_size());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    match frontend {
        Frontend::Repl => {
            println!("🎵 Loopdeck");
            println!("==========");
            println!("{}\n", HELP);
            Repl::new(&handler).run(stdin, &mut stdout).await?;
        }
        Frontend::Serve { port } => {
            let (server, commands) = OscControlServer::bind(port).await?;
            println!("🎛️  Loopdeck: OSC control on port {}", server.local_port()?);
            println!("Type 'help' for commands\n");
            tokio::spawn(server.run());
            Repl::new(&handler)
                .with_control(commands)
                .run(stdin, &mut stdout)
                .await?;
        }
        Frontend::Watch { track, file } => {
            println!("🎵 Loopdeck: {} -> track {}", file.display(), track);
            println!("Press Ctrl+C to stop\n");
            TrackFileWatcher::new(&track, &file).run(&handler).await?;
        }
    }

    Ok(())
}
