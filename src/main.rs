//! sleepwalker CLI: explore while idle, dream about what was found.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use sleepwalker::config::SleepwalkerConfig;
use sleepwalker::experience::{ExperienceMode, build_experience};
use sleepwalker::explore::Explorer;
use sleepwalker::llm::LlmGateway;
use sleepwalker::llm::provider::{Credentials, GEMINI_KEY_VAR, OPENAI_KEY_VAR, Route};
use sleepwalker::paths::SleepwalkerPaths;
use sleepwalker::session::{SessionOrchestrator, ShutdownToken};

#[derive(Parser)]
#[command(name = "sleepwalker", version, about = "Explore your files while idle and dream about them")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/sleepwalker/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sleepwalking session.
    Run {
        /// Directories the explorer may enter (repeatable).
        #[arg(long = "dirs", num_args = 1..)]
        dirs: Vec<PathBuf>,

        /// Seconds of inactivity before a cycle starts (0 = always).
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Experience to produce.
        #[arg(long, value_enum)]
        mode: Option<ExperienceMode>,

        /// Where dreams are written.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Run the explorer alone and print discoveries as JSON lines.
    Wander {
        /// Directories the explorer may enter (repeatable).
        #[arg(long = "dirs", num_args = 1..)]
        dirs: Vec<PathBuf>,

        /// Number of wander steps.
        #[arg(long, default_value = "20")]
        steps: usize,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to the config file.
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => SleepwalkerPaths::resolve()?.config_file(),
    };
    let mut config = SleepwalkerConfig::load(&config_path)?;

    match cli.command {
        Commands::Run {
            dirs,
            idle_timeout,
            mode,
            output_dir,
            max_cycles,
            yes,
        } => {
            if !dirs.is_empty() {
                config.allowed_dirs = dirs;
            }
            if let Some(secs) = idle_timeout {
                config.idle_timeout_secs = secs;
            }
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(n) = max_cycles {
                config.session.max_cycles = n;
            }
            config.validate()?;

            let gateway = narrative_gateway(&config);
            let kit = build_experience(config.mode, gateway)?;

            if !yes && !confirm(&config)? {
                println!("Cancelled.");
                return Ok(());
            }

            let shutdown = ShutdownToken::new();
            shutdown.register_signals()?;
            let mut orchestrator = SessionOrchestrator::new(&config, kit, shutdown)?;
            let summary = orchestrator.run();
            println!(
                "Generated {} dream(s) in {} cycle(s); dreams are in {}",
                summary.dreams_written,
                summary.cycles,
                config.output_dir.display()
            );
        }

        Commands::Wander { dirs, steps } => {
            if !dirs.is_empty() {
                config.allowed_dirs = dirs;
            }
            config.validate()?;
            let mut explorer = Explorer::new(&config.allowed_dirs, config.explorer.clone());
            let mut stdout = std::io::stdout().lock();
            for _ in 0..steps {
                if let Some(discovery) = explorer.wander() {
                    let line = serde_json::to_string(&discovery).into_diagnostic()?;
                    writeln!(stdout, "{line}").into_diagnostic()?;
                } else if explorer.is_exhausted() {
                    break;
                }
            }
        }

        Commands::Config { save } => {
            print!("{}", config.to_toml()?);
            if save {
                config.save(&config_path)?;
                eprintln!("Saved to {}", config_path.display());
            }
        }
    }

    Ok(())
}

/// Real narratives need a reachable model; otherwise dreams are written locally.
fn narrative_gateway(config: &SleepwalkerConfig) -> Option<LlmGateway> {
    let credentials = Credentials::from_env();
    let local_model = config
        .llm
        .candidate_models()
        .iter()
        .any(|m| matches!(Route::for_model(m), Route::Ollama(_)));
    if credentials.any() || local_model {
        tracing::info!(models = ?config.llm.candidate_models(), "model access detected, dreams will be generated");
        Some(LlmGateway::from_env(config.llm.clone()))
    } else {
        tracing::info!(
            "no API keys, using placeholder dreams (set {GEMINI_KEY_VAR} or {OPENAI_KEY_VAR} for generated ones)"
        );
        None
    }
}

fn confirm(config: &SleepwalkerConfig) -> Result<bool> {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "sleepwalker will explore:").into_diagnostic()?;
    for dir in &config.allowed_dirs {
        writeln!(stderr, "  {}", dir.display()).into_diagnostic()?;
    }
    writeln!(stderr, "and write {} dreams to {}", config.mode, config.output_dir.display())
        .into_diagnostic()?;
    write!(stderr, "Continue? [y/N] ").into_diagnostic()?;
    stderr.flush().into_diagnostic()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer).into_diagnostic()?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
