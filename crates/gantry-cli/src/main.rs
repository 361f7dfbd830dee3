mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_INVENTORY_ERROR};
use gantry_core::{
    install_signal_handler, Backoff, Engine, EngineConfig, HookRegistry, RetryPolicy,
    RollbackPolicy,
};
use gantry_runtime::select_backend;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "gantry",
    version,
    about = "Reconciliation engine for GPU container fleets"
)]
struct Cli {
    /// Container backend to drive (lxc or mock).
    #[arg(long, default_value = "lxc", global = true)]
    backend: String,

    /// Directory holding per-container config files.
    #[arg(long, default_value = "/etc/pve/lxc", global = true)]
    conf_dir: PathBuf,

    /// Directory of role hook scripts (<role>.setup / <role>.verify).
    #[arg(long, global = true)]
    hooks_dir: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile every container in the inventory to its validated state.
    Reconcile {
        /// Path to the inventory TOML file.
        #[arg(default_value = "gantry.toml")]
        inventory: PathBuf,
        /// Destroy containers that fail terminally.
        #[arg(long, default_value_t = false)]
        rollback_on_failure: bool,
        /// Skip the standard tier if a core-tier container fails.
        #[arg(long, default_value_t = false)]
        halt_on_core_failure: bool,
        /// Retry budget per lifecycle operation.
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
        /// Base delay between retries, grown linearly per attempt.
        #[arg(long, default_value_t = 5)]
        retry_delay_secs: u64,
    },
    /// Show the planned order and passthrough diffs without side effects.
    Plan {
        /// Path to the inventory TOML file.
        #[arg(default_value = "gantry.toml")]
        inventory: PathBuf,
    },
    /// Parse and validate an inventory file.
    Validate {
        /// Path to the inventory TOML file.
        #[arg(default_value = "gantry.toml")]
        inventory: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GANTRY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Reconcile {
            inventory,
            rollback_on_failure,
            halt_on_core_failure,
            max_attempts,
            retry_delay_secs,
        } => make_engine(
            &cli.backend,
            &cli.conf_dir,
            cli.hooks_dir.as_deref(),
            EngineOptions {
                rollback_on_failure,
                halt_on_core_failure,
                max_attempts,
                retry_delay_secs,
            },
        )
        .and_then(|engine| {
            let cancel = engine.cancel_flag();
            install_signal_handler(&cancel);
            commands::reconcile::run(&engine, &inventory, json_output)
        }),
        Commands::Plan { inventory } => make_engine(
            &cli.backend,
            &cli.conf_dir,
            cli.hooks_dir.as_deref(),
            EngineOptions::default(),
        )
        .and_then(|engine| commands::plan::run(&engine, &inventory, json_output)),
        Commands::Validate { inventory } => commands::validate::run(&inventory, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("inventory error:")
                || msg.starts_with("failed to parse inventory")
                || msg.starts_with("failed to read inventory")
            {
                EXIT_INVENTORY_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

#[derive(Debug, Default)]
struct EngineOptions {
    rollback_on_failure: bool,
    halt_on_core_failure: bool,
    max_attempts: u32,
    retry_delay_secs: u64,
}

fn make_engine(
    backend_name: &str,
    conf_dir: &std::path::Path,
    hooks_dir: Option<&std::path::Path>,
    options: EngineOptions,
) -> Result<Engine, String> {
    let backend = select_backend(backend_name).map_err(|e| e.to_string())?;
    let hooks = match hooks_dir {
        Some(dir) => HookRegistry::from_dir(dir),
        None => HookRegistry::new(),
    };
    Ok(Engine::new(
        backend,
        hooks,
        EngineConfig {
            conf_dir: conf_dir.to_path_buf(),
            retry: RetryPolicy {
                max_attempts: options.max_attempts.max(1),
                delay: Duration::from_secs(options.retry_delay_secs),
                backoff: Backoff::Linear,
            },
            rollback: RollbackPolicy {
                rollback_on_failure: options.rollback_on_failure,
            },
            halt_on_core_failure: options.halt_on_core_failure,
        },
    ))
}
