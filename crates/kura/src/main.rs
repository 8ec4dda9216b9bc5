mod cli; // Declare the cli module

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::debug;

use kura_core::lifecycle::LifecycleComponent;
use kura_core::storage::{
    BackendKind, ManagerPolicy, SplitterKind, StorageManager,
};

use crate::cli::RoamingArg;

/// Kura: portable configuration storage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Base directory for configuration storage
    #[arg(long, default_value = ".")]
    base: PathBuf,

    /// Relax interactive-only construction checks
    #[arg(long)]
    headless: bool,

    /// Simple ping command for smoke checks
    #[arg(long)]
    ping: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand path macros in a file spec
    Expand {
        /// The file spec to expand, e.g. "$APP_CONFIG$/editor.json"
        spec: String,
    },
    /// Collapse a physical path back into its portable spec form
    Collapse {
        /// The physical path to collapse
        path: String,
    },
    /// Show how a file spec resolves to a storage backend
    Inspect {
        /// The file spec to resolve
        spec: String,
        /// Requested roaming classification
        #[arg(long, value_enum, default_value = "per-user")]
        roaming: RoamingArg,
    },
    /// List the registered macro tokens and their expansions
    Macros,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // Handle simple ping command
    if args.ping {
        println!("pong");
        return;
    }

    let policy = ManagerPolicy {
        headless: args.headless,
        ..ManagerPolicy::default()
    };
    let manager = StorageManager::with_policy(args.base.clone(), policy);
    if let Err(e) = manager.initialize().await {
        eprintln!("Failed to initialize storage manager: {}", e);
        std::process::exit(1);
    }
    debug!("Storage manager initialized at {}", args.base.display());

    let Some(command) = args.command else {
        println!("Storage manager ready at {}", args.base.display());
        println!("Run with --help to see available commands.");
        return;
    };

    if let Err(e) = run_command(&manager, command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(manager: &StorageManager, command: Commands) -> kura_core::Result<()> {
    match command {
        Commands::Expand { spec } => {
            let path = manager.expand_file_spec(&spec)?;
            println!("{}", path.display());
        }
        Commands::Collapse { path } => {
            println!("{}", manager.collapse_path(Path::new(&path)));
        }
        Commands::Inspect { spec, roaming } => {
            let backend = manager.storage(
                &spec,
                roaming.into(),
                BackendKind::Default,
                SplitterKind::None,
            )?;
            let path = manager.expand_file_spec(&spec)?;
            println!("spec:    {}", spec);
            println!("path:    {}", path.display());
            println!("roaming: {}", backend.roaming());
        }
        Commands::Macros => {
            for token in manager.macros().tokens() {
                let expansion = manager.macros().expansion_of(&token).unwrap_or_default();
                println!("{} -> {}", token, expansion);
            }
        }
    }
    Ok(())
}
