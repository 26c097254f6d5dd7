//! tackle CLI

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tackle_cli::cmd::{self, Context};
use tackle_cli::{Cli, Commands, shim_name};
use tackle_core::Settings;
use tackle_core::exec::EXIT_FAILURE;

#[tokio::main]
async fn main() {
    let filter = std::env::var("TACKLE_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    std::process::exit(run(args).await);
}

async fn run(args: Vec<String>) -> i32 {
    // Invoked through a shim: behave as `tackle exec <name> ...`.
    let shim = args.first().and_then(|argv0| shim_name(argv0)).map(str::to_string);
    let command = match shim {
        Some(exe_name) => Commands::Exec {
            exe_name,
            args: args.into_iter().skip(1).collect(),
        },
        None => Cli::parse_from(args).command,
    };

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("tackle: {e}");
            return EXIT_FAILURE;
        }
    };
    let ctx = Context::new(settings);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match command {
        Commands::Exec { exe_name, args } => cmd::exec::exec(&ctx, &exe_name, &args, &cancel).await,
        Commands::Which { exe_name } => cmd::which::which(&ctx, &exe_name).await,
        Commands::Install { only_link } => {
            match cmd::install::install(&ctx, only_link, &cancel).await {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("tackle: {e:#}");
                    EXIT_FAILURE
                }
            }
        }
    }
}
