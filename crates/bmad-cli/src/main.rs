mod cmd;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bmad_core::config::{Config, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand};
use cmd::{pr::PrSubcommand, us::UsSubcommand, Session};
use tokio_util::sync::CancellationToken;

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "bmad-cli",
    about = "AI-assisted pull-request triage and user-story authoring",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "BMAD_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull-request review commands
    Pr {
        #[command(subcommand)]
        subcommand: PrSubcommand,
    },

    /// User-story commands
    Us {
        #[command(subcommand)]
        subcommand: UsSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    if let Err(e) = run(cli, cancel.clone()) {
        eprintln!("error: {}", render_error(&e));
        let code = if cancel.is_cancelled() || is_cancelled(&e) {
            EXIT_INTERRUPTED
        } else {
            EXIT_FAILURE
        };
        std::process::exit(code);
    }
}

fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let root = std::env::current_dir().context("resolve working directory")?;
    let config = Config::load(&root.join(&cli.config)).context("load configuration")?;
    let session = Session::open(&root, config, cancel.clone())?;
    logging::init(session.run_dir.path())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        run_dir = %session.run_dir.path().display(),
        "bmad-cli starting"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    rt.spawn(cancel_on_signal(cancel));
    let result = rt.block_on(async {
        match cli.command {
            Commands::Pr { subcommand } => cmd::pr::run(&session, subcommand).await,
            Commands::Us { subcommand } => cmd::us::run(&session, subcommand).await,
        }
    });
    // A pending stdin read would otherwise keep the runtime alive.
    rt.shutdown_timeout(Duration::from_millis(200));

    if let Err(e) = &result {
        tracing::error!(error = %render_error(e), "command failed");
    }
    result
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::hangup()) {
            Ok(mut hangup) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = hangup.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGHUP");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    tracing::warn!("interrupt received, cancelling");
    cancel.cancel();
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<bmad_core::Error>())
        .any(bmad_core::Error::is_cancelled)
}

/// Outer contexts followed by the core error report (`[kind] …`).
fn render_error(err: &anyhow::Error) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<bmad_core::Error>() {
            parts.push(bmad_core::error::report(core));
            break;
        }
        parts.push(cause.to_string());
    }
    parts.join(": ")
}
