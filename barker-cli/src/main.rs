mod cli;
mod demo;
mod log;

use barker::CancellationToken;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::demo::DemoOptions;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let options = &cli.global_options;

    let color = log::init_tracing(&options.log_options())?;
    #[cfg(unix)]
    spawn_color_toggle(color).into_diagnostic()?;
    #[cfg(not(unix))]
    drop(color);

    let config = options.resolve_config()?;

    match cli.command {
        Commands::Config => {
            let yaml = serde_yaml::to_string(&config).into_diagnostic()?;
            print!("{}", yaml);
        }
        Commands::Demo {
            jobs,
            duration,
            fail_job,
        } => {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling demo jobs");
                    on_signal.cancel();
                }
            });

            let demo = DemoOptions {
                jobs,
                duration,
                fail_job,
            };
            let summary = demo::run(&config, &demo, shutdown).await?;
            info!(
                completed = summary.completed,
                failed = summary.failed,
                cancelled = summary.cancelled,
                "Demo finished"
            );
            if summary.failed > 0 {
                miette::bail!("{} of {} demo jobs failed", summary.failed, jobs);
            }
        }
    }

    Ok(())
}

/// Flip colored log output on every SIGUSR1
#[cfg(unix)]
fn spawn_color_toggle(color: log::ColorSwitch) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signals = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            let enabled = color.toggle();
            info!("Colored log output {}", if enabled { "enabled" } else { "disabled" });
        }
    });
    Ok(())
}
