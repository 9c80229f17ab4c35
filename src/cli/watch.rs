//! Keep the launcher running and update on the configured schedule.

use super::CliConfig;
use super::common::{ConsentPolicy, Session};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::signal;
use tracing::warn;

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Install client and launcher updates without asking
    #[arg(short, long)]
    pub yes: bool,
}

impl WatchCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let mut config = cli.load_launcher_config().await?;
        config.auto_update = true;
        if self.yes {
            config.unattended_install = true;
            config.unattended_self_install = true;
        }

        match config.check_interval() {
            Some(interval) => println!(
                "{} Watching {} (checking every {}s, Ctrl+C to stop)",
                "→".cyan(),
                config.server_name.bold(),
                interval.as_secs()
            ),
            None => println!(
                "{} Watching {} (check_interval_secs is 0: startup check only)",
                "→".cyan(),
                config.server_name.bold()
            ),
        }

        let mut session = Session::start(config, ConsentPolicy::Prompt, cli.no_progress).await?;
        loop {
            tokio::select! {
                event = session.next_event() => {
                    if event.is_none() {
                        break;
                    }
                }
                () = shutdown_signal() => {
                    println!("{} Stopping...", "→".cyan());
                    break;
                }
            }
        }

        session.shutdown().await
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            () = ctrl_c() => {},
            () = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!("Failed to install SIGTERM handler: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
