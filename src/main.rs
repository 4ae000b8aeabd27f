use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context};
use chanbus::{banner, init_logging, spawn_script, Broker, Lifecycle, Settings};
use clap::Parser;
use tracing::{info, warn};

/// Typed channel broker with an embedded Lua runtime.
#[derive(Debug, Parser)]
#[command(name = "chanbus", version, about)]
struct Cli {
    /// Path to a TOML settings file
    #[arg(short, long, env = "CHANBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Lua script to run, in addition to those listed in settings (repeatable)
    #[arg(short = 's', long = "script")]
    scripts: Vec<PathBuf>,

    /// Base log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Capacity of channels that never declare one (0 = unbounded)
    #[arg(long)]
    default_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    settings.scripts.extend(cli.scripts);
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    if let Some(capacity) = cli.default_capacity {
        settings.default_capacity = capacity;
    }

    let logging = init_logging(settings.logging.clone()).map_err(|e| anyhow!(e))?;
    banner::print_banner(&settings);

    let broker = Broker::init_global(settings.broker_config());
    let lifecycle = Lifecycle::new(broker);

    for path in &settings.scripts {
        spawn_script(&lifecycle, path.clone(), settings.pop_poll())
            .with_context(|| format!("starting script {}", path.display()))?;
    }

    if settings.scripts.is_empty() {
        warn!("no scripts configured, waiting for Ctrl-C");
        tokio::signal::ctrl_c().await?;
        info!("interrupt received");
    } else {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupt received");
            }
            _ = wait_idle(&lifecycle) => info!("all scripts finished"),
        }
    }

    let report = tokio::task::block_in_place(|| lifecycle.shutdown(settings.shutdown_timeout()));
    if !report.is_clean() {
        warn!(
            panicked = ?report.panicked,
            detached = ?report.detached,
            "some workers did not stop cleanly"
        );
    }

    logging.shutdown();
    Ok(())
}

async fn wait_idle(lifecycle: &Lifecycle) {
    while lifecycle.active() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
