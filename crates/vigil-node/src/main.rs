//! vigil-node — the Vigil monitoring engine binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the monitoring database
//!   2. Load the engine configuration (vigil.json, all fields defaulted)
//!   3. Build the probe executor and the email transport
//!   4. Start the engine: processor shards, notifier, payments, scheduler
//!   5. Run until SIGINT, pruning expired checks once a day
//!   6. Drain in-flight probes and flush before exit

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use vigil_core::EngineConfig;
use vigil_engine::{EmailSender, Engine, NoopEmailSender, SmtpEmailSender};
use vigil_probe::ProbeExecutor;
use vigil_store::MonitorDb;

#[derive(Parser, Debug)]
#[command(
    name = "vigil-node",
    version,
    about = "Vigil — decentralized website monitoring engine"
)]
struct Args {
    /// Directory for the persistent monitoring database.
    #[arg(long, default_value = "~/.vigil/data")]
    data_dir: PathBuf,

    /// Path to the engine configuration JSON. Missing file = defaults.
    #[arg(long, default_value = "vigil.json")]
    config: PathBuf,

    /// Override: disable the email alert path regardless of configuration.
    #[arg(long)]
    no_email: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vigil=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("vigil node starting");

    // ── Configuration ─────────────────────────────────────────────────────
    let mut config = load_config(&args.config)?;
    if args.no_email {
        config.email_enabled = false;
    }

    // ── Database ──────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(MonitorDb::open(&data_dir).context("opening monitoring database")?);

    // ── Probe executor & email transport ──────────────────────────────────
    let runner = Arc::new(ProbeExecutor::new().context("building probe executor")?);
    let email: Arc<dyn EmailSender> = match (&config.email_enabled, &config.smtp) {
        (true, Some(smtp)) => {
            Arc::new(SmtpEmailSender::new(smtp).context("building smtp transport")?)
        }
        (true, None) => {
            warn!("email enabled but no smtp configuration; alerts go to push only");
            Arc::new(NoopEmailSender)
        }
        (false, _) => Arc::new(NoopEmailSender),
    };

    // ── Engine ────────────────────────────────────────────────────────────
    let engine = Engine::start(config, db, runner, email);
    info!("engine ready");

    // ── Main loop: retention + shutdown signal ────────────────────────────
    let mut retention = tokio::time::interval(Duration::from_secs(86_400));
    retention.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "signal listener failed; shutting down");
                }
                break;
            }
            _ = retention.tick() => {
                match engine.prune_expired_checks() {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "pruned expired checks"),
                    Err(e) => warn!(error = %e, "retention pass failed"),
                }
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

/// Load the engine configuration, treating a missing file as all-defaults.
fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file; using defaults");
        return Ok(EngineConfig::default());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&json).context("parsing engine configuration")
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_config(Path::new("/definitely/not/there/vigil.json")).unwrap();
        assert_eq!(config.cooldown_seconds, 300);
    }

    #[test]
    fn tilde_expansion_uses_home() {
        std::env::set_var("HOME", "/home/vigil");
        let expanded = expand_tilde(Path::new("~/data"));
        assert_eq!(expanded, PathBuf::from("/home/vigil/data"));
    }
}
