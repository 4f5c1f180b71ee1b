//! Server entrypoint for the vigil chat AI relay
//!
//! This is the composition root: it wires the configured backend adapters,
//! the action store, the push registry and the relay worker together using
//! dependency injection, then keeps the subsystem running until Ctrl-C.
//!
//! The REST/WebSocket tier attaches to the same service, store, push
//! registry and cipher handles built here.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_application::{ActionStore, ChatAiService, ChatBackend, SecretCipher, relay_channel};
use vigil_infrastructure::{
    ApiKeyCipher, ConfigLoader, CopyPasteBackend, FileConfig, InMemoryActionStore,
    LocalModelBackend, RemoteSseBackend, RemoteSseConfig, SessionPushRegistry,
};

#[derive(Parser)]
#[command(name = "vigil-server", version, about = "Exam proctoring chat AI relay server")]
struct Cli {
    /// Path to a configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore configuration files and use built-in defaults
    #[arg(long)]
    no_config: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref()).map_err(|e| anyhow::anyhow!(e))?
    };

    let _log_guard = init_logging(&config, cli.verbose);
    info!("Starting vigil chat AI server");

    // === Dependency Injection ===
    let cipher = ApiKeyCipher::from_encoded_key(
        config.secrets.api_key_enc_key.as_deref(),
        config.secrets.api_key_id.clone().unwrap_or_else(|| "v1".to_string()),
    );
    if config.secrets.api_key_enc_key.is_some() {
        // Fail fast on an unusable key configuration.
        let sealed = cipher
            .encrypt("self-test")
            .map_err(|e| anyhow::anyhow!("api key cipher self-test failed: {e}"))?;
        cipher
            .decrypt(&sealed)
            .map_err(|e| anyhow::anyhow!("api key cipher self-test failed: {e}"))?;
        info!("api key encryption enabled");
    }

    let store = Arc::new(InMemoryActionStore::new());
    let push = Arc::new(SessionPushRegistry::new());
    let (relay_tx, relay_rx) = relay_channel();

    let mut backends: Vec<Arc<dyn ChatBackend>> = Vec::new();
    if config.local_model.enabled {
        backends.push(Arc::new(LocalModelBackend::new(
            relay_tx.clone(),
            config.local_model.url.clone(),
        )));
    }
    if config.openai.enabled {
        backends.push(Arc::new(RemoteSseBackend::new(
            relay_tx.clone(),
            Arc::clone(&store) as Arc<dyn ActionStore>,
            RemoteSseConfig {
                base_url: config.openai.base_url.clone(),
                pool_size: config.openai.pool_size,
            },
        )));
    }
    // The copy/paste backend is always available.
    backends.push(Arc::new(CopyPasteBackend::new(relay_tx.clone())));
    drop(relay_tx);

    let service = ChatAiService::new(
        backends,
        Arc::clone(&store) as Arc<dyn ActionStore>,
        push,
        relay_rx,
    );

    let shutdown = CancellationToken::new();
    let worker = service.start(shutdown.clone()).await?;

    info!("chat relay running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    shutdown.cancel();
    worker.await?;
    Ok(())
}

/// Initialize tracing from the `-v` flags and the `[log]` section.
///
/// Returns the appender guard keeping the file writer alive.
fn init_logging(
    config: &FileConfig,
    verbosity: u8,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match (config.log.level.as_deref(), verbosity) {
        (Some(level), _) => EnvFilter::new(level),
        (None, 0) => EnvFilter::new("warn"),
        (None, 1) => EnvFilter::new("info"),
        (None, 2) => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    match &config.log.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .map(std::ffi::OsStr::to_os_string)
                .unwrap_or_else(|| "vigil.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}
