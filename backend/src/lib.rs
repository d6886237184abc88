//! Contact form backend.
//!
//! Accepts contact submissions over HTTP, keeps them in one encrypted file
//! with a retention window, mails a notification and exposes a small
//! password-protected admin API for listing, inspecting and deleting
//! submissions (including erasure and export by e-mail address).

pub mod config;
pub mod crypto;
pub mod http;
pub mod notify;
pub mod retention;
pub mod session;
pub mod store;

use std::sync::Arc;

use thiserror::Error;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use config::{Config, ConfigError};
use crypto::{envelope::EnvelopeError, integrity::IntegrityError};
use http::AppState;
use notify::{Notifier, NotifyError, SmtpNotifier};
use store::StoreError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("encryption setup failed: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("key derivation failed: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),
    #[error("mail setup failed: {0}")]
    Notify(#[from] NotifyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the notifier the configuration asks for, if any.
pub fn notifier_from_config(config: &Config) -> Result<Option<Arc<dyn Notifier>>, StartupError> {
    match &config.smtp {
        Some(smtp) => {
            let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(smtp)?);
            Ok(Some(notifier))
        }
        None => Ok(None),
    }
}

/// Starts the retention task and serves HTTP until Ctrl+C or SIGTERM.
pub async fn start_server(config: Config) -> Result<(), StartupError> {
    info!("Initializing state...");
    let notifier = notifier_from_config(&config)?;
    let state = AppState::new(&config, notifier)?;
    info!(
        data_dir = %config.data_dir.display(),
        retention_days = config.retention_days,
        "Submission store ready"
    );
    if config.allowed_origins.is_empty() {
        warn!("ALLOWED_ORIGINS is empty, browsers on other origins will be refused");
    }

    let cleanup = retention::spawn_cleanup_task(state.clone(), retention::CLEANUP_PERIOD);

    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    http::serve(listener, state, shutdown_signal()).await?;

    cleanup.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
