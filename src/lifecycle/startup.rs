//! Startup orchestration.
//!
//! # Responsibilities
//! - Register the watched token and properties files
//! - Resolve settings and the backend target
//! - Start the metrics endpoint and the frontend listeners
//! - Drive shutdown when a signal arrives or a listener dies
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::Path;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::backend::{BackendError, BackendTarget};
use crate::config::{Cli, ConfigError, ConfigStore, GatewaySettings, ParseMode, SettingsError};
use crate::http::{HttpServer, ImpersonatingProxy, UnauthenticatedPolicy};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{listener, tls, ListenerError, TlsError};
use crate::observability::{logging, metrics, LogHandle, LoggingError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("couldn't add config file: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("error determining backend: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to start metrics endpoint: {0}")]
    Metrics(#[from] BuildError),

    #[error("frontend server exited: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the gateway until a termination signal arrives.
pub async fn launch(cli: Cli) -> Result<(), StartupError> {
    let log = logging::init(cli.log_level.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Launching impersonation gateway");

    let shutdown = Shutdown::new();
    let result = run(&cli, Some(&log), &shutdown).await;
    shutdown.trigger();
    result
}

async fn run(cli: &Cli, log: Option<&LogHandle>, shutdown: &Shutdown) -> Result<(), StartupError> {
    let store = ConfigStore::new(shutdown.subscribe());
    register(&store, &cli.token_path, ParseMode::SingleValue)?;
    register(&store, &cli.config_path, ParseMode::Properties)?;

    let settings = GatewaySettings::resolve(cli, &store)?;
    if let (None, Some(log)) = (&cli.log_level, log) {
        if let Some(level) = &settings.log_level {
            if let Err(e) = log.set_level(level) {
                tracing::warn!(error = %e, "Ignoring configured log level");
            }
        }
    }

    if let Some(addr) = &settings.metrics_addr {
        metrics::init_metrics(listener::parse_addr(addr)?)?;
    }

    let backend = BackendTarget::resolve(&settings.backend, &store)?;
    let policy = if settings.reject_unauthenticated {
        UnauthenticatedPolicy::Reject
    } else {
        UnauthenticatedPolicy::Forward
    };
    let proxy = ImpersonatingProxy::new(store, backend)?.with_policy(policy);
    let server = HttpServer::new(proxy);

    let mut servers = JoinSet::new();
    if let Some(https) = &settings.frontend.https {
        let addr = listener::parse_addr(&https.addr)?;
        let config = tls::load_tls_config(&https.cert_path, &https.key_path).await?;
        servers.spawn(server.clone().run_tls(addr, config, shutdown.subscribe()));
    }
    let plain = listener::bind(&settings.frontend.http_addr).await?;
    servers.spawn(server.run(plain, shutdown.subscribe()));

    let mut failure = None;
    tokio::select! {
        () = signals::shutdown_on_signal(shutdown) => {}
        Some(joined) = servers.join_next() => {
            tracing::error!("Frontend server exited, shutting down");
            failure = flatten(joined).err();
            shutdown.trigger();
        }
    }

    while let Some(joined) = servers.join_next().await {
        if let Err(e) = flatten(joined) {
            tracing::error!(error = %e, "Frontend server failed during shutdown");
            failure.get_or_insert(e);
        }
    }

    tracing::info!("Shutdown complete");
    failure.map_or(Ok(()), |e| Err(StartupError::Serve(e)))
}

fn register(store: &ConfigStore, path: &Path, mode: ParseMode) -> Result<(), ConfigError> {
    store.register_file(path, mode).inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Couldn't add config file");
    })
}

fn flatten(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    joined.map_err(std::io::Error::other)?
}
