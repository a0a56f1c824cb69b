pub mod api;
pub mod classifier;
pub mod config;
pub mod diagnosis;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::classifier::{InferenceBackend, ModelError};
use crate::config::ServiceConfig;
use crate::pipeline::Predictor;

/// Reasons the service refuses to start.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("Static directory not found: {0}")]
    StaticDir(std::path::PathBuf),
}

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Load the classifier, then serve until Ctrl-C.
///
/// The checkpoint is loaded before the listener binds: a missing or
/// mismatched checkpoint means the port is never opened.
pub async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    if !config.static_dir.is_dir() {
        return Err(StartupError::StaticDir(config.static_dir.clone()));
    }
    if !config.index_path().is_file() {
        tracing::warn!(path = %config.index_path().display(), "Frontend page missing; GET / will return 404");
    }

    let model_path = config.model.clone();
    let predictor = tokio::task::spawn_blocking(move || {
        Predictor::<InferenceBackend, _>::load(&model_path, Default::default())
    })
    .await
    .map_err(|e| ModelError::FatalLoad(format!("loader task failed: {e}")))??;

    let ctx = api::ApiContext::new(Arc::new(predictor), config.static_dir.clone());
    let addr = config.bind_addr();
    let mut server = api::start_server(ctx, addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    tracing::info!(url = %format!("http://{}", server.addr()), "Ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(model: PathBuf, static_dir: PathBuf) -> ServiceConfig {
        ServiceConfig {
            model,
            static_dir,
            host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 0,
        }
    }

    #[tokio::test]
    async fn missing_checkpoint_prevents_startup() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(config(dir.path().join("ROP_model.pth"), dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Model(ModelError::FatalLoad(_))));
    }

    #[tokio::test]
    async fn missing_static_dir_prevents_startup() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(config(dir.path().join("ROP_model.pth"), dir.path().join("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::StaticDir(_)));
    }
}
