#![deny(missing_docs)]
//! This crate provides a randomness service that evaluates a partially-oblivious PRF under epoch keys.
//!
//! Clients blind their input, send the blinded point together with a public tag, and unblind the answer. The service
//! never learns the input, and every answer carries a proof that it was computed with the key committed to by the
//! epoch's published public key. Keys rotate once per epoch, stay evaluable for a configured number of epochs after
//! that and are then punctured: the secret material is destroyed and the epoch can never be evaluated again.
//!
//! The main entry point is [`RandomnessService`]. [`RandomnessService::init`] creates the key store and spawns the
//! epoch scheduler, [`RandomnessService::build`] returns an `axum::Router` with all endpoints and the `JoinHandle`
//! of the scheduler.
//!
//! If the scheduler encounters an error, the provided `CancellationToken` will be cancelled, allowing the hosting
//! application to handle the shutdown process gracefully. Additionally, the `CancellationToken` can be cancelled
//! externally to stop the scheduler. To ensure a graceful shutdown, the hosting application should await the
//! `JoinHandle` after cancelling the token.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::Router;
use git_version::git_version;
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{
    config::RandsrvConfig,
    services::{
        epoch_scheduler::EpochSchedulerTaskArgs,
        key_store::{KeyStore, KeyStoreArgs},
        request_gate::RequestGate,
    },
};

pub(crate) mod api;
pub mod config;
pub mod metrics;
pub mod services;

/// Keeps track of background services and whether they started.
#[derive(Debug, Clone, Default)]
pub struct StartedServices(Arc<Mutex<Vec<Arc<AtomicBool>>>>);

impl StartedServices {
    /// Creates an empty set of services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new service. The service sets the returned flag once it started.
    pub fn new_service(&self) -> Arc<AtomicBool> {
        let started = Arc::new(AtomicBool::new(false));
        self.0.lock().push(Arc::clone(&started));
        started
    }

    /// Returns `true` iff all registered services started.
    pub fn all_started(&self) -> bool {
        self.0.lock().iter().all(|s| s.load(Ordering::Relaxed))
    }
}

/// Cargo package name, version and the git hash the binary was built from.
pub fn version_info() -> String {
    format!(
        "{} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_HASH").unwrap_or(git_version!(fallback = "UNKNOWN"))
    )
}

/// The randomness service. See the crate documentation.
pub struct RandomnessService {
    config: RandsrvConfig,
    key_store: KeyStore,
    request_gate: RequestGate,
    started_services: StartedServices,
    epoch_scheduler: tokio::task::JoinHandle<eyre::Result<()>>,
}

impl RandomnessService {
    /// Initializes the service.
    ///
    /// Mints the first epoch, sets up the request gate and spawns the epoch scheduler. Must be called from within a
    /// tokio runtime.
    pub fn init(
        config: RandsrvConfig,
        started_services: StartedServices,
        cancellation_token: CancellationToken,
    ) -> Self {
        tracing::info!("init key store..");
        let key_store = KeyStore::new(KeyStoreArgs::from(&config));
        let request_gate = RequestGate::new(
            key_store.clone(),
            config.max_points.get(),
            config.max_concurrent_evaluations.get(),
        );

        tracing::info!("spawning epoch scheduler..");
        let epoch_scheduler = tokio::spawn(services::epoch_scheduler::epoch_scheduler_task(
            EpochSchedulerTaskArgs {
                key_store: key_store.clone(),
                epoch_duration: config.epoch_duration,
                started: started_services.new_service(),
                cancellation_token,
            },
        ));

        Self {
            config,
            key_store,
            request_gate,
            started_services,
            epoch_scheduler,
        }
    }

    /// The key store of the service, e.g. for administrative puncturing.
    pub fn key_store(&self) -> KeyStore {
        self.key_store.clone()
    }

    /// Build the `axum` [`Router`].
    ///
    /// # Returns
    ///
    /// Returns a tuple containing:
    /// - An Axum `Router` instance with all endpoints.
    /// - A `JoinHandle` for the epoch scheduler task.
    pub fn build(self) -> (axum::Router, tokio::task::JoinHandle<eyre::Result<()>>) {
        let mut router = Router::new()
            .merge(api::health::routes(self.started_services))
            .merge(api::info::routes(
                self.key_store.clone(),
                self.config.max_points.get(),
            ))
            .merge(api::randomness::routes(self.request_gate));
        if let Some(admin_token) = self.config.admin_token {
            tracing::info!("admin endpoints enabled");
            router = router.merge(api::admin::routes(self.key_store, admin_token));
        }
        (
            router.layer(TraceLayer::new_for_http()),
            self.epoch_scheduler,
        )
    }
}

/// Spawns a task that cancels the returned token when `shutdown_signal` resolves.
///
/// The returned flag is set iff the shutdown was triggered by the signal and not by an internal error.
pub fn spawn_shutdown_task(
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> (CancellationToken, Arc<AtomicBool>) {
    let cancellation_token = CancellationToken::new();
    let is_graceful = Arc::new(AtomicBool::new(false));
    let task_token = cancellation_token.clone();
    let task_is_graceful = Arc::clone(&is_graceful);
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal => {
                tracing::info!("Received EXTERNAL shutdown");
                task_is_graceful.store(true, Ordering::Relaxed);
                task_token.cancel();
            }
            _ = task_token.cancelled() => {
                tracing::info!("Received INTERNAL shutdown");
            }
        }
    });
    (cancellation_token, is_graceful)
}

/// The default shutdown signal. Triggered when pressing CTRL+C on most systems or on SIGTERM.
pub async fn default_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_services() {
        let services = StartedServices::new();
        assert!(services.all_started());
        let a = services.new_service();
        let b = services.new_service();
        assert!(!services.all_started());
        a.store(true, Ordering::Relaxed);
        assert!(!services.all_started());
        b.store(true, Ordering::Relaxed);
        assert!(services.all_started());
    }

    #[tokio::test]
    async fn shutdown_task_marks_external_shutdown_graceful() {
        let (token, is_graceful) = spawn_shutdown_task(async {});
        token.cancelled().await;
        assert!(is_graceful.load(Ordering::Relaxed));

        let (token, is_graceful) = spawn_shutdown_task(std::future::pending());
        token.cancel();
        tokio::task::yield_now().await;
        assert!(!is_graceful.load(Ordering::Relaxed));
    }
}
