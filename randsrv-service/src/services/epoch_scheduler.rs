//! Epoch Scheduler
//!
//! This module provides [`epoch_scheduler_task`], a task that can be spawned to rotate the [`KeyStore`] once per epoch
//! and to puncture every epoch that left its retention window.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use eyre::Context as _;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use randsrv_types::EpochId;

use crate::services::key_store::{KeyStore, KeyStoreError};

/// The arguments to start the epoch scheduler.
pub(crate) struct EpochSchedulerTaskArgs {
    pub(crate) key_store: KeyStore,
    pub(crate) epoch_duration: Duration,
    pub(crate) started: Arc<AtomicBool>,
    pub(crate) cancellation_token: CancellationToken,
}

/// Background task that rotates the keys every `epoch_duration`.
///
/// The first rotation happens one epoch after the start. Ticks missed because the runtime was busy are delayed, not
/// bunched up.
pub(crate) async fn epoch_scheduler_task(args: EpochSchedulerTaskArgs) -> eyre::Result<()> {
    let EpochSchedulerTaskArgs {
        key_store,
        epoch_duration,
        started,
        cancellation_token,
    } = args;
    // shutdown service if the scheduler encounters an error and drops this guard
    let _drop_guard = cancellation_token.drop_guard_ref();

    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + epoch_duration,
        epoch_duration,
    );
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    started.store(true, Ordering::Relaxed);
    tracing::info!(
        "epoch scheduler started with epoch duration {}",
        humantime::format_duration(epoch_duration)
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = tick(&key_store) {
                    tracing::error!("epoch scheduler encountered an error: {err:?}");
                    return Err(err);
                }
            }
            _ = cancellation_token.cancelled() => {
                break;
            }
        }
    }
    tracing::info!("stopped epoch scheduler");
    Ok(())
}

/// Rotates once and punctures everything that expired.
#[instrument(level = "debug", skip_all)]
fn tick(key_store: &KeyStore) -> eyre::Result<()> {
    let rotation = key_store.rotate().context("while rotating")?;
    let mut expired = rotation.expired;
    expired.extend(key_store.expired_epochs(SystemTime::now()));
    expired.sort_unstable();
    expired.dedup();
    puncture_expired(key_store, expired)
}

/// Punctures `expired`. An epoch that is already forgotten was punctured and evicted in the meantime.
fn puncture_expired(key_store: &KeyStore, expired: Vec<EpochId>) -> eyre::Result<()> {
    for epoch in expired {
        match key_store.puncture(epoch, None) {
            Ok(()) => {}
            Err(KeyStoreError::UnknownEpoch(_)) => {
                tracing::debug!("expired epoch {epoch} is already forgotten");
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("while puncturing expired epoch {epoch}"));
            }
        }
    }
    Ok(())
}
