//! This module provides [`KeyStore`], the single source of truth for which epochs and tags can be evaluated.
//!
//! The store publishes immutable [`Snapshot`]s. Readers clone the pointer to the current snapshot under a read lock
//! that is held only for the clone. Mutations (rotation and puncture) are serialized by a separate mutex, build a new
//! snapshot off to the side and publish it with a pointer swap, so readers are never blocked by key generation.
//!
//! Secret key components are reference counted. A component dropped from the published snapshot stays alive until
//! the last in-flight evaluation releases it and is zeroized on drop.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::{Mutex, MutexGuard, RwLock};
use randsrv_core::oprf::server::OprfKey;
use randsrv_types::{
    EpochId, Tag,
    api::{EpochPublicKey, EpochPublicKeyInfo, EpochStatus, TagPublicKey},
    crypto::OprfPublicKey,
};
use tracing::instrument;

use crate::{
    config::RandsrvConfig,
    metrics::{METRICS_ID_LIVE_EPOCHS, METRICS_ID_PUNCTURES, METRICS_ID_ROTATIONS},
};

type Result<T> = std::result::Result<T, KeyStoreError>;

/// Errors returned by the [`KeyStore`].
///
/// This error type is mostly used in API contexts, meaning it should be digested by the `crate::api::errors` module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyStoreError {
    /// The epoch was never created or its record was already evicted.
    #[error("unknown epoch: {0}")]
    UnknownEpoch(EpochId),
    /// The epoch is punctured or scheduled for puncturing.
    #[error("epoch {0} is punctured")]
    PuncturedEpoch(EpochId),
    /// The tag was punctured for this epoch.
    #[error("tag {1} of epoch {0} is punctured")]
    PuncturedTag(EpochId, Tag),
    /// The epoch has no component for the tag.
    #[error("epoch {0} does not serve tag {1}")]
    UnknownTag(EpochId, Tag),
    /// The current epoch has the largest possible id, so there is no epoch to rotate to.
    #[error("no epoch id left after {0}")]
    EpochIdsExhausted(EpochId),
}

/// Parameters of the key lifecycle.
#[derive(Debug, Clone)]
pub struct KeyStoreArgs {
    /// Length of one epoch.
    pub epoch_duration: Duration,
    /// Number of epochs a key stays evaluable after it stopped being current.
    pub retention: usize,
    /// Number of punctured epochs that are remembered.
    pub punctured_history: usize,
    /// Id of the first epoch.
    pub first_epoch: EpochId,
    /// Tags that get their own component in every epoch.
    pub tags: Vec<Tag>,
}

impl From<&RandsrvConfig> for KeyStoreArgs {
    fn from(config: &RandsrvConfig) -> Self {
        Self {
            epoch_duration: config.epoch_duration,
            retention: config.retention,
            punctured_history: config.punctured_history,
            first_epoch: config.first_epoch(),
            tags: config.tags.clone(),
        }
    }
}

/// The outcome of [`KeyStore::rotate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// The new current epoch.
    pub current: EpochId,
    /// Epochs that left the retention window with this rotation and must be punctured.
    pub expired: Vec<EpochId>,
}

/// The key record of one epoch.
///
/// Records are never mutated. State changes produce a new record that replaces the old one in the next snapshot.
/// Doesn't implement `Debug` with the secret components to not accidentally leak them.
#[derive(Clone)]
pub struct EpochKey {
    id: EpochId,
    created_at: SystemTime,
    current_until: SystemTime,
    expires_at: SystemTime,
    status: EpochStatus,
    pending_puncture: bool,
    components: BTreeMap<Tag, Arc<OprfKey>>,
    public_key: EpochPublicKey,
    punctured_tags: BTreeSet<Tag>,
}

impl EpochKey {
    /// Mints a current epoch that is replaced at `current_until` and expires `retention` epochs later.
    fn mint(id: EpochId, current_until: SystemTime, args: &KeyStoreArgs) -> Self {
        let mut rng = rand::thread_rng();
        let mut components = BTreeMap::new();
        let master = OprfKey::random(&mut rng);
        let master_public = OprfPublicKey::new(master.public_key());
        components.insert(Tag::untagged(), Arc::new(master));
        let mut tags = Vec::with_capacity(args.tags.len());
        for tag in &args.tags {
            let key = OprfKey::random(&mut rng);
            tags.push(TagPublicKey {
                tag: tag.clone(),
                key: OprfPublicKey::new(key.public_key()),
            });
            components.insert(tag.clone(), Arc::new(key));
        }
        let retention = u32::try_from(args.retention).unwrap_or(u32::MAX);
        Self {
            id,
            created_at: SystemTime::now(),
            current_until,
            expires_at: current_until + args.epoch_duration.saturating_mul(retention),
            status: EpochStatus::Current,
            pending_puncture: false,
            components,
            public_key: EpochPublicKey {
                master: master_public,
                tags,
            },
            punctured_tags: BTreeSet::new(),
        }
    }

    /// The id of the epoch.
    pub fn id(&self) -> EpochId {
        self.id
    }

    /// The lifecycle state.
    pub fn status(&self) -> EpochStatus {
        self.status
    }

    /// Whether the epoch left its retention window and waits for its puncture.
    pub fn is_pending_puncture(&self) -> bool {
        self.pending_puncture
    }

    /// Whether new evaluations may use this epoch.
    pub fn is_evaluable(&self) -> bool {
        self.status != EpochStatus::Punctured && !self.pending_puncture
    }

    /// Creation time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Scheduled end of the current phase.
    pub fn current_until(&self) -> SystemTime {
        self.current_until
    }

    /// Scheduled end of the retention window.
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// The public commitment. Survives puncturing.
    pub fn public_key(&self) -> &EpochPublicKey {
        &self.public_key
    }

    /// Whether the epoch was minted with a component for `tag`.
    pub fn serves(&self, tag: &Tag) -> bool {
        self.public_key.for_tag(tag).is_some()
    }

    /// Returns the secret component for `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the epoch or the tag is punctured, or the epoch doesn't serve the tag.
    pub fn component(&self, tag: &Tag) -> Result<Arc<OprfKey>> {
        if !self.is_evaluable() {
            return Err(KeyStoreError::PuncturedEpoch(self.id));
        }
        if self.punctured_tags.contains(tag) {
            return Err(KeyStoreError::PuncturedTag(self.id, tag.clone()));
        }
        self.components
            .get(tag)
            .cloned()
            .ok_or_else(|| KeyStoreError::UnknownTag(self.id, tag.clone()))
    }

    /// Public information about the epoch.
    pub fn info(&self) -> EpochPublicKeyInfo {
        EpochPublicKeyInfo {
            epoch: self.id,
            public_key: self.public_key.clone(),
            created_at: humantime::format_rfc3339_seconds(self.created_at).to_string(),
            expires_at: humantime::format_rfc3339_seconds(self.expires_at).to_string(),
            status: self.status,
            punctured_tags: self.punctured_tags.iter().cloned().collect(),
        }
    }

    fn demoted(&self) -> Self {
        Self {
            status: EpochStatus::Retained,
            ..self.clone()
        }
    }

    fn marked_for_puncture(&self) -> Self {
        Self {
            pending_puncture: true,
            ..self.clone()
        }
    }

    fn punctured(&self) -> Self {
        Self {
            status: EpochStatus::Punctured,
            pending_puncture: false,
            components: BTreeMap::new(),
            ..self.clone()
        }
    }

    fn without_tag(&self, tag: &Tag) -> Self {
        let mut record = self.clone();
        record.components.remove(tag);
        record.punctured_tags.insert(tag.clone());
        record
    }
}

impl fmt::Debug for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochKey")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("pending_puncture", &self.pending_puncture)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("punctured_tags", &self.punctured_tags)
            .finish()
    }
}

/// An immutable, versioned view of all epoch records, ordered by epoch id.
///
/// The newest record is always the current epoch.
#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    epochs: Vec<Arc<EpochKey>>,
}

impl Snapshot {
    /// Incremented with every published mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The current epoch.
    pub fn current(&self) -> &Arc<EpochKey> {
        self.epochs
            .last()
            .expect("snapshot holds at least the current epoch")
    }

    /// All records, oldest first.
    pub fn epochs(&self) -> impl Iterator<Item = &Arc<EpochKey>> {
        self.epochs.iter()
    }

    /// The record of `epoch`, if it is still remembered.
    pub fn get(&self, epoch: EpochId) -> Option<&Arc<EpochKey>> {
        self.epochs
            .binary_search_by_key(&epoch, |record| record.id)
            .ok()
            .map(|idx| &self.epochs[idx])
    }

    /// The record of `epoch` if new evaluations may use it.
    ///
    /// # Errors
    ///
    /// Returns an error if the epoch is unknown or not evaluable.
    pub fn lookup(&self, epoch: EpochId) -> Result<&Arc<EpochKey>> {
        let record = self
            .get(epoch)
            .ok_or(KeyStoreError::UnknownEpoch(epoch))?;
        if record.is_evaluable() {
            Ok(record)
        } else {
            Err(KeyStoreError::PuncturedEpoch(epoch))
        }
    }

    /// Number of evaluable epochs.
    pub fn live_epochs(&self) -> usize {
        self.epochs.iter().filter(|r| r.is_evaluable()).count()
    }
}

struct KeyStoreInner {
    published: RwLock<Arc<Snapshot>>,
    mutator: Mutex<()>,
    args: KeyStoreArgs,
}

/// Storage for the epoch keys.
#[derive(Clone)]
pub struct KeyStore(Arc<KeyStoreInner>);

impl KeyStore {
    /// Creates a new store and mints the first epoch.
    pub fn new(args: KeyStoreArgs) -> Self {
        let first = EpochKey::mint(
            args.first_epoch,
            SystemTime::now() + args.epoch_duration,
            &args,
        );
        tracing::info!("minted first epoch {}", first.id);
        ::metrics::gauge!(METRICS_ID_LIVE_EPOCHS).set(1.0);
        Self(Arc::new(KeyStoreInner {
            published: RwLock::new(Arc::new(Snapshot {
                version: 0,
                epochs: vec![Arc::new(first)],
            })),
            mutator: Mutex::new(()),
            args,
        }))
    }

    /// Returns the published snapshot.
    ///
    /// _Note_ that the snapshot never changes. Later mutations publish a new one.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.0.published.read())
    }

    /// The id of the current epoch.
    pub fn current_epoch(&self) -> EpochId {
        self.current_snapshot().current().id
    }

    /// The record of `epoch` if new evaluations may use it.
    ///
    /// # Errors
    ///
    /// Returns an error if the epoch is unknown or not evaluable.
    pub fn lookup(&self, epoch: EpochId) -> Result<Arc<EpochKey>> {
        self.current_snapshot().lookup(epoch).cloned()
    }

    /// Mints a new current epoch for one full epoch and demotes the previous one to retained.
    ///
    /// Retained epochs beyond the retention window are no longer evaluable after this call and are returned in
    /// [`Rotation::expired`]. The caller is responsible for puncturing them.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::EpochIdsExhausted`] if the current epoch has the largest id. Nothing changes then.
    pub fn rotate(&self) -> Result<Rotation> {
        let guard = self.0.mutator.lock();
        self.rotate_locked(&guard, SystemTime::now() + self.0.args.epoch_duration)
    }

    fn rotate_locked(
        &self,
        guard: &MutexGuard<'_, ()>,
        current_until: SystemTime,
    ) -> Result<Rotation> {
        let snapshot = self.current_snapshot();
        let current = snapshot.current().id;
        let next = current
            .checked_next()
            .ok_or(KeyStoreError::EpochIdsExhausted(current))?;
        let mut epochs = snapshot
            .epochs
            .iter()
            .map(|record| {
                if record.status == EpochStatus::Current {
                    Arc::new(record.demoted())
                } else {
                    Arc::clone(record)
                }
            })
            .collect::<Vec<_>>();

        let live_retained = epochs
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == EpochStatus::Retained && !r.pending_puncture)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        let excess = live_retained
            .len()
            .saturating_sub(self.0.args.retention);
        let mut expired = Vec::with_capacity(excess);
        for idx in live_retained.into_iter().take(excess) {
            expired.push(epochs[idx].id);
            epochs[idx] = Arc::new(epochs[idx].marked_for_puncture());
        }

        epochs.push(Arc::new(EpochKey::mint(next, current_until, &self.0.args)));
        self.publish(guard, epochs);
        ::metrics::counter!(METRICS_ID_ROTATIONS).increment(1);
        tracing::info!("rotated to epoch {next}, expired: {expired:?}");
        Ok(Rotation {
            current: next,
            expired,
        })
    }

    /// Irreversibly removes the secret material of `epoch` (or only the component of `tag`).
    ///
    /// Idempotent. Evaluations that already hold the component finish, new ones are rejected. Puncturing the
    /// whole current epoch rotates first, so a new current epoch exists afterwards. That epoch stays current until
    /// the punctured one was scheduled to be replaced, and epochs the rotation pushed out of the retention window
    /// are punctured right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the epoch is unknown, the epoch doesn't serve the tag or the forced rotation fails.
    #[instrument(level = "debug", skip(self))]
    pub fn puncture(&self, epoch: EpochId, tag: Option<Tag>) -> Result<()> {
        let guard = self.0.mutator.lock();
        let snapshot = self.current_snapshot();
        let record = snapshot
            .get(epoch)
            .ok_or(KeyStoreError::UnknownEpoch(epoch))?;
        match tag {
            None => {
                if record.status == EpochStatus::Punctured {
                    tracing::debug!("epoch {epoch} already punctured");
                    return Ok(());
                }
                let mut doomed = vec![epoch];
                if record.status == EpochStatus::Current {
                    tracing::info!("puncturing current epoch {epoch} - rotating first");
                    let rotation = self.rotate_locked(&guard, record.current_until)?;
                    doomed.extend(rotation.expired.into_iter().filter(|id| *id != epoch));
                }
                tracing::info!("puncturing epochs {doomed:?}");
                self.replace_locked(&guard, |record| {
                    doomed.contains(&record.id).then(|| record.punctured())
                });
                ::metrics::counter!(METRICS_ID_PUNCTURES).increment(doomed.len() as u64);
            }
            Some(tag) => {
                if !record.serves(&tag) {
                    return Err(KeyStoreError::UnknownTag(epoch, tag));
                }
                if record.status == EpochStatus::Punctured || record.punctured_tags.contains(&tag)
                {
                    tracing::debug!("tag {tag} of epoch {epoch} already punctured");
                    return Ok(());
                }
                tracing::info!("puncturing tag {tag} of epoch {epoch}");
                self.replace_locked(&guard, |record| {
                    (record.id == epoch).then(|| record.without_tag(&tag))
                });
                ::metrics::counter!(METRICS_ID_PUNCTURES).increment(1);
            }
        }
        Ok(())
    }

    /// Retained epochs that must be punctured at `now`, either because their retention window elapsed or because
    /// a rotation marked them.
    pub fn expired_epochs(&self, now: SystemTime) -> Vec<EpochId> {
        self.current_snapshot()
            .epochs
            .iter()
            .filter(|r| {
                r.status == EpochStatus::Retained && (r.pending_puncture || r.expires_at <= now)
            })
            .map(|r| r.id)
            .collect()
    }

    /// Public information about every remembered epoch, oldest first.
    pub fn public_keys(&self) -> Vec<EpochPublicKeyInfo> {
        self.current_snapshot()
            .epochs
            .iter()
            .map(|record| record.info())
            .collect()
    }

    /// Publishes the current snapshot with every record `replace` returns a replacement for swapped out.
    fn replace_locked(
        &self,
        guard: &MutexGuard<'_, ()>,
        mut replace: impl FnMut(&EpochKey) -> Option<EpochKey>,
    ) {
        let epochs = self
            .current_snapshot()
            .epochs
            .iter()
            .map(|record| match replace(record) {
                Some(replacement) => Arc::new(replacement),
                None => Arc::clone(record),
            })
            .collect();
        self.publish(guard, epochs);
    }

    /// Publishes a new snapshot. Requires the mutator lock.
    fn publish(&self, _guard: &MutexGuard<'_, ()>, mut epochs: Vec<Arc<EpochKey>>) {
        let mut tombstones = epochs
            .iter()
            .filter(|r| r.status == EpochStatus::Punctured)
            .count();
        while tombstones > self.0.args.punctured_history {
            if let Some(idx) = epochs
                .iter()
                .position(|r| r.status == EpochStatus::Punctured)
            {
                tracing::debug!("forgetting punctured epoch {}", epochs[idx].id);
                epochs.remove(idx);
            }
            tombstones -= 1;
        }
        let mut published = self.0.published.write();
        let snapshot = Snapshot {
            version: published.version + 1,
            epochs,
        };
        ::metrics::gauge!(METRICS_ID_LIVE_EPOCHS).set(snapshot.live_epochs() as f64);
        *published = Arc::new(snapshot);
    }
}
