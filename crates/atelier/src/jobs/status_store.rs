//! Typed, generation-guarded access to the job records.
//!
//! Every write for a class happens under that class's async lock, and the
//! writer's token is checked under the same lock. Starting and cancelling a
//! job take the lock too, so a superseded job can never land a write after
//! its successor's initial record.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::token::{CancellationToken, TokenRegistry};
use super::types::{JobClass, JobState, JobStatus};
use crate::broadcast::{JobStatusBroadcaster, JobStatusEvent};
use crate::error::StoreError;
use crate::store::StateStore;

pub struct JobStatusStore {
    store: Arc<dyn StateStore>,
    registry: TokenRegistry,
    /// Indexed by `JobClass as usize`.
    locks: [Mutex<()>; 2],
    broadcaster: JobStatusBroadcaster,
}

impl JobStatusStore {
    pub fn new(store: Arc<dyn StateStore>, broadcaster: JobStatusBroadcaster) -> Self {
        Self {
            store,
            registry: TokenRegistry::new(),
            locks: [Mutex::new(()), Mutex::new(())],
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &JobStatusBroadcaster {
        &self.broadcaster
    }

    async fn lock(&self, class: JobClass) -> MutexGuard<'_, ()> {
        self.locks[class as usize].lock().await
    }

    /// Reads and decodes `class`'s record.
    pub async fn read(&self, class: JobClass) -> Result<Option<JobStatus>, StoreError> {
        let key = class.store_key();
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Serialization { key, source }),
            None => Ok(None),
        }
    }

    /// Current record, or the idle sentinel.
    pub async fn status(&self, class: JobClass) -> Result<JobStatus, StoreError> {
        Ok(self.read(class).await?.unwrap_or_else(JobStatus::idle))
    }

    async fn write(&self, class: JobClass, status: &JobStatus) -> Result<(), StoreError> {
        let key = class.store_key();
        let raw = serde_json::to_string(status).map_err(|source| StoreError::Serialization {
            key: key.clone(),
            source,
        })?;
        self.store.set(&key, &raw).await?;
        self.broadcaster
            .send(JobStatusEvent::new(class, status.clone()));
        Ok(())
    }

    async fn stored_generation(&self, class: JobClass) -> u64 {
        match self.read(class).await {
            Ok(Some(status)) => status.generation,
            Ok(None) => 0,
            Err(e) => {
                log::warn!("Ignoring unreadable {} record: {}", class, e);
                0
            }
        }
    }

    /// Supersedes any running job of `class` and writes the initial record
    /// produced by `initial` for the new generation.
    pub async fn begin<F>(
        &self,
        class: JobClass,
        initial: F,
    ) -> Result<(CancellationToken, JobStatus), StoreError>
    where
        F: FnOnce(u64) -> JobStatus,
    {
        let _guard = self.lock(class).await;

        let stored = self.stored_generation(class).await;
        let token = self.registry.begin(class, stored);
        let status = initial(token.generation());

        if let Err(e) = self.write(class, &status).await {
            token.cancel();
            self.registry.cancel(class);
            return Err(e);
        }

        Ok((token, status))
    }

    /// Writes `status` unless `token` was cancelled or a newer generation
    /// already owns the slot. Returns whether the write happened.
    pub async fn write_if_current(
        &self,
        class: JobClass,
        token: &CancellationToken,
        status: &JobStatus,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock(class).await;

        if token.is_cancelled() {
            log::debug!(
                "Dropping write for cancelled {} job generation {}",
                class,
                token.generation()
            );
            return Ok(false);
        }

        let stored = self.stored_generation(class).await;
        if stored > token.generation() {
            log::warn!(
                "Dropping stale {} write: generation {} < stored {}",
                class,
                token.generation(),
                stored
            );
            return Ok(false);
        }

        self.write(class, status).await?;
        Ok(true)
    }

    /// Cancels the running job, if any, and deletes the record. Returns
    /// whether an in-memory job was cancelled.
    pub async fn cancel(&self, class: JobClass) -> Result<bool, StoreError> {
        let _guard = self.lock(class).await;

        let had_token = self.registry.cancel(class);
        self.store.remove(&class.store_key()).await?;
        self.broadcaster
            .send(JobStatusEvent::new(class, JobStatus::idle()));
        Ok(had_token)
    }

    /// Deletes a terminal record once the caller has consumed it. A record
    /// that is still analyzing is left alone and `false` is returned.
    pub async fn clear(&self, class: JobClass) -> Result<bool, StoreError> {
        let _guard = self.lock(class).await;

        if let Some(status) = self.read(class).await? {
            if status.state == JobState::Analyzing {
                return Ok(false);
            }
            self.store.remove(&class.store_key()).await?;
            self.broadcaster
                .send(JobStatusEvent::new(class, JobStatus::idle()));
        }
        Ok(true)
    }

    /// Releases the slot held by `token`'s job after it stops, so the job
    /// no longer counts as running.
    pub fn finish(&self, class: JobClass, token: &CancellationToken) {
        if self.registry.finish(class, token.generation()) {
            log::debug!("{} job generation {} finished", class, token.generation());
        }
    }

    /// Generation of the job currently registered for `class`.
    pub fn active_generation(&self, class: JobClass) -> Option<u64> {
        self.registry.current_generation(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ImageReference;
    use crate::jobs::JobSubject;
    use crate::store::MemoryStore;

    fn image_subject() -> JobSubject {
        JobSubject::Image {
            image_reference: ImageReference::new("https://img/a.jpg"),
        }
    }

    fn status_store() -> (Arc<MemoryStore>, JobStatusStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = JobStatusStore::new(memory.clone(), JobStatusBroadcaster::default());
        (memory, store)
    }

    #[tokio::test]
    async fn test_missing_record_reads_as_idle() {
        let (_, store) = status_store();
        assert!(store.status(JobClass::Board).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_begin_writes_initial_record() {
        let (_, store) = status_store();
        let (token, status) = store
            .begin(JobClass::SingleImage, |generation| {
                JobStatus::started("j1", generation, image_subject(), 1)
            })
            .await
            .unwrap();

        assert_eq!(token.generation(), 1);
        assert_eq!(status.generation, 1);
        assert_eq!(store.status(JobClass::SingleImage).await.unwrap(), status);
    }

    #[tokio::test]
    async fn test_superseded_writer_is_dropped() {
        let (_, store) = status_store();
        let (old, old_status) = store
            .begin(JobClass::SingleImage, |g| JobStatus::started("old", g, image_subject(), 1))
            .await
            .unwrap();
        let (_new, new_status) = store
            .begin(JobClass::SingleImage, |g| JobStatus::started("new", g, image_subject(), 1))
            .await
            .unwrap();

        let written = store
            .write_if_current(JobClass::SingleImage, &old, &old_status.failed("late"))
            .await
            .unwrap();

        assert!(!written);
        assert_eq!(store.status(JobClass::SingleImage).await.unwrap(), new_status);
    }

    #[tokio::test]
    async fn test_stale_generation_is_dropped() {
        let (memory, store) = status_store();
        let (token, status) = store
            .begin(JobClass::Board, |g| JobStatus::started("j", g, image_subject(), 3))
            .await
            .unwrap();

        // A newer generation written by another process instance.
        let mut newer = status.clone();
        newer.generation = 9;
        memory
            .set(&JobClass::Board.store_key(), &serde_json::to_string(&newer).unwrap())
            .await
            .unwrap();

        let written = store
            .write_if_current(JobClass::Board, &token, &status.with_progress(1, &[]))
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(store.status(JobClass::Board).await.unwrap().generation, 9);

        // The next start continues above the stored generation.
        let (next, _) = store
            .begin(JobClass::Board, |g| JobStatus::started("k", g, image_subject(), 3))
            .await
            .unwrap();
        assert_eq!(next.generation(), 10);
    }

    #[tokio::test]
    async fn test_cancel_removes_record_and_blocks_writes() {
        let (memory, store) = status_store();
        let (token, status) = store
            .begin(JobClass::Board, |g| JobStatus::started("j", g, image_subject(), 3))
            .await
            .unwrap();

        assert!(store.cancel(JobClass::Board).await.unwrap());
        assert!(memory.is_empty());

        let written = store
            .write_if_current(JobClass::Board, &token, &status.with_progress(3, &[]))
            .await
            .unwrap();
        assert!(!written);
        assert!(memory.is_empty());

        // Idempotent.
        assert!(!store.cancel(JobClass::Board).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_refuses_in_flight_record() {
        let (_, store) = status_store();
        let (token, status) = store
            .begin(JobClass::SingleImage, |g| JobStatus::started("j", g, image_subject(), 1))
            .await
            .unwrap();

        assert!(!store.clear(JobClass::SingleImage).await.unwrap());
        assert!(!store.status(JobClass::SingleImage).await.unwrap().is_idle());

        store
            .write_if_current(JobClass::SingleImage, &token, &status.completed(vec![], None))
            .await
            .unwrap();
        assert!(store.clear(JobClass::SingleImage).await.unwrap());
        assert!(store.status(JobClass::SingleImage).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_surfaced() {
        let (memory, store) = status_store();
        memory
            .set(&JobClass::Board.store_key(), "{not json")
            .await
            .unwrap();

        let err = store.status(JobClass::Board).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_accepted_writes_are_broadcast() {
        let (_, store) = status_store();
        let mut rx = store.broadcaster().subscribe();

        store
            .begin(JobClass::SingleImage, |g| JobStatus::started("j", g, image_subject(), 1))
            .await
            .unwrap();
        store.cancel(JobClass::SingleImage).await.unwrap();

        assert_eq!(rx.try_recv().unwrap().status.state, JobState::Analyzing);
        assert_eq!(rx.try_recv().unwrap().status.state, JobState::Idle);
    }
}
