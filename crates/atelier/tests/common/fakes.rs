//! In-process fakes for the orchestrator's collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Semaphore;

use atelier::analysis::{AnalysisError, AnalysisResult, AnalysisService, ImageReference};
use atelier::board::{BoardItem, BoardPage, BoardSource, BoardSourceError};
use atelier::error::StoreError;
use atelier::jobs::{JobClass, JobStatus};
use atelier::{MemoryStore, StateStore};

/// What the scripted service answers for one image.
#[derive(Debug, Clone)]
pub enum Outcome {
    Analysis(AnalysisResult),
    Failure(String),
}

/// Analysis service answering from a script keyed by image reference.
/// Unscripted images get a generic analysis. An optional gate holds every
/// call until the test releases permits.
pub struct ScriptedService {
    outcomes: HashMap<String, Outcome>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    finished: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
            gate: None,
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A service whose calls block until permits are added to the returned
    /// semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut service = Self::new();
        service.gate = Some(Arc::clone(&gate));
        (service, gate)
    }

    pub fn with_outcome(mut self, image: &str, outcome: Outcome) -> Self {
        self.outcomes.insert(image.to_string(), outcome);
        self
    }

    pub fn with_label(self, image: &str, label: &str, summary: &str) -> Self {
        self.with_outcome(image, Outcome::Analysis(AnalysisResult::new(label, summary)))
    }

    pub fn with_failure(self, image: &str, message: &str) -> Self {
        self.with_outcome(image, Outcome::Failure(message.to_string()))
    }

    /// Calls that have started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that have returned.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn analyze(
        &self,
        image: &ImageReference,
        _credential: &SecretString,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let outcome = self
            .outcomes
            .get(image.as_str())
            .cloned()
            .unwrap_or_else(|| Outcome::Analysis(AnalysisResult::new("Minimalism", "clean lines")));

        self.finished.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Outcome::Analysis(result) => Ok(result),
            Outcome::Failure(message) => Err(AnalysisError::Server(message)),
        }
    }
}

/// Store that records every mutation in order. Writes can be switched
/// off to simulate a store that stopped accepting them.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    /// `(key, Some(value))` for a set, `(key, None)` for a remove.
    log: Mutex<Vec<(String, Option<String>)>>,
    reject_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Every record written for `class`, decoded, in write order.
    pub fn writes(&self, class: JobClass) -> Vec<JobStatus> {
        let key = class.store_key();
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == key)
            .filter_map(|(_, v)| v.as_ref())
            .map(|v| serde_json::from_str(v).unwrap())
            .collect()
    }

    pub fn removals(&self, class: JobClass) -> usize {
        let key = class.store_key();
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, v)| *k == key && v.is_none())
            .count()
    }
}

#[async_trait]
impl StateStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Join("store is read-only".to_string()));
        }
        self.log
            .lock()
            .unwrap()
            .push((key.to_string(), Some(value.to_string())));
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.log.lock().unwrap().push((key.to_string(), None));
        self.inner.remove(key).await
    }
}

/// Board source serving fixed pages, chained by `page-N` bookmarks. It can
/// be gated like `ScriptedService` or made to fail every fetch.
pub struct PagedBoardSource {
    pages: Vec<Vec<BoardItem>>,
    fetches: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    failure: Option<String>,
}

impl PagedBoardSource {
    pub fn new(pages: Vec<Vec<BoardItem>>) -> Self {
        Self {
            pages,
            fetches: AtomicUsize::new(0),
            gate: None,
            failure: None,
        }
    }

    pub fn gated(pages: Vec<Vec<BoardItem>>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut source = Self::new(pages);
        source.gate = Some(Arc::clone(&gate));
        (source, gate)
    }

    pub fn failing(message: &str) -> Self {
        let mut source = Self::new(Vec::new());
        source.failure = Some(message.to_string());
        source
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BoardSource for PagedBoardSource {
    async fn fetch_page(
        &self,
        _board_id: &str,
        bookmark: Option<&str>,
    ) -> Result<BoardPage, BoardSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(message) = &self.failure {
            return Err(BoardSourceError::Rejected {
                status: 502,
                message: message.clone(),
            });
        }

        let index = match bookmark {
            None => 0,
            Some(b) => b
                .trim_start_matches("page-")
                .parse::<usize>()
                .map_err(|e| BoardSourceError::InvalidResponse(e.to_string()))?,
        };

        let items = self.pages.get(index).cloned().unwrap_or_default();
        let bookmark = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(BoardPage { items, bookmark })
    }
}
