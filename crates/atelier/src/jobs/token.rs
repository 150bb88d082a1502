//! Cancellation tokens and the per-class token slots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::JobClass;

/// Cooperative cancellation flag for one job run.
///
/// Clones share the flag; the work loop checks it at its checkpoints.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct Slot {
    current: Option<CancellationToken>,
    last_generation: u64,
}

/// One token slot per job class, plus the generation counter.
#[derive(Default)]
pub struct TokenRegistry {
    slots: Mutex<HashMap<JobClass, Slot>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobClass, Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Token registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Cancels any token in `class`'s slot and installs a fresh one.
    ///
    /// The new generation is one above both the registry counter and
    /// `stored_generation`, so a restarted process never reuses a
    /// generation already persisted.
    pub fn begin(&self, class: JobClass, stored_generation: u64) -> CancellationToken {
        let mut slots = self.lock();
        let slot = slots.entry(class).or_default();

        if let Some(previous) = slot.current.take() {
            log::debug!(
                "Superseding {} job generation {}",
                class,
                previous.generation()
            );
            previous.cancel();
        }

        let generation = slot.last_generation.max(stored_generation) + 1;
        slot.last_generation = generation;

        let token = CancellationToken::new(generation);
        slot.current = Some(token.clone());
        token
    }

    /// Cancels and clears `class`'s slot. Returns whether a token was present.
    pub fn cancel(&self, class: JobClass) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(&class).and_then(|slot| slot.current.take()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Releases `class`'s slot once the job of `generation` has stopped.
    /// A slot already taken over by a newer job is left alone. Returns
    /// whether the slot was released.
    pub fn finish(&self, class: JobClass, generation: u64) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(&class) {
            Some(slot)
                if slot
                    .current
                    .as_ref()
                    .is_some_and(|token| token.generation() == generation) =>
            {
                slot.current = None;
                true
            }
            _ => false,
        }
    }

    /// Generation of the token currently in `class`'s slot, if any.
    pub fn current_generation(&self, class: JobClass) -> Option<u64> {
        self.lock()
            .get(&class)
            .and_then(|slot| slot.current.as_ref())
            .map(|token| token.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_supersedes_previous_token() {
        let registry = TokenRegistry::new();
        let first = registry.begin(JobClass::Board, 0);
        let second = registry.begin(JobClass::Board, 0);

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 2);
        assert_eq!(registry.current_generation(JobClass::Board), Some(2));
    }

    #[test]
    fn test_classes_are_independent() {
        let registry = TokenRegistry::new();
        let board = registry.begin(JobClass::Board, 0);
        let image = registry.begin(JobClass::SingleImage, 0);

        assert!(!board.is_cancelled());
        assert!(!image.is_cancelled());
        assert_eq!(image.generation(), 1);
    }

    #[test]
    fn test_generation_continues_after_stored_value() {
        let registry = TokenRegistry::new();
        let token = registry.begin(JobClass::SingleImage, 41);
        assert_eq!(token.generation(), 42);
    }

    #[test]
    fn test_cancel_clears_slot_and_is_idempotent() {
        let registry = TokenRegistry::new();
        let token = registry.begin(JobClass::Board, 0);

        assert!(registry.cancel(JobClass::Board));
        assert!(token.is_cancelled());
        assert!(!registry.cancel(JobClass::Board));
        assert_eq!(registry.current_generation(JobClass::Board), None);
    }

    #[test]
    fn test_finish_releases_only_own_generation() {
        let registry = TokenRegistry::new();
        let old = registry.begin(JobClass::Board, 0);
        let new = registry.begin(JobClass::Board, 0);

        assert!(!registry.finish(JobClass::Board, old.generation()));
        assert_eq!(registry.current_generation(JobClass::Board), Some(2));

        assert!(registry.finish(JobClass::Board, new.generation()));
        assert_eq!(registry.current_generation(JobClass::Board), None);
        assert!(!registry.cancel(JobClass::Board));
        assert!(!new.is_cancelled());

        // The counter survives the released slot.
        assert_eq!(registry.begin(JobClass::Board, 0).generation(), 3);
    }

    #[test]
    fn test_clones_share_cancellation() {
        let token = CancellationToken::new(1);
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
