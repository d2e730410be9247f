use std::sync::atomic::{AtomicU8, Ordering};

use foreman_api::WorkerState;

/// Worker state shared between the owner and the worker thread.
///
/// The worker thread only ever toggles `Idle <-> Working` through
/// [`AtomicState::transition`]; once the owner stores `Stopping`, those
/// toggles fail and the state cannot be overwritten from the loop.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Replaces the state, returning the previous one.
    pub(crate) fn swap(&self, state: WorkerState) -> WorkerState {
        WorkerState::from_u8(self.0.swap(state as u8, Ordering::SeqCst))
    }

    /// Moves `from -> to` only if the current state is `from`.
    pub(crate) fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
