//! Coarse build progress reporting.
//!
//! The build path emits [`BuildEvent`]s; callers decide how to render them.
//! Reporters are called from worker threads during chunking.

/// Phase of the build pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildEvent {
    /// Walking the repository. Total unknown.
    Scanning,
    /// `done` of `total` eligible files chunked.
    Chunking { done: usize, total: usize },
    /// `done` of `total` chunks embedded.
    Embedding { done: usize, total: usize },
    /// Writing the index to disk.
    Persisting,
}

/// Receives build progress. Implementations must tolerate calls from
/// several threads at once.
pub trait BuildProgress: Send + Sync {
    fn report(&self, event: BuildEvent);
}

/// Discards all events.
pub struct NoProgress;

impl BuildProgress for NoProgress {
    fn report(&self, _event: BuildEvent) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every event, for assertions.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub events: Mutex<Vec<BuildEvent>>,
    }

    impl BuildProgress for RecordingProgress {
        fn report(&self, event: BuildEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
