//! Call platform that records what the session asked of it.

use room_client::media::{AudioOutput, CallPlatform, MediaError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Recording [`CallPlatform`].
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    call_indicator: AtomicBool,
    call_indicator_changes: AtomicUsize,
    screen_share_indicator: AtomicBool,
    routes: Mutex<Vec<AudioOutput>>,
    unavailable: Mutex<HashSet<AudioOutput>>,
}

impl RecordingPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routing to `output` fails.
    #[must_use]
    pub fn with_unavailable_output(self, output: AudioOutput) -> Self {
        self.unavailable.lock().unwrap().insert(output);
        self
    }

    #[must_use]
    pub fn call_indicator(&self) -> bool {
        self.call_indicator.load(Ordering::SeqCst)
    }

    /// Number of times the call indicator was switched.
    #[must_use]
    pub fn call_indicator_changes(&self) -> usize {
        self.call_indicator_changes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn screen_share_indicator(&self) -> bool {
        self.screen_share_indicator.load(Ordering::SeqCst)
    }

    /// Successful audio routes, oldest first.
    #[must_use]
    pub fn routes(&self) -> Vec<AudioOutput> {
        self.routes.lock().unwrap().clone()
    }
}

impl CallPlatform for RecordingPlatform {
    fn set_call_indicator(&self, active: bool) {
        self.call_indicator.store(active, Ordering::SeqCst);
        self.call_indicator_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn set_screen_share_indicator(&self, active: bool) {
        self.screen_share_indicator.store(active, Ordering::SeqCst);
    }

    fn route_audio(&self, output: AudioOutput) -> Result<(), MediaError> {
        if self.unavailable.lock().unwrap().contains(&output) {
            return Err(MediaError::Failed(format!("{output} not available")));
        }
        self.routes.lock().unwrap().push(output);
        Ok(())
    }
}
