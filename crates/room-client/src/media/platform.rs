//! OS integration hooks.

use super::MediaError;
use std::fmt;

/// Audio output route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioOutput {
    Speaker,
    Earpiece,
    Headset,
    Bluetooth,
}

impl AudioOutput {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AudioOutput::Speaker => "speaker",
            AudioOutput::Earpiece => "earpiece",
            AudioOutput::Headset => "headset",
            AudioOutput::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for AudioOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform services around a call: background indicators and audio routing.
///
/// Every method defaults to a no-op so hosts implement only what they have.
pub trait CallPlatform: Send + Sync + 'static {
    /// Show or hide the ongoing-call indicator (foreground service on mobile).
    fn set_call_indicator(&self, _active: bool) {}

    /// Show or hide the screen-capture indicator.
    fn set_screen_share_indicator(&self, _active: bool) {}

    /// Route call audio to `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the route is not available.
    fn route_audio(&self, _output: AudioOutput) -> Result<(), MediaError> {
        Ok(())
    }
}

/// Platform with no integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlatform;

impl CallPlatform for NoopPlatform {}
