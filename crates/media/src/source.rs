//! Media source capability and the per-stream wrapper the player owns.

use std::fmt;

use alphaplay_common::error::{PlayerError, PlayerResult};
use alphaplay_common::role::StreamRole;
use serde::{Deserialize, Serialize};

use crate::ranges::TimeRange;

/// How much decoded data a decoder has available.
///
/// Ordered: each level implies all lower levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadyState {
    /// Nothing known about the resource yet.
    HaveNothing,
    /// Duration and natural dimensions are known.
    HaveMetadata,
    /// The frame at the current position is decoded.
    HaveCurrentData,
    /// Enough is buffered to advance at least one frame.
    HaveFutureData,
    /// Enough is buffered to play through without stalling.
    HaveEnoughData,
}

impl ReadyState {
    /// Buffered enough to render without stalling.
    pub fn is_sufficient(&self) -> bool {
        *self >= ReadyState::HaveFutureData
    }
}

/// Error code reported by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaErrorCode {
    /// No error. Never fatal.
    None,
    Aborted,
    Network,
    Decode,
    Unsupported,
}

impl fmt::Display for MediaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MediaErrorCode::None => "no error",
            MediaErrorCode::Aborted => "fetch aborted",
            MediaErrorCode::Network => "network error",
            MediaErrorCode::Decode => "decode error",
            MediaErrorCode::Unsupported => "source not supported",
        };
        f.write_str(text)
    }
}

/// Asynchronous notifications raised by a decoder since the last poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaSignal {
    /// An error was raised. The code may already be cleared by the time
    /// it is inspected.
    Error,
    /// A seek completed at the given position.
    Seeked(f64),
    /// Data stopped arriving.
    Stalled,
}

/// One decoded RGBA8 frame, row-major, borrowed from the decoder.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Media time of this frame in seconds.
    pub position: f64,
    pub pixels: &'a [u8],
}

impl VideoFrame<'_> {
    /// Whether the pixel buffer matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

/// The externally supplied decoding capability for one stream.
///
/// The player never decodes video itself; it only drives these primitives.
pub trait MediaDecoder {
    /// Start fetching and decoding the resource.
    fn begin_load(&mut self) -> PlayerResult<()>;

    /// Current readiness level.
    fn ready_state(&self) -> ReadyState;

    /// Current error code. `MediaErrorCode::None` when healthy.
    fn error_code(&self) -> MediaErrorCode;

    /// Drain signals raised since the last call.
    fn poll_signals(&mut self) -> Vec<MediaSignal>;

    /// Natural frame dimensions, once metadata is available.
    fn natural_size(&self) -> Option<(u32, u32)>;

    /// Duration in seconds, once metadata is available.
    fn duration(&self) -> Option<f64>;

    /// Current playback position in seconds.
    fn position(&self) -> f64;

    /// Request a seek. Completion is reported via `is_seeking` and a
    /// `Seeked` signal.
    fn set_position(&mut self, secs: f64);

    /// Whether a seek is in flight.
    fn is_seeking(&self) -> bool;

    /// Request playback. An error means the platform rejected it.
    fn play(&mut self) -> PlayerResult<()>;

    fn pause(&mut self);

    fn set_rate(&mut self, rate: f64);

    fn set_volume(&mut self, volume: f64);

    /// Enable or disable decoder-level looping at end of stream.
    fn set_native_loop(&mut self, enabled: bool);

    /// Buffered ranges in media time.
    fn buffered(&self) -> Vec<TimeRange>;

    /// The frame at the current position, if one is decoded.
    fn current_frame(&mut self) -> Option<VideoFrame<'_>>;

    /// Release decoder resources.
    fn release(&mut self) -> PlayerResult<()>;
}

/// Factory for decoders, one per locator.
pub trait MediaBackend {
    /// Open a decoder for `locator`. Loading starts with `begin_load`.
    fn open(&mut self, locator: &str) -> PlayerResult<Box<dyn MediaDecoder>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Load progress of a [`MediaSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStage {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// One stream of the pair: a decoder plus its load bookkeeping.
pub struct MediaSource {
    role: StreamRole,
    locator: String,
    stage: LoadStage,
    error: Option<String>,
    decoder: Box<dyn MediaDecoder>,
    released: bool,
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("role", &self.role)
            .field("locator", &self.locator)
            .field("stage", &self.stage)
            .field("error", &self.error)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl MediaSource {
    /// Open a source through the backend.
    pub fn open(
        backend: &mut dyn MediaBackend,
        role: StreamRole,
        locator: &str,
    ) -> PlayerResult<Self> {
        let decoder = backend.open(locator).map_err(|e| {
            PlayerError::load_failed(role, format!("cannot open '{locator}': {e}"))
        })?;
        tracing::debug!(stream = %role, locator, backend = backend.name(), "Opened media source");
        Ok(Self::new(role, locator, decoder))
    }

    /// Wrap an already opened decoder.
    pub fn new(role: StreamRole, locator: impl Into<String>, decoder: Box<dyn MediaDecoder>) -> Self {
        Self {
            role,
            locator: locator.into(),
            stage: LoadStage::Unloaded,
            error: None,
            decoder,
            released: false,
        }
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    /// Description of the failure, if the source failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn begin_load(&mut self) -> PlayerResult<()> {
        self.decoder.begin_load().map_err(|e| {
            self.mark_failed(e.to_string());
            PlayerError::load_failed(self.role, e.to_string())
        })?;
        self.stage = LoadStage::Loading;
        Ok(())
    }

    pub(crate) fn mark_ready(&mut self) {
        self.stage = LoadStage::Ready;
    }

    pub(crate) fn mark_failed(&mut self, message: impl Into<String>) {
        self.stage = LoadStage::Failed;
        self.error = Some(message.into());
    }

    pub fn ready_state(&self) -> ReadyState {
        self.decoder.ready_state()
    }

    /// Buffered enough to render without stalling.
    pub fn has_sufficient_data(&self) -> bool {
        self.decoder.ready_state().is_sufficient()
    }

    /// Sufficient data plus known dimensions and duration.
    pub fn is_renderable(&self) -> bool {
        self.has_sufficient_data()
            && self.decoder.natural_size().is_some()
            && self.decoder.duration().is_some_and(|d| d.is_finite() && d > 0.0)
    }

    pub fn error_code(&self) -> MediaErrorCode {
        self.decoder.error_code()
    }

    pub fn poll_signals(&mut self) -> Vec<MediaSignal> {
        if self.released {
            return Vec::new();
        }
        self.decoder.poll_signals()
    }

    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.decoder.natural_size()
    }

    pub fn duration(&self) -> Option<f64> {
        self.decoder.duration()
    }

    pub fn position(&self) -> f64 {
        self.decoder.position()
    }

    pub fn seek(&mut self, secs: f64) {
        if !self.released {
            self.decoder.set_position(secs.max(0.0));
        }
    }

    pub fn is_seeking(&self) -> bool {
        self.decoder.is_seeking()
    }

    pub fn play(&mut self) -> PlayerResult<()> {
        if self.released {
            return Ok(());
        }
        self.decoder.play()
    }

    pub fn pause(&mut self) {
        if !self.released {
            self.decoder.pause();
        }
    }

    pub fn set_rate(&mut self, rate: f64) {
        if !self.released {
            self.decoder.set_rate(rate);
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        if !self.released {
            self.decoder.set_volume(volume.clamp(0.0, 1.0));
        }
    }

    pub fn set_native_loop(&mut self, enabled: bool) {
        if !self.released {
            self.decoder.set_native_loop(enabled);
        }
    }

    pub fn buffered(&self) -> Vec<TimeRange> {
        self.decoder.buffered()
    }

    pub fn current_frame(&mut self) -> Option<VideoFrame<'_>> {
        if self.released {
            return None;
        }
        self.decoder.current_frame()
    }

    /// Release the decoder. Later calls are no-ops.
    pub fn release(&mut self) -> PlayerResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.decoder.pause();
        self.decoder.release()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::HaveEnoughData.is_sufficient());
        assert!(ReadyState::HaveFutureData.is_sufficient());
        assert!(!ReadyState::HaveCurrentData.is_sufficient());
        assert!(ReadyState::HaveMetadata > ReadyState::HaveNothing);
    }

    #[test]
    fn test_frame_well_formed() {
        let pixels = vec![0u8; 2 * 3 * 4];
        let frame = VideoFrame {
            width: 2,
            height: 3,
            position: 0.0,
            pixels: &pixels,
        };
        assert!(frame.is_well_formed());

        let short = VideoFrame {
            pixels: &pixels[..4],
            ..frame
        };
        assert!(!short.is_well_formed());
    }
}
