//! Synthetic decoder for tests and simulated playback.
//!
//! Produces procedurally generated frames on a shared [`TimeSource`], with
//! scriptable load latency, seek latency, clock skew and error injection.
//! Scripts are registered per locator on a [`SyntheticBackend`]; the
//! backend hands out [`SyntheticHandle`]s so callers can inspect or
//! perturb a decoder after the player has taken ownership of it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use alphaplay_common::clock::TimeSource;
use alphaplay_common::error::{PlayerError, PlayerResult};

use crate::ranges::TimeRange;
use crate::source::{
    MediaBackend, MediaDecoder, MediaErrorCode, MediaSignal, ReadyState, VideoFrame,
};

/// Behaviour of one synthetic stream.
#[derive(Debug, Clone)]
pub struct SyntheticScript {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub fps: f64,
    /// Time from `begin_load` to `HaveEnoughData`.
    pub load_delay_secs: f64,
    /// Time a seek stays in flight.
    pub seek_latency_secs: f64,
    /// Relative speed error of this decoder's internal clock
    /// (0.01 = runs 1% fast).
    pub clock_skew: f64,
    /// How far ahead of the position data is buffered.
    pub buffer_ahead_secs: f64,
    /// Error signal after load start with a code that never clears.
    pub failure: Option<(f64, MediaErrorCode)>,
    /// Error signal after load start whose code is already cleared.
    pub transient_error_after_secs: Option<f64>,
    /// Stops at `HaveMetadata` forever.
    pub never_ready: bool,
    /// `play` is rejected, as with blocked autoplay.
    pub reject_play: bool,
    /// Emit grayscale frames.
    pub grayscale: bool,
}

impl SyntheticScript {
    /// A 10s, 64x36, 30fps color stream.
    pub fn color() -> Self {
        Self {
            width: 64,
            height: 36,
            duration_secs: 10.0,
            fps: 30.0,
            load_delay_secs: 0.1,
            seek_latency_secs: 0.05,
            clock_skew: 0.0,
            buffer_ahead_secs: 10.0,
            failure: None,
            transient_error_after_secs: None,
            never_ready: false,
            reject_play: false,
            grayscale: false,
        }
    }

    /// The matching grayscale mask stream.
    pub fn mask() -> Self {
        Self {
            grayscale: true,
            ..Self::color()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_load_delay(mut self, secs: f64) -> Self {
        self.load_delay_secs = secs;
        self
    }

    pub fn with_seek_latency(mut self, secs: f64) -> Self {
        self.seek_latency_secs = secs;
        self
    }

    pub fn with_clock_skew(mut self, skew: f64) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_failure(mut self, after_secs: f64, code: MediaErrorCode) -> Self {
        self.failure = Some((after_secs, code));
        self
    }

    pub fn with_transient_error(mut self, after_secs: f64) -> Self {
        self.transient_error_after_secs = Some(after_secs);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    pub fn rejecting_play(mut self) -> Self {
        self.reject_play = true;
        self
    }
}

#[derive(Debug)]
struct SyntheticState {
    script: SyntheticScript,
    load_started: Option<f64>,
    anchor_position: f64,
    anchor_time: f64,
    seek_until: f64,
    seek_reported: bool,
    playing: bool,
    rate: f64,
    volume: f64,
    native_loop: bool,
    error_code: MediaErrorCode,
    failure_signalled: bool,
    transient_signalled: bool,
    pending_signals: Vec<MediaSignal>,
    frame_index: Option<u64>,
    frame: Vec<u8>,
    seeks: usize,
    play_calls: usize,
    released: bool,
}

impl SyntheticState {
    fn new(script: SyntheticScript) -> Self {
        Self {
            script,
            load_started: None,
            anchor_position: 0.0,
            anchor_time: 0.0,
            seek_until: 0.0,
            seek_reported: true,
            playing: false,
            rate: 1.0,
            volume: 1.0,
            native_loop: false,
            error_code: MediaErrorCode::None,
            failure_signalled: false,
            transient_signalled: false,
            pending_signals: Vec::new(),
            frame_index: None,
            frame: Vec::new(),
            seeks: 0,
            play_calls: 0,
            released: false,
        }
    }

    fn ready_state(&self, now: f64) -> ReadyState {
        let Some(started) = self.load_started else {
            return ReadyState::HaveNothing;
        };
        let elapsed = now - started;
        let loaded = elapsed >= self.script.load_delay_secs;
        let has_metadata = elapsed >= self.script.load_delay_secs / 2.0;
        let broken = self.script.failure.is_some() || self.script.never_ready;

        if loaded && !broken {
            if now < self.seek_until {
                ReadyState::HaveMetadata
            } else {
                ReadyState::HaveEnoughData
            }
        } else if has_metadata {
            ReadyState::HaveMetadata
        } else {
            ReadyState::HaveNothing
        }
    }

    /// Loaded and not scripted to break. Frames stay available mid-seek.
    fn has_frames(&self, now: f64) -> bool {
        let broken = self.script.failure.is_some() || self.script.never_ready;
        self.load_started
            .is_some_and(|started| now - started >= self.script.load_delay_secs)
            && !broken
    }

    fn position(&self, now: f64) -> f64 {
        let duration = self.script.duration_secs;
        if !self.playing || now < self.seek_until {
            return self.anchor_position;
        }
        // A landed seek resumes where playback would be had it never paused.
        let since = now - self.anchor_time;
        let raw = self.anchor_position + since * self.rate * (1.0 + self.script.clock_skew);
        if self.native_loop && duration > 0.0 {
            raw.rem_euclid(duration)
        } else {
            raw.clamp(0.0, duration)
        }
    }

    /// Re-anchor so later rate or play-state changes keep the position.
    fn rebase(&mut self, now: f64) {
        if now < self.seek_until {
            return;
        }
        self.anchor_position = self.position(now);
        self.anchor_time = now;
    }

    fn collect_signals(&mut self, now: f64) {
        if let Some(started) = self.load_started {
            if let Some((after, code)) = self.script.failure {
                if !self.failure_signalled && now - started >= after {
                    self.failure_signalled = true;
                    self.error_code = code;
                    self.pending_signals.push(MediaSignal::Error);
                }
            }
            if let Some(after) = self.script.transient_error_after_secs {
                if !self.transient_signalled && now - started >= after {
                    self.transient_signalled = true;
                    self.pending_signals.push(MediaSignal::Error);
                }
            }
        }
        if !self.seek_reported && now >= self.seek_until {
            self.seek_reported = true;
            self.pending_signals
                .push(MediaSignal::Seeked(self.anchor_position));
        }
    }

    fn render_frame(&mut self, index: u64) {
        let (w, h) = (self.script.width as usize, self.script.height as usize);
        self.frame.resize(w * h * 4, 0);
        let shift = (index % 256) as usize;
        for y in 0..h {
            for x in 0..w {
                let px = &mut self.frame[(y * w + x) * 4..(y * w + x) * 4 + 4];
                if self.script.grayscale {
                    let v = ((x + shift) % w.max(1) * 255 / w.max(1)) as u8;
                    px.copy_from_slice(&[v, v, v, 255]);
                } else {
                    px.copy_from_slice(&[
                        (x * 255 / w.max(1)) as u8,
                        (y * 255 / h.max(1)) as u8,
                        shift as u8,
                        255,
                    ]);
                }
            }
        }
        self.frame_index = Some(index);
    }
}

/// Shared access to a synthetic decoder owned elsewhere.
#[derive(Debug, Clone)]
pub struct SyntheticHandle {
    state: Rc<RefCell<SyntheticState>>,
    time: Rc<dyn TimeSource>,
}

impl SyntheticHandle {
    pub fn position(&self) -> f64 {
        self.state.borrow().position(self.time.now_secs())
    }

    /// Jump the decoder's position without a seek, as drift would.
    pub fn force_position(&self, secs: f64) {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        state.anchor_position = secs;
        state.anchor_time = now;
    }

    pub fn set_error_code(&self, code: MediaErrorCode) {
        self.state.borrow_mut().error_code = code;
    }

    /// Queue an error signal for the next poll.
    pub fn raise_error(&self) {
        self.state
            .borrow_mut()
            .pending_signals
            .push(MediaSignal::Error);
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn rate(&self) -> f64 {
        self.state.borrow().rate
    }

    pub fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    pub fn native_loop(&self) -> bool {
        self.state.borrow().native_loop
    }

    pub fn seek_count(&self) -> usize {
        self.state.borrow().seeks
    }

    pub fn play_calls(&self) -> usize {
        self.state.borrow().play_calls
    }

    pub fn is_released(&self) -> bool {
        self.state.borrow().released
    }
}

/// A [`MediaDecoder`] over a [`SyntheticScript`].
#[derive(Debug)]
pub struct SyntheticDecoder {
    state: Rc<RefCell<SyntheticState>>,
    time: Rc<dyn TimeSource>,
    frame_view: Vec<u8>,
}

impl SyntheticDecoder {
    pub fn new(script: SyntheticScript, time: Rc<dyn TimeSource>) -> Self {
        Self {
            state: Rc::new(RefCell::new(SyntheticState::new(script))),
            time,
            frame_view: Vec::new(),
        }
    }

    pub fn handle(&self) -> SyntheticHandle {
        SyntheticHandle {
            state: self.state.clone(),
            time: self.time.clone(),
        }
    }
}

impl MediaDecoder for SyntheticDecoder {
    fn begin_load(&mut self) -> PlayerResult<()> {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        if state.load_started.is_none() {
            state.load_started = Some(now);
        }
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready_state(self.time.now_secs())
    }

    fn error_code(&self) -> MediaErrorCode {
        self.state.borrow().error_code
    }

    fn poll_signals(&mut self) -> Vec<MediaSignal> {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        state.collect_signals(now);
        std::mem::take(&mut state.pending_signals)
    }

    fn natural_size(&self) -> Option<(u32, u32)> {
        let state = self.state.borrow();
        (state.ready_state(self.time.now_secs()) >= ReadyState::HaveMetadata)
            .then_some((state.script.width, state.script.height))
    }

    fn duration(&self) -> Option<f64> {
        let state = self.state.borrow();
        (state.ready_state(self.time.now_secs()) >= ReadyState::HaveMetadata)
            .then_some(state.script.duration_secs)
    }

    fn position(&self) -> f64 {
        self.state.borrow().position(self.time.now_secs())
    }

    fn set_position(&mut self, secs: f64) {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        let target = secs.clamp(0.0, state.script.duration_secs);
        state.anchor_position = target;
        state.anchor_time = now;
        state.seek_until = now + state.script.seek_latency_secs;
        state.seek_reported = false;
        state.seeks += 1;
    }

    fn is_seeking(&self) -> bool {
        self.time.now_secs() < self.state.borrow().seek_until
    }

    fn play(&mut self) -> PlayerResult<()> {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        state.play_calls += 1;
        if state.script.reject_play {
            return Err(PlayerError::media("playback was not allowed"));
        }
        if !state.playing {
            state.rebase(now);
            state.playing = true;
        }
        Ok(())
    }

    fn pause(&mut self) {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        if state.playing {
            state.rebase(now);
            state.playing = false;
        }
    }

    fn set_rate(&mut self, rate: f64) {
        let now = self.time.now_secs();
        let mut state = self.state.borrow_mut();
        state.rebase(now);
        state.rate = rate;
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.borrow_mut().volume = volume;
    }

    fn set_native_loop(&mut self, enabled: bool) {
        self.state.borrow_mut().native_loop = enabled;
    }

    fn buffered(&self) -> Vec<TimeRange> {
        let now = self.time.now_secs();
        let state = self.state.borrow();
        if state.ready_state(now) < ReadyState::HaveCurrentData {
            return Vec::new();
        }
        let position = state.position(now);
        let end = (position + state.script.buffer_ahead_secs).min(state.script.duration_secs);
        vec![TimeRange::new(0.0, end)]
    }

    fn current_frame(&mut self) -> Option<VideoFrame<'_>> {
        let now = self.time.now_secs();
        let (width, height, position) = {
            let mut state = self.state.borrow_mut();
            if !state.has_frames(now) {
                return None;
            }
            let fps = state.script.fps.max(1.0);
            let index = (state.position(now) * fps).floor() as u64;
            if state.frame_index != Some(index) {
                state.render_frame(index);
            }
            self.frame_view.clear();
            self.frame_view.extend_from_slice(&state.frame);
            (state.script.width, state.script.height, index as f64 / fps)
        };
        Some(VideoFrame {
            width,
            height,
            position,
            pixels: &self.frame_view,
        })
    }

    fn release(&mut self) -> PlayerResult<()> {
        let mut state = self.state.borrow_mut();
        state.playing = false;
        state.released = true;
        state.frame = Vec::new();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BackendInner {
    scripts: HashMap<String, SyntheticScript>,
    handles: HashMap<String, SyntheticHandle>,
}

/// A [`MediaBackend`] serving scripted synthetic streams.
///
/// Clones share scripts, handles and the open counter.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    time: Rc<dyn TimeSource>,
    inner: Rc<RefCell<BackendInner>>,
    opened: Rc<Cell<usize>>,
}

impl SyntheticBackend {
    pub fn new(time: Rc<dyn TimeSource>) -> Self {
        Self {
            time,
            inner: Rc::new(RefCell::new(BackendInner::default())),
            opened: Rc::new(Cell::new(0)),
        }
    }

    /// Register the script served for `locator`.
    pub fn script(&mut self, locator: impl Into<String>, script: SyntheticScript) {
        self.inner.borrow_mut().scripts.insert(locator.into(), script);
    }

    /// Handle to the most recently opened decoder for `locator`.
    pub fn handle(&self, locator: &str) -> Option<SyntheticHandle> {
        self.inner.borrow().handles.get(locator).cloned()
    }

    /// Number of decoders opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.get()
    }
}

impl MediaBackend for SyntheticBackend {
    fn open(&mut self, locator: &str) -> PlayerResult<Box<dyn MediaDecoder>> {
        let script = self
            .inner
            .borrow()
            .scripts
            .get(locator)
            .cloned()
            .ok_or_else(|| PlayerError::media(format!("no synthetic stream at '{locator}'")))?;

        let decoder = SyntheticDecoder::new(script, self.time.clone());
        self.inner
            .borrow_mut()
            .handles
            .insert(locator.to_string(), decoder.handle());
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(decoder))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
