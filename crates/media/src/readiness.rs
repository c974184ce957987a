//! Readiness pipeline: drives both sources to "ready to render" with
//! bounded timeouts and tolerance for transient decoder errors.

use alphaplay_common::error::PlayerError;
use alphaplay_common::role::StreamRole;
use alphaplay_common::DURATION_EPSILON_SECS;

use crate::source::{LoadStage, MediaErrorCode, MediaSignal, MediaSource};

/// Default per-source load timeout.
pub const DEFAULT_LOAD_TIMEOUT_SECS: f64 = 30.0;

/// How long an error signal is given to clear before it is classified.
pub const ERROR_GRACE_SECS: f64 = 0.25;

// Container durations are rounded differently by decoders; anything below
// this is the same duration.
const DURATION_TOLERANCE_SECS: f64 = 0.001;

/// Tunables for a load sequence.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub load_timeout_secs: f64,
    pub error_grace_secs: f64,
    pub strict_duration: bool,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            error_grace_secs: ERROR_GRACE_SECS,
            strict_duration: false,
        }
    }
}

/// Outcome of re-checking a source after an error signal's grace window.
#[derive(Debug)]
pub enum TriageVerdict {
    /// The source recovered; report as a warning.
    Recovered(PlayerError),
    /// The error code was cleared; nothing to report.
    Ignored,
    /// The source is broken.
    Fatal(PlayerError),
}

/// Delays classification of decoder error signals.
///
/// Decoders raise error signals for hiccups they recover from on their
/// own, so a signal only starts a grace window. When it expires the
/// source's actual state decides the verdict.
#[derive(Debug, Clone)]
pub struct ErrorTriage {
    grace_secs: f64,
    pending_since: Option<f64>,
}

impl ErrorTriage {
    pub fn new(grace_secs: f64) -> Self {
        Self {
            grace_secs,
            pending_since: None,
        }
    }

    /// Record an error signal. Repeated signals do not extend the window.
    pub fn note_signal(&mut self, now: f64) {
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Classify a pending signal once its grace window has passed.
    pub fn check(&mut self, source: &MediaSource, now: f64) -> Option<TriageVerdict> {
        let since = self.pending_since?;
        if now < since + self.grace_secs {
            return None;
        }
        self.pending_since = None;

        let code = source.error_code();
        let verdict = if code == MediaErrorCode::None {
            TriageVerdict::Ignored
        } else if source.has_sufficient_data() {
            TriageVerdict::Recovered(PlayerError::transient_decode(
                source.role(),
                code.to_string(),
            ))
        } else {
            TriageVerdict::Fatal(PlayerError::load_failed(source.role(), code.to_string()))
        };
        Some(verdict)
    }
}

/// Everything the player needs once both sources are ready.
#[derive(Debug)]
pub struct ReadyReport {
    /// Shorter of the two durations; drives all position math.
    pub effective_duration: f64,
    pub color_duration: f64,
    pub mask_duration: f64,
    pub color_size: (u32, u32),
    pub mask_size: (u32, u32),
    /// Non-fatal findings, in discovery order.
    pub warnings: Vec<PlayerError>,
}

/// Terminal result of a load sequence.
#[derive(Debug)]
pub enum ReadinessOutcome {
    Ready(ReadyReport),
    Failed(PlayerError),
}

#[derive(Debug)]
struct SourceLoad {
    deadline: f64,
    triage: ErrorTriage,
}

/// Drives both sources from `Unloaded` to `Ready` concurrently.
///
/// The pipeline is polled from the frame loop; it never blocks. `poll`
/// returns the terminal outcome exactly once.
#[derive(Debug)]
pub struct ReadinessPipeline {
    policy: ReadinessPolicy,
    loads: Option<[SourceLoad; 2]>,
    warnings: Vec<PlayerError>,
    finished: bool,
}

impl ReadinessPipeline {
    pub fn new(policy: ReadinessPolicy) -> Self {
        Self {
            policy,
            loads: None,
            warnings: Vec::new(),
            finished: false,
        }
    }

    /// Whether `begin` has been called.
    pub fn is_started(&self) -> bool {
        self.loads.is_some()
    }

    /// Whether the terminal outcome has been returned.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Start loading both sources.
    pub fn begin(
        &mut self,
        color: &mut MediaSource,
        mask: &mut MediaSource,
        now: f64,
    ) -> Result<(), PlayerError> {
        if self.loads.is_some() {
            return Ok(());
        }
        tracing::info!(
            color = color.locator(),
            mask = mask.locator(),
            timeout_secs = self.policy.load_timeout_secs,
            "Loading source pair"
        );

        let deadline = now + self.policy.load_timeout_secs;
        self.loads = Some([
            SourceLoad {
                deadline,
                triage: ErrorTriage::new(self.policy.error_grace_secs),
            },
            SourceLoad {
                deadline,
                triage: ErrorTriage::new(self.policy.error_grace_secs),
            },
        ]);

        let result = color.begin_load().and_then(|_| mask.begin_load());
        if result.is_err() {
            self.finished = true;
        }
        result
    }

    /// Advance the load sequence. Returns the outcome once, then `None`.
    pub fn poll(
        &mut self,
        color: &mut MediaSource,
        mask: &mut MediaSource,
        now: f64,
    ) -> Option<ReadinessOutcome> {
        if self.finished {
            return None;
        }
        let mut loads = self.loads.take()?;

        let [color_load, mask_load] = &mut loads;
        let result = self
            .advance(color, color_load, now)
            .and_then(|_| self.advance(mask, mask_load, now));
        self.loads = Some(loads);

        if let Err(err) = result {
            self.finished = true;
            tracing::warn!(error = %err, "Source pair failed to load");
            return Some(ReadinessOutcome::Failed(err));
        }

        if color.stage() != LoadStage::Ready || mask.stage() != LoadStage::Ready {
            return None;
        }

        self.finished = true;
        Some(self.validate_pair(color, mask))
    }

    fn advance(
        &mut self,
        source: &mut MediaSource,
        load: &mut SourceLoad,
        now: f64,
    ) -> Result<(), PlayerError> {
        for signal in source.poll_signals() {
            if signal == MediaSignal::Error {
                tracing::debug!(stream = %source.role(), "Error signal; starting grace window");
                load.triage.note_signal(now);
            }
        }

        match load.triage.check(source, now) {
            Some(TriageVerdict::Recovered(warning)) => {
                tracing::warn!(stream = %source.role(), "Recovered from transient decode error");
                self.warnings.push(warning);
            }
            Some(TriageVerdict::Ignored) => {
                tracing::debug!(stream = %source.role(), "Error signal cleared during grace window");
            }
            Some(TriageVerdict::Fatal(err)) => {
                source.mark_failed(err.to_string());
                return Err(err);
            }
            None => {}
        }

        if source.stage() != LoadStage::Loading || load.triage.is_pending() {
            return Ok(());
        }

        if source.is_renderable() {
            tracing::info!(stream = %source.role(), "Source ready");
            source.mark_ready();
            return Ok(());
        }

        // A stale deadline must not override a load that completed in the
        // meantime, so readiness was re-checked just above.
        if now >= load.deadline {
            let err = PlayerError::LoadTimeout {
                stream: source.role(),
                timeout_secs: self.policy.load_timeout_secs,
            };
            source.mark_failed(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    fn validate_pair(&mut self, color: &MediaSource, mask: &MediaSource) -> ReadinessOutcome {
        let mut warnings = std::mem::take(&mut self.warnings);

        let color_size = color.natural_size().unwrap_or((0, 0));
        let mask_size = mask.natural_size().unwrap_or((0, 0));
        if color_size != mask_size {
            tracing::warn!(?color_size, ?mask_size, "Color and mask dimensions differ");
            warnings.push(PlayerError::DimensionMismatch {
                color_width: color_size.0,
                color_height: color_size.1,
                mask_width: mask_size.0,
                mask_height: mask_size.1,
            });
        }

        let color_duration = color.duration().unwrap_or(0.0);
        let mask_duration = mask.duration().unwrap_or(0.0);
        let difference = (color_duration - mask_duration).abs();
        if difference > DURATION_TOLERANCE_SECS {
            let err = PlayerError::DurationMismatch {
                color_secs: color_duration,
                mask_secs: mask_duration,
            };
            if self.policy.strict_duration && difference > DURATION_EPSILON_SECS {
                tracing::warn!(color_duration, mask_duration, "Duration mismatch (strict)");
                return ReadinessOutcome::Failed(err);
            }
            tracing::warn!(
                color_duration,
                mask_duration,
                "Duration mismatch; using the shorter duration"
            );
            warnings.push(err);
        }

        ReadinessOutcome::Ready(ReadyReport {
            effective_duration: color_duration.min(mask_duration),
            color_duration,
            mask_duration,
            color_size,
            mask_size,
            warnings,
        })
    }
}

/// Which role a pipeline failure belongs to, if any.
pub fn failed_role(err: &PlayerError) -> Option<StreamRole> {
    match err {
        PlayerError::LoadFailed { stream, .. }
        | PlayerError::LoadTimeout { stream, .. }
        | PlayerError::TransientDecode { stream, .. } => Some(*stream),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticBackend, SyntheticScript};
    use alphaplay_common::clock::{ManualTimeSource, TimeSource};
    use alphaplay_common::ErrorKind;
    use std::rc::Rc;

    fn open_pair(
        time: &ManualTimeSource,
        color: SyntheticScript,
        mask: SyntheticScript,
    ) -> (SyntheticBackend, MediaSource, MediaSource) {
        let mut backend = SyntheticBackend::new(Rc::new(time.clone()));
        backend.script("color.mp4", color);
        backend.script("mask.mp4", mask);
        let color = MediaSource::open(&mut backend, StreamRole::Color, "color.mp4").unwrap();
        let mask = MediaSource::open(&mut backend, StreamRole::Mask, "mask.mp4").unwrap();
        (backend, color, mask)
    }

    fn run(
        pipeline: &mut ReadinessPipeline,
        time: &ManualTimeSource,
        color: &mut MediaSource,
        mask: &mut MediaSource,
        max_secs: f64,
    ) -> Option<ReadinessOutcome> {
        let step = 1.0 / 60.0;
        let mut elapsed = 0.0;
        while elapsed <= max_secs {
            if let Some(outcome) = pipeline.poll(color, mask, time.now_secs()) {
                return Some(outcome);
            }
            time.advance(step);
            elapsed += step;
        }
        None
    }

    #[test]
    fn test_pair_becomes_ready() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) =
            open_pair(&time, SyntheticScript::color(), SyntheticScript::mask());
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy::default());
        assert!(!pipeline.is_started());
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();
        assert!(pipeline.is_started());
        assert!(!pipeline.is_finished());

        let outcome = run(&mut pipeline, &time, &mut color, &mut mask, 2.0);
        assert!(pipeline.is_finished());
        match outcome {
            Some(ReadinessOutcome::Ready(report)) => {
                assert!(report.warnings.is_empty());
                assert!((report.effective_duration - 10.0).abs() < 1e-9);
            }
            other => panic!("expected ready, got {other:?}"),
        }
        assert_eq!(color.stage(), LoadStage::Ready);
        assert_eq!(mask.stage(), LoadStage::Ready);
        assert!(pipeline.poll(&mut color, &mut mask, time.now_secs()).is_none());
    }

    #[test]
    fn test_small_duration_mismatch_warns_and_uses_shorter() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_duration(10.0),
            SyntheticScript::mask().with_duration(10.05),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy::default());
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Ready(report)) => {
                assert_eq!(report.warnings.len(), 1);
                assert_eq!(report.warnings[0].kind(), ErrorKind::DurationMismatch);
                assert!((report.effective_duration - 10.0).abs() < 1e-9);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_duration_within_epsilon_still_loads() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_duration(10.0),
            SyntheticScript::mask().with_duration(10.05),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy {
            strict_duration: true,
            ..ReadinessPolicy::default()
        });
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Ready(report)) => assert_eq!(report.warnings.len(), 1),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_duration_mismatch_fails() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_duration(10.0),
            SyntheticScript::mask().with_duration(12.0),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy {
            strict_duration: true,
            ..ReadinessPolicy::default()
        });
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Failed(err)) => {
                assert_eq!(err.kind(), ErrorKind::DurationMismatch)
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_lenient_duration_mismatch_warns() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_duration(12.0),
            SyntheticScript::mask().with_duration(10.0),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy::default());
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Ready(report)) => {
                assert_eq!(report.warnings.len(), 1);
                assert_eq!(report.warnings[0].kind(), ErrorKind::DurationMismatch);
                assert!((report.effective_duration - 10.0).abs() < 1e-9);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_dimension_mismatch_is_a_warning() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_size(64, 32),
            SyntheticScript::mask().with_size(32, 16),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy::default());
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Ready(report)) => {
                assert_eq!(report.warnings.len(), 1);
                assert_eq!(report.warnings[0].kind(), ErrorKind::DimensionMismatch);
                assert_eq!(report.color_size, (64, 32));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_never_ready_times_out() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color(),
            SyntheticScript::mask().never_ready(),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy {
            load_timeout_secs: 1.0,
            ..ReadinessPolicy::default()
        });
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Failed(err)) => {
                assert_eq!(err.kind(), ErrorKind::LoadTimeout);
                assert_eq!(failed_role(&err), Some(StreamRole::Mask));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(mask.stage(), LoadStage::Failed);
    }

    #[test]
    fn test_readiness_reached_at_deadline_wins_over_timeout() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_load_delay(1.0),
            SyntheticScript::mask().with_load_delay(1.0),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy {
            load_timeout_secs: 1.0,
            ..ReadinessPolicy::default()
        });
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        // First poll lands exactly on the deadline, after the load finished.
        time.set(1.0);
        match pipeline.poll(&mut color, &mut mask, time.now_secs()) {
            Some(ReadinessOutcome::Ready(_)) => {}
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_transient_error_is_tolerated() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color().with_transient_error(0.05),
            SyntheticScript::mask(),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy::default());
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Ready(report)) => assert!(report.warnings.is_empty()),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_persistent_error_fails_after_grace() {
        let time = ManualTimeSource::new(0.0);
        let (_backend, mut color, mut mask) = open_pair(
            &time,
            SyntheticScript::color(),
            SyntheticScript::mask().with_failure(0.05, MediaErrorCode::Decode),
        );
        let mut pipeline = ReadinessPipeline::new(ReadinessPolicy::default());
        pipeline.begin(&mut color, &mut mask, 0.0).unwrap();

        match run(&mut pipeline, &time, &mut color, &mut mask, 2.0) {
            Some(ReadinessOutcome::Failed(err)) => {
                assert_eq!(err.kind(), ErrorKind::LoadFailed);
                assert!(time.now_secs() >= 0.05 + ERROR_GRACE_SECS);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_triage_reports_recovery_when_ready() {
        let time = ManualTimeSource::new(0.0);
        let (backend, mut color, _mask) = open_pair(
            &time,
            SyntheticScript::color().with_load_delay(0.0),
            SyntheticScript::mask(),
        );
        color.begin_load().unwrap();
        backend
            .handle("color.mp4")
            .unwrap()
            .set_error_code(MediaErrorCode::Network);

        let mut triage = ErrorTriage::new(0.25);
        triage.note_signal(0.0);
        assert!(triage.check(&color, 0.1).is_none());
        time.set(0.3);
        match triage.check(&color, 0.3) {
            Some(TriageVerdict::Recovered(err)) => {
                assert_eq!(err.kind(), ErrorKind::TransientDecode)
            }
            other => panic!("expected recovery, got {other:?}"),
        }
        assert!(!triage.is_pending());
    }
}
