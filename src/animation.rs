//! Start → end parameter animation for live preview and video export.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::params::{ParamError, ParamId, ParameterStore};

/// Export frame rate. Durations are converted to steps at this rate.
pub const EXPORT_FPS: u32 = 60;
const MIN_DURATION: f64 = 1.0 / EXPORT_FPS as f64;
/// Longest recording, in seconds.
pub const MAX_DURATION: f64 = 1_000_000.0;

// ------------------------- Cancellation -------------------------

pub trait CancelToken: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    #[inline]
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F> CancelToken for F
where
    F: Fn() -> bool + Send + Sync,
{
    #[inline]
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Shared flag another thread (or a UI button) can trip.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl CancelToken for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ------------------------- Step kinds -------------------------

pub type SpeedFn = fn(start: f64, end: f64, steps: f64) -> f64;
pub type StepFn = fn(value: f64, speed: f64) -> f64;

#[derive(Debug, Clone, Copy)]
pub enum StepKind {
    Additive,
    Multiplicative,
    Custom { speed: SpeedFn, step: StepFn },
}

impl StepKind {
    /// Per-step increment (or factor) that carries `start` to `end` in `steps`.
    pub fn speed(&self, start: f64, end: f64, steps: f64) -> f64 {
        match self {
            StepKind::Additive => {
                if steps > 0.0 {
                    (end - start) / steps
                } else {
                    0.0
                }
            }
            StepKind::Multiplicative => {
                let ratio = end / start;
                if steps > 0.0 && ratio.is_finite() && ratio > 0.0 {
                    ratio.powf(1.0 / steps)
                } else {
                    1.0
                }
            }
            StepKind::Custom { speed, .. } => speed(start, end, steps),
        }
    }

    pub fn step(&self, value: f64, speed: f64) -> f64 {
        match self {
            StepKind::Additive => value + speed,
            StepKind::Multiplicative => value * speed,
            StepKind::Custom { step, .. } => step(value, speed),
        }
    }
}

impl PartialEq for StepKind {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (StepKind::Additive, StepKind::Additive)
                | (StepKind::Multiplicative, StepKind::Multiplicative)
                | (StepKind::Custom { .. }, StepKind::Custom { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSpec {
    pub param: ParamId,
    pub enabled: bool,
    pub start: f64,
    pub end: f64,
    pub kind: StepKind,
}

impl AnimationSpec {
    pub fn additive(param: ParamId, start: f64, end: f64) -> Self {
        Self {
            param,
            enabled: false,
            start,
            end,
            kind: StepKind::Additive,
        }
    }

    pub fn multiplicative(param: ParamId, start: f64, end: f64) -> Self {
        Self {
            param,
            enabled: false,
            start,
            end,
            kind: StepKind::Multiplicative,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn advance(&self, store: &mut ParameterStore, steps: f64) -> Result<(), ParamError> {
        let speed = self.kind.speed(self.start, self.end, steps);
        let value = store.float(self.param)?;
        store.set(self.param, self.kind.step(value, speed))
    }
}

// ------------------------- Engine -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Previewing,
    Recording,
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("frame capture failed: {0}")]
    Capture(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("recording cancelled after {frames} frames")]
    Cancelled { frames: usize },
    #[error("fractal `{0}` has no animatable parameters")]
    NotAnimatable(String),
}

impl RecordError {
    pub fn capture(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RecordError::Capture(err.into())
    }
}

#[derive(Debug, Clone)]
pub struct AnimationEngine {
    specs: Vec<AnimationSpec>,
    duration: f64,
    preview_speed: f64,
    state: EngineState,
}

impl AnimationEngine {
    pub fn new(specs: Vec<AnimationSpec>) -> Self {
        Self {
            specs,
            duration: 1.0,
            preview_speed: 1.0,
            state: EngineState::Idle,
        }
    }

    pub fn specs(&self) -> &[AnimationSpec] {
        &self.specs
    }

    pub fn specs_mut(&mut self) -> &mut [AnimationSpec] {
        &mut self.specs
    }

    pub fn spec_mut(&mut self, param: ParamId) -> Option<&mut AnimationSpec> {
        self.specs.iter_mut().find(|s| s.param == param)
    }

    fn active(&self) -> impl Iterator<Item = &AnimationSpec> {
        self.specs.iter().filter(|s| s.enabled)
    }

    /// Seconds of video a recording covers.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_duration(&mut self, seconds: f64) {
        self.duration = if seconds.is_finite() {
            seconds.clamp(MIN_DURATION, MAX_DURATION)
        } else {
            MIN_DURATION
        };
    }

    pub fn preview_speed(&self) -> f64 {
        self.preview_speed
    }

    pub fn set_preview_speed(&mut self, speed: f64) {
        self.preview_speed = speed;
    }

    pub fn steps(&self) -> f64 {
        self.duration * EXPORT_FPS as f64
    }

    /// Frames a recording produces, including the start frame.
    pub fn frame_count(&self) -> usize {
        let steps = self.steps();
        let whole = steps.round();
        let steps = if (steps - whole).abs() < 1e-9 { whole } else { steps.ceil() };
        steps as usize + 1
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn set_previewing(&mut self, on: bool) {
        if self.state != EngineState::Recording {
            self.state = if on {
                EngineState::Previewing
            } else {
                EngineState::Idle
            };
        }
    }

    pub fn show_start(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        for spec in self.active() {
            store.set(spec.param, spec.start)?;
        }
        Ok(())
    }

    pub fn show_end(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        for spec in self.active() {
            store.set(spec.param, spec.end)?;
        }
        Ok(())
    }

    /// One recording step of every enabled parameter.
    pub fn step(&self, store: &mut ParameterStore) -> Result<(), ParamError> {
        let steps = self.steps();
        for spec in self.active() {
            spec.advance(store, steps)?;
        }
        Ok(())
    }

    /// Advances the preview by one tick. Returns whether anything moved.
    pub fn preview_tick(&self, store: &mut ParameterStore) -> Result<bool, ParamError> {
        if self.state != EngineState::Previewing || !(self.preview_speed > 0.0) {
            return Ok(false);
        }
        let steps = self.steps() / self.preview_speed;
        let mut moved = false;
        for spec in self.active() {
            spec.advance(store, steps)?;
            moved = true;
        }
        Ok(moved)
    }

    /// Deterministic recording: jump to start, capture, then step and capture
    /// `ceil(duration * 60)` more times. The token is polled after every frame
    /// and a cancelled run returns no frames.
    pub fn record<T>(
        &mut self,
        store: &mut ParameterStore,
        cancel: &dyn CancelToken,
        mut capture: impl FnMut(usize, &ParameterStore) -> Result<T, RecordError>,
    ) -> Result<Vec<T>, RecordError> {
        let previous = self.state;
        self.state = EngineState::Recording;
        let result = self.record_frames(store, cancel, &mut capture);
        self.state = match previous {
            EngineState::Recording => EngineState::Idle,
            other => other,
        };
        result
    }

    fn record_frames<T>(
        &self,
        store: &mut ParameterStore,
        cancel: &dyn CancelToken,
        capture: &mut impl FnMut(usize, &ParameterStore) -> Result<T, RecordError>,
    ) -> Result<Vec<T>, RecordError> {
        let total = self.frame_count();
        info!(frames = total, duration = self.duration, "recording animation");
        self.show_start(store)?;
        let mut frames = Vec::with_capacity(total);
        for index in 0..total {
            if index > 0 {
                self.step(store)?;
            }
            frames.push(capture(index, store)?);
            if cancel.is_cancelled() {
                debug!(frames = frames.len(), "recording cancelled");
                return Err(RecordError::Cancelled {
                    frames: frames.len(),
                });
            }
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "actual={} expected={}",
            actual,
            expected
        );
    }

    fn store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.register(ParamId::ArgC, 0.0).unwrap();
        store.register(ParamId::ZoomFactor, 1.0).unwrap();
        store.register(ParamId::AbsC, 0.7).unwrap();
        store
    }

    fn engine() -> AnimationEngine {
        AnimationEngine::new(vec![
            AnimationSpec::additive(ParamId::ArgC, 0.0, 3.0).enabled(true),
            AnimationSpec::multiplicative(ParamId::ZoomFactor, 1.0, 8.0).enabled(true),
            AnimationSpec::additive(ParamId::AbsC, 5.0, 9.0),
        ])
    }

    #[test]
    fn step_kinds() {
        assert_close(StepKind::Additive.speed(1.0, 3.0, 4.0), 0.5, 1e-12);
        assert_close(StepKind::Multiplicative.speed(1.0, 16.0, 4.0), 2.0, 1e-12);
        assert_eq!(StepKind::Multiplicative.speed(0.0, 16.0, 4.0), 1.0);
        assert_eq!(StepKind::Additive.speed(0.0, 1.0, 0.0), 0.0);

        let custom = StepKind::Custom {
            speed: |start, end, steps| (end - start) / steps / 2.0,
            step: |v, s| v - s,
        };
        assert_close(custom.step(1.0, custom.speed(0.0, 4.0, 2.0)), 0.0, 1e-12);
    }

    #[test]
    fn recording_produces_ceil_steps_plus_one_frames() {
        let mut store = store();
        let mut engine = engine();
        engine.set_duration(0.51);
        let frames = engine
            .record(&mut store, &NeverCancel, |i, s| {
                Ok((i, s.float(ParamId::ArgC)?))
            })
            .unwrap();
        assert_eq!(frames.len(), 32);
        assert_eq!(frames[0], (0, 0.0));
        assert!(frames.windows(2).all(|w| w[0].0 + 1 == w[1].0));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn recording_lands_on_end_values() {
        let mut store = store();
        let mut engine = engine();
        engine.set_duration(2.0);
        engine.record(&mut store, &NeverCancel, |_, _| Ok(())).unwrap();
        assert_close(store.float(ParamId::ArgC).unwrap(), 3.0, 1e-9);
        assert_close(store.float(ParamId::ZoomFactor).unwrap(), 8.0, 1e-9);
        // Disabled specs are never touched.
        assert_eq!(store.float(ParamId::AbsC).unwrap(), 0.7);
    }

    #[test]
    fn cancelled_recording_discards_frames() {
        let mut store = store();
        let mut engine = engine();
        let captured = AtomicUsize::new(0);
        let token = || captured.load(Ordering::Relaxed) >= 3;
        let err = engine
            .record(&mut store, &token, |_, _| {
                captured.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, RecordError::Cancelled { frames: 3 }));
    }

    #[test]
    fn capture_errors_abort_recording() {
        let mut store = store();
        let mut engine = engine();
        let err = engine
            .record(&mut store, &NeverCancel, |i, _| {
                if i == 2 {
                    Err(RecordError::capture("disk full"))
                } else {
                    Ok(i)
                }
            })
            .unwrap_err();
        assert!(matches!(err, RecordError::Capture(_)));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn preview_scales_with_speed() {
        let mut store = store();
        let mut engine = engine();
        engine.set_duration(1.0);
        assert!(!engine.preview_tick(&mut store).unwrap());

        engine.set_previewing(true);
        engine.set_preview_speed(2.0);
        assert!(engine.preview_tick(&mut store).unwrap());
        assert_close(store.float(ParamId::ArgC).unwrap(), 3.0 / 30.0, 1e-12);
        assert_close(
            store.float(ParamId::ZoomFactor).unwrap(),
            8f64.powf(1.0 / 30.0),
            1e-12,
        );
    }

    #[test]
    fn show_start_and_end_jump() {
        let mut store = store();
        let engine = engine();
        engine.show_end(&mut store).unwrap();
        assert_eq!(store.float(ParamId::ArgC).unwrap(), 3.0);
        engine.show_start(&mut store).unwrap();
        assert_eq!(store.float(ParamId::ZoomFactor).unwrap(), 1.0);
        assert_eq!(store.float(ParamId::AbsC).unwrap(), 0.7);
    }

    #[test]
    fn duration_is_clamped_to_one_frame() {
        let mut engine = engine();
        engine.set_duration(0.0);
        assert_eq!(engine.frame_count(), 2);
        engine.set_duration(f64::NAN);
        assert_eq!(engine.frame_count(), 2);
    }

    #[test]
    fn huge_durations_are_capped() {
        let mut engine = engine();
        engine.set_duration(1e20);
        assert_eq!(engine.duration(), MAX_DURATION);
        assert_eq!(engine.frame_count(), 60_000_001);
        engine.set_duration(f64::INFINITY);
        assert_eq!(engine.frame_count(), 2);
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!clone.is_cancelled());
    }
}
