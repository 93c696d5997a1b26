//! Crossfade timing across track boundaries.
//!
//! The scheduler decides *when* a fade starts and how far along it is; the
//! per-sample gain curves are rendered by the backend from the `GainRamp`s
//! scheduled here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::library::Track;

use super::backend::{AudioBackend, SourceId};

/// Shape of a gain ramp.
///
/// Both shapes are monotonic, and a fade-out and its complementary fade-in
/// are mirror images:
/// - Linear: gain moves at a constant rate; `out + in == 1`.
/// - EqualPower: power moves at a constant rate; `out² + in² == 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCurve {
    #[default]
    Linear,
    #[serde(alias = "equal_power", alias = "constant-power")]
    EqualPower,
}

impl FadeCurve {
    /// Gain at normalized position `t` (clamped to 0..=1) between `from` and `to`.
    pub fn interpolate(self, from: f32, to: f32, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => from + (to - from) * t,
            FadeCurve::EqualPower => {
                let p = from * from + (to * to - from * from) * t;
                p.max(0.0).sqrt()
            }
        }
    }

    pub fn fade_out(self, t: f32) -> f32 {
        self.interpolate(1.0, 0.0, t)
    }

    pub fn fade_in(self, t: f32) -> f32 {
        self.interpolate(0.0, 1.0, t)
    }
}

/// A gain change from `from` to `to` over `duration`, shaped by `curve`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    pub from: f32,
    pub to: f32,
    pub duration: Duration,
    pub curve: FadeCurve,
}

impl GainRamp {
    /// A ramp that is already at `gain`.
    pub fn immediate(gain: f32) -> Self {
        Self {
            from: gain,
            to: gain,
            duration: Duration::ZERO,
            curve: FadeCurve::Linear,
        }
    }

    pub fn gain_at(&self, elapsed: Duration) -> f32 {
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let t = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        self.curve.interpolate(self.from, self.to, t)
    }
}

/// One in-flight crossfade.
#[derive(Debug, Clone, PartialEq)]
pub struct Crossfade {
    pub from: Track,
    pub to: Track,
    pub outgoing: SourceId,
    pub incoming: SourceId,
    duration: f64,
    elapsed: f64,
    curve: FadeCurve,
}

impl Crossfade {
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// `(outgoing, incoming)` gains at `t` seconds into the fade.
    pub fn gains_at(&self, t: f64) -> (f32, f32) {
        if self.duration <= 0.0 {
            return (0.0, 1.0);
        }
        let p = (t / self.duration) as f32;
        (self.curve.fade_out(p), self.curve.fade_in(p))
    }

    pub fn gains(&self) -> (f32, f32) {
        self.gains_at(self.elapsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeProgress {
    Running { elapsed: f64 },
    /// The fade is over; `overshoot` is how far the clock ran past its end.
    Complete { overshoot: f64 },
}

/// Owns the crossfade settings and at most one active `Crossfade`.
#[derive(Debug, Clone, Default)]
pub struct CrossfadeScheduler {
    seconds: u32,
    curve: FadeCurve,
    active: Option<Crossfade>,
}

impl CrossfadeScheduler {
    pub fn new(seconds: u32, curve: FadeCurve) -> Self {
        Self {
            seconds,
            curve,
            active: None,
        }
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Takes effect from the next fade; an active fade keeps its timing.
    pub fn set_seconds(&mut self, seconds: u32) {
        self.seconds = seconds;
    }

    pub fn curve(&self) -> FadeCurve {
        self.curve
    }

    pub fn set_curve(&mut self, curve: FadeCurve) {
        self.curve = curve;
    }

    pub fn is_enabled(&self) -> bool {
        self.seconds > 0
    }

    pub fn active(&self) -> Option<&Crossfade> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Position in a track of `track_duration` seconds at which the fade to
    /// the next track must begin so it ends exactly at the track's end.
    pub fn window_start(&self, track_duration: f64) -> Option<f64> {
        if !self.is_enabled() || track_duration <= 0.0 {
            return None;
        }
        Some((track_duration - self.seconds as f64).max(0.0))
    }

    /// Start fading `outgoing` out and `incoming` in over `duration` seconds,
    /// `elapsed` seconds of which have already passed.
    #[allow(clippy::too_many_arguments)]
    pub fn begin<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        from: Track,
        to: Track,
        outgoing: SourceId,
        incoming: SourceId,
        duration: f64,
        elapsed: f64,
    ) {
        let fade = Crossfade {
            from,
            to,
            outgoing,
            incoming,
            duration,
            elapsed: elapsed.min(duration),
            curve: self.curve,
        };

        let (out_gain, in_gain) = fade.gains();
        let remaining = Duration::from_secs_f64((duration - fade.elapsed).max(0.0));

        backend.set_gain(incoming, in_gain);
        backend.play(incoming);
        backend.schedule_gain_ramp(
            outgoing,
            GainRamp {
                from: out_gain,
                to: 0.0,
                duration: remaining,
                curve: self.curve,
            },
        );
        backend.schedule_gain_ramp(
            incoming,
            GainRamp {
                from: in_gain,
                to: 1.0,
                duration: remaining,
                curve: self.curve,
            },
        );

        debug!(
            from = %fade.from.id,
            to = %fade.to.id,
            duration,
            elapsed = fade.elapsed,
            "crossfade started"
        );
        self.active = Some(fade);
    }

    /// Advance the active fade's clock. `None` when no fade is running.
    pub fn advance(&mut self, dt: f64) -> Option<FadeProgress> {
        let fade = self.active.as_mut()?;
        fade.elapsed += dt;
        if fade.elapsed >= fade.duration {
            Some(FadeProgress::Complete {
                overshoot: fade.elapsed - fade.duration,
            })
        } else {
            Some(FadeProgress::Running {
                elapsed: fade.elapsed,
            })
        }
    }

    /// Finish normally: the outgoing source is released and the incoming one
    /// sits at full gain.
    pub fn complete<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Option<Crossfade> {
        let fade = self.active.take()?;
        backend.release(fade.outgoing);
        backend.set_gain(fade.incoming, 1.0);
        Some(fade)
    }

    /// Cancel in favour of the incoming track: the outgoing source is dropped
    /// and the incoming one restarts from 0 at full gain.
    pub fn cancel<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Option<Crossfade> {
        let fade = self.active.take()?;
        backend.release(fade.outgoing);
        backend.seek(fade.incoming, Duration::ZERO);
        backend.set_gain(fade.incoming, 1.0);
        debug!(to = %fade.to.id, "crossfade cancelled");
        Some(fade)
    }

    /// Cancel in favour of the outgoing track, e.g. when the incoming one
    /// failed to load.
    pub fn abort<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Option<Crossfade> {
        let fade = self.active.take()?;
        backend.release(fade.incoming);
        backend.set_gain(fade.outgoing, 1.0);
        debug!(from = %fade.from.id, "crossfade aborted");
        Some(fade)
    }

    /// Forget the active fade without touching any source.
    pub fn take(&mut self) -> Option<Crossfade> {
        self.active.take()
    }
}
