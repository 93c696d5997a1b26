//! Equalizer signal chain: nine biquads in series with click-free parameter changes.
//!
//! Band gains glide in dB towards their targets over `GAIN_RAMP`, and enabling
//! or bypassing crossfades between the dry and filtered signal over the same
//! time. Coefficients are recomputed once per `BLOCK_FRAMES` while a glide is
//! in progress.

use super::equalizer::{BAND_COUNT, BAND_FREQUENCIES, EqualizerConfig, GAIN_RAMP};

/// Q of the seven peaking bands. One octave spacing.
const PEAK_Q: f32 = 1.41;

/// Shelf slope for the outer bands.
const SHELF_SLOPE: f32 = 0.9;

const BLOCK_FRAMES: u32 = 32;

/// Biquad filter coefficients (RBJ cookbook), normalized by a0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    fn shelf_alpha(a: f32, sin_w0: f32) -> f32 {
        sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt()
    }

    pub(crate) fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = Self::shelf_alpha(a, w0.sin());

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    pub(crate) fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    pub(crate) fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = Self::shelf_alpha(a, w0.sin());

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    pub(crate) fn passthrough() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Coefficients for band `id` at `gain_db`. Flat bands pass through.
    pub(crate) fn for_band(id: usize, gain_db: f32, sample_rate: f32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::passthrough();
        }
        // Keep the top band below Nyquist at low sample rates.
        let freq = BAND_FREQUENCIES[id].min(sample_rate * 0.45);
        match id {
            0 => Self::low_shelf(freq, gain_db, sample_rate),
            id if id == BAND_COUNT - 1 => Self::high_shelf(freq, gain_db, sample_rate),
            _ => Self::peaking(freq, gain_db, PEAK_Q, sample_rate),
        }
    }
}

/// Direct form I history for one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    fn process(&mut self, input: f32, c: &BiquadCoeffs) -> f32 {
        let out = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }
}

/// A value gliding linearly towards a target over a fixed number of steps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl LinearRamp {
    pub(crate) fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    pub(crate) fn set_target(&mut self, target: f32, steps: u32) {
        if target == self.target {
            return;
        }
        self.target = target;
        if steps == 0 {
            self.current = target;
            self.remaining = 0;
            return;
        }
        self.step = (target - self.current) / steps as f32;
        self.remaining = steps;
    }

    /// Move `steps` steps along and return the new value.
    pub(crate) fn advance(&mut self, steps: u32) -> f32 {
        if steps >= self.remaining {
            self.current = self.target;
            self.remaining = 0;
        } else {
            self.current += self.step * steps as f32;
            self.remaining -= steps;
        }
        self.current
    }

    pub(crate) fn value(&self) -> f32 {
        self.current
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

struct Band {
    gain: LinearRamp,
    coeffs: BiquadCoeffs,
    state: Vec<BiquadState>,
}

/// The per-stream equalizer processor.
pub struct EqualizerChain {
    sample_rate: f32,
    bands: Vec<Band>,
    /// 0.0 = dry, 1.0 = fully filtered.
    mix: LinearRamp,
    ramp_frames: u32,
    block_pos: u32,
}

impl EqualizerChain {
    pub fn new(sample_rate: u32, channels: u16, config: &EqualizerConfig) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let channels = usize::from(channels.max(1));
        let gains = config.gains();
        let bands = (0..BAND_COUNT)
            .map(|id| {
                let gain = gains.get(id).copied().unwrap_or(0.0);
                Band {
                    gain: LinearRamp::new(gain),
                    coeffs: BiquadCoeffs::for_band(id, gain, sample_rate),
                    state: vec![BiquadState::default(); channels],
                }
            })
            .collect();
        let ramp_frames = (GAIN_RAMP.as_secs_f32() * sample_rate).round() as u32;

        Self {
            sample_rate,
            bands,
            mix: LinearRamp::new(if config.enabled { 1.0 } else { 0.0 }),
            ramp_frames,
            block_pos: 0,
        }
    }

    /// Glide towards `config` over `GAIN_RAMP`.
    pub fn set_target(&mut self, config: &EqualizerConfig) {
        let gains = config.gains();
        for (band, gain) in self.bands.iter_mut().zip(gains) {
            band.gain.set_target(gain, self.ramp_frames);
        }
        self.mix
            .set_target(if config.enabled { 1.0 } else { 0.0 }, self.ramp_frames);
    }

    /// True when bypassed and no glide is pending.
    pub fn is_bypassed(&self) -> bool {
        self.mix.is_settled() && self.mix.value() == 0.0
    }

    fn update_block(&mut self) {
        let frames = BLOCK_FRAMES.min(self.ramp_frames.max(1));
        for (id, band) in self.bands.iter_mut().enumerate() {
            if band.gain.is_settled() {
                continue;
            }
            let gain = band.gain.advance(frames);
            band.coeffs = BiquadCoeffs::for_band(id, gain, self.sample_rate);
        }
    }

    /// Filter one interleaved frame in place.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        if self.block_pos == 0 {
            self.update_block();
        }
        self.block_pos = (self.block_pos + 1) % BLOCK_FRAMES;

        let mix = self.mix.advance(1);
        if mix == 0.0 && self.mix.is_settled() {
            // Start from silence next time the filters come back in.
            for band in &mut self.bands {
                band.state.fill(BiquadState::default());
            }
            return;
        }

        for (ch, sample) in frame.iter_mut().enumerate() {
            let dry = *sample;
            let mut wet = dry;
            for band in &mut self.bands {
                if let Some(state) = band.state.get_mut(ch) {
                    wet = state.process(wet, &band.coeffs);
                }
            }
            *sample = dry + (wet - dry) * mix;
        }
    }
}
