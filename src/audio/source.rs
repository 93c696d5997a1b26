//! `rodio::Source` adapters that render engine-side parameters per sample.
//!
//! The engine thread never touches samples. It publishes a new `GainRamp` or
//! `EqualizerConfig` and bumps a version counter; the adapters notice the bump
//! on the mixer thread and pick the new value up with a `try_lock`, so a busy
//! lock only delays the change by a frame.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rodio::source::SeekError;
use rodio::{ChannelCount, SampleRate, Source};

use super::crossfade::GainRamp;
use super::dsp::EqualizerChain;
use super::equalizer::EqualizerConfig;

/// Per-source gain shared between the backend and a `Ramped` source.
#[derive(Debug)]
pub(super) struct GainControl {
    version: AtomicU64,
    ramp: Mutex<GainRamp>,
}

impl GainControl {
    pub(super) fn new(gain: f32) -> Self {
        Self {
            version: AtomicU64::new(0),
            ramp: Mutex::new(GainRamp::immediate(gain)),
        }
    }

    pub(super) fn schedule(&self, ramp: GainRamp) {
        if let Ok(mut slot) = self.ramp.lock() {
            *slot = ramp;
        }
        self.version.fetch_add(1, Ordering::Release);
    }
}

/// Equalizer parameters shared by every stream the backend creates.
#[derive(Debug, Default)]
pub(super) struct EqualizerShared {
    version: AtomicU64,
    config: Mutex<EqualizerConfig>,
}

impl EqualizerShared {
    pub(super) fn new(config: EqualizerConfig) -> Self {
        Self {
            version: AtomicU64::new(0),
            config: Mutex::new(config),
        }
    }

    pub(super) fn update(&self, config: &EqualizerConfig) {
        if let Ok(mut slot) = self.config.lock() {
            *slot = config.clone();
        }
        self.version.fetch_add(1, Ordering::Release);
    }

    pub(super) fn snapshot(&self) -> EqualizerConfig {
        self.config
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

/// Applies a `GainControl`'s ramp sample by sample.
pub(super) struct Ramped<S> {
    inner: S,
    control: Arc<GainControl>,
    seen: u64,
    ramp: GainRamp,
    /// Frames rendered since `ramp` was picked up.
    frames: u64,
    sample_in_frame: u16,
}

impl<S: Source> Ramped<S> {
    pub(super) fn new(inner: S, control: Arc<GainControl>) -> Self {
        let ramp = control
            .ramp
            .lock()
            .map(|r| *r)
            .unwrap_or(GainRamp::immediate(1.0));
        let seen = control.version.load(Ordering::Acquire);
        Self {
            inner,
            control,
            seen,
            ramp,
            frames: 0,
            sample_in_frame: 0,
        }
    }

    fn refresh(&mut self) {
        let version = self.control.version.load(Ordering::Acquire);
        if version == self.seen {
            return;
        }
        if let Ok(ramp) = self.control.ramp.try_lock() {
            self.ramp = *ramp;
            self.seen = version;
            self.frames = 0;
        }
    }

    fn gain(&self) -> f32 {
        let rate = self.inner.sample_rate().max(1) as f64;
        self.ramp
            .gain_at(Duration::from_secs_f64(self.frames as f64 / rate))
    }
}

impl<S: Source> Iterator for Ramped<S> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.sample_in_frame == 0 {
            self.refresh();
        }
        let sample = self.inner.next()?;
        let out = sample * self.gain();

        self.sample_in_frame += 1;
        if self.sample_in_frame >= self.inner.channels().max(1) {
            self.sample_in_frame = 0;
            self.frames += 1;
        }
        Some(out)
    }
}

impl<S: Source> Source for Ramped<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> ChannelCount {
        self.inner.channels()
    }

    fn sample_rate(&self) -> SampleRate {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.sample_in_frame = 0;
        self.inner.try_seek(pos)
    }
}

/// Runs every frame through an `EqualizerChain`.
pub(super) struct Equalized<S> {
    inner: S,
    shared: Arc<EqualizerShared>,
    seen: u64,
    chain: EqualizerChain,
    format: (ChannelCount, SampleRate),
    frame: Vec<f32>,
    pos: usize,
}

impl<S: Source> Equalized<S> {
    pub(super) fn new(inner: S, shared: Arc<EqualizerShared>) -> Self {
        let format = (inner.channels(), inner.sample_rate());
        let seen = shared.version.load(Ordering::Acquire);
        let chain = EqualizerChain::new(format.1, format.0, &shared.snapshot());
        Self {
            inner,
            shared,
            seen,
            chain,
            format,
            frame: Vec::with_capacity(usize::from(format.0)),
            pos: 0,
        }
    }

    fn refresh(&mut self) {
        let format = (self.inner.channels(), self.inner.sample_rate());
        if format != self.format {
            self.format = format;
            self.chain = EqualizerChain::new(format.1, format.0, &self.shared.snapshot());
            self.seen = self.shared.version.load(Ordering::Acquire);
            return;
        }
        let version = self.shared.version.load(Ordering::Acquire);
        if version == self.seen {
            return;
        }
        if let Ok(config) = self.shared.config.try_lock() {
            self.chain.set_target(&config);
            self.seen = version;
        }
    }

    fn fill_frame(&mut self) -> bool {
        self.refresh();
        self.frame.clear();
        self.pos = 0;
        let channels = usize::from(self.format.0.max(1));
        while self.frame.len() < channels {
            match self.inner.next() {
                Some(sample) => self.frame.push(sample),
                None => break,
            }
        }
        if self.frame.is_empty() {
            return false;
        }
        if self.frame.len() == channels {
            self.chain.process_frame(&mut self.frame);
        }
        true
    }
}

impl<S: Source> Iterator for Equalized<S> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.frame.len() && !self.fill_frame() {
            return None;
        }
        let sample = self.frame[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl<S: Source> Source for Equalized<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.inner
            .current_span_len()
            .map(|len| len + (self.frame.len() - self.pos))
    }

    fn channels(&self) -> ChannelCount {
        self.format.0
    }

    fn sample_rate(&self) -> SampleRate {
        self.format.1
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.frame.clear();
        self.pos = 0;
        self.inner.try_seek(pos)
    }
}
