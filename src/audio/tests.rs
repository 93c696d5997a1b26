use std::collections::HashSet;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rodio::Source;

use crate::library::{TICKS_PER_SECOND, Track, TrackId};

use super::crossfade::{CrossfadeScheduler, FadeCurve, FadeProgress, GainRamp};
use super::dsp::{BiquadCoeffs, EqualizerChain, LinearRamp};
use super::equalizer::*;
use super::mock::{Call, MockBackend};
use super::queue::{Queue, Removal};
use super::sink::{decode, local_path};
use super::types::{Direction, LoopMode};
use super::EngineError;

pub(crate) fn track(id: &str, seconds: u64) -> Track {
    Track {
        id: id.to_string(),
        duration_ticks: seconds * TICKS_PER_SECOND,
        stream_url: format!("/music/{id}.flac"),
        name: id.to_uppercase(),
        album: Some("Album".to_string()),
        artist: Some("Artist".to_string()),
    }
}

fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id, 200)).collect()
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

fn ids(set: &[&str]) -> HashSet<TrackId> {
    set.iter().map(|s| s.to_string()).collect()
}

fn current_id(q: &Queue) -> &str {
    q.current().map(|t| t.id.as_str()).unwrap_or("")
}

#[test]
fn set_queue_rejects_empty_list() {
    let err = Queue::new(Vec::new(), None, false, &mut rng()).unwrap_err();
    assert!(matches!(err, EngineError::EmptyQueue));
}

#[test]
fn set_queue_rejects_unknown_start() {
    let err = Queue::new(tracks(&["a", "b"]), Some("z"), false, &mut rng()).unwrap_err();
    assert!(matches!(err, EngineError::UnknownTrack(id) if id == "z"));
}

#[test]
fn set_queue_without_start_begins_at_first_track() {
    let q = Queue::new(tracks(&["a", "b", "c"]), None, false, &mut rng()).unwrap();
    assert_eq!(current_id(&q), "a");
    assert_eq!(q.cursor(), 0);
}

#[test]
fn shuffled_queue_starts_on_requested_track() {
    let ids_in = ["a", "b", "c", "d", "e", "f", "g", "h"];
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        for start in ids_in {
            let q = Queue::new(tracks(&ids_in), Some(start), true, &mut rng).unwrap();
            assert_eq!(current_id(&q), start);
            assert_eq!(q.cursor(), 0);
        }
    }
}

#[test]
fn shuffled_order_is_a_permutation() {
    let q = Queue::new(tracks(&["a", "b", "c", "d", "e"]), Some("c"), true, &mut rng()).unwrap();
    let mut seen: Vec<&str> = q.active_order().iter().map(|t| t.id.as_str()).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn next_visits_every_track_once_then_returns_none() {
    let list = tracks(&["a", "b", "c", "d"]);
    for shuffle in [false, true] {
        let mut q = Queue::new(list.clone(), Some("a"), shuffle, &mut rng()).unwrap();
        let mut visited = vec![current_id(&q).to_string()];
        for _ in 0..q.len() - 1 {
            let t = q.advance(Direction::Next, false).expect("successor");
            visited.push(t.id.clone());
        }
        assert!(q.advance(Direction::Next, false).is_none());

        visited.sort();
        assert_eq!(visited, vec!["a", "b", "c", "d"]);
    }
}

#[test]
fn next_wraps_only_with_repeat_all() {
    let mut q = Queue::new(tracks(&["a", "b"]), Some("b"), false, &mut rng()).unwrap();
    assert!(q.peek(Direction::Next, false).is_none());
    assert_eq!(q.advance(Direction::Next, true).unwrap().id, "a");
}

#[test]
fn previous_clamps_at_start_unless_repeat_all() {
    let mut q = Queue::new(tracks(&["a", "b", "c"]), None, false, &mut rng()).unwrap();
    assert_eq!(q.advance(Direction::Previous, false).unwrap().id, "a");
    assert_eq!(q.cursor(), 0);
    assert_eq!(q.advance(Direction::Previous, true).unwrap().id, "c");
}

#[test]
fn shuffle_round_trip_keeps_current_track() {
    let mut rng = rng();
    let mut q = Queue::new(tracks(&["a", "b", "c", "d", "e", "f"]), Some("d"), false, &mut rng)
        .unwrap();
    q.advance(Direction::Next, false);
    assert_eq!(current_id(&q), "e");

    q.set_shuffle(true, &mut rng);
    assert_eq!(current_id(&q), "e");
    assert!(q.is_shuffled());

    q.advance(Direction::Next, false);
    let moved_to = current_id(&q).to_string();

    q.set_shuffle(false, &mut rng);
    assert_eq!(current_id(&q), moved_to);
    let canonical = q.tracks().iter().position(|t| t.id == moved_to).unwrap();
    assert_eq!(q.cursor(), canonical);
}

#[test]
fn remove_non_current_keeps_cursor_on_track() {
    let mut q = Queue::new(tracks(&["a", "b", "c", "d"]), Some("c"), false, &mut rng()).unwrap();
    assert_eq!(q.remove_tracks(&ids(&["a"]), false), Removal::CurrentKept);
    assert_eq!(current_id(&q), "c");
    assert_eq!(q.len(), 3);
}

#[test]
fn remove_current_advances_like_next() {
    let mut q = Queue::new(tracks(&["a", "b", "c", "d"]), Some("b"), false, &mut rng()).unwrap();
    assert_eq!(q.remove_tracks(&ids(&["b", "c"]), false), Removal::Advanced);
    assert_eq!(current_id(&q), "d");
}

#[test]
fn remove_last_current_without_wrap_is_exhausted() {
    let mut q = Queue::new(tracks(&["a", "b", "c"]), Some("c"), false, &mut rng()).unwrap();
    assert_eq!(q.remove_tracks(&ids(&["c"]), false), Removal::Exhausted);

    let mut q = Queue::new(tracks(&["a", "b", "c"]), Some("c"), false, &mut rng()).unwrap();
    assert_eq!(q.remove_tracks(&ids(&["c"]), true), Removal::Advanced);
    assert_eq!(current_id(&q), "a");
}

#[test]
fn removing_everything_empties_the_queue() {
    let mut q = Queue::new(tracks(&["a", "b"]), None, true, &mut rng()).unwrap();
    assert_eq!(q.remove_tracks(&ids(&["a", "b"]), false), Removal::Emptied);
    assert!(q.is_empty());
    assert!(q.current().is_none());
}

#[test]
fn remove_keeps_relative_shuffle_order() {
    let mut q = Queue::new(tracks(&["a", "b", "c", "d", "e"]), Some("a"), true, &mut rng()).unwrap();
    let before: Vec<String> = q.active_order().iter().map(|t| t.id.clone()).collect();
    assert_eq!(q.remove_tracks(&ids(&["c"]), false), Removal::CurrentKept);
    let after: Vec<String> = q.active_order().iter().map(|t| t.id.clone()).collect();
    let expected: Vec<String> = before.into_iter().filter(|id| id != "c").collect();
    assert_eq!(after, expected);
}

#[test]
fn unknown_ids_do_not_touch_queue() {
    let mut q = Queue::new(tracks(&["a", "b"]), None, false, &mut rng()).unwrap();
    assert_eq!(q.remove_tracks(&ids(&["zz"]), false), Removal::NoMatch);
    assert_eq!(q.len(), 2);
}

#[test]
fn loop_mode_wraps_only_for_repeat_all() {
    assert!(LoopMode::LoopAll.wraps());
    assert!(!LoopMode::NoLoop.wraps());
    assert!(!LoopMode::LoopOne.wraps());
}

#[test]
fn default_equalizer_is_flat_disabled_nine_bands() {
    let config = EqualizerConfig::default();
    assert!(!config.enabled);
    assert_eq!(config.bands.len(), BAND_COUNT);
    assert!(config.is_flat());
    let freqs: Vec<f32> = config.bands.iter().map(|b| b.frequency).collect();
    assert_eq!(freqs, BAND_FREQUENCIES.to_vec());
}

#[test]
fn short_preset_sets_leading_bands_only() {
    let mut eq = Equalizer::default();
    eq.update_band(5, -3.0);
    eq.apply_preset(&[6.0, 4.0, 2.0]);

    let gains = eq.config().gains();
    assert_eq!(&gains[..3], &[6.0, 4.0, 2.0]);
    assert_eq!(gains[5], -3.0);
    for (i, g) in gains.iter().enumerate().skip(3) {
        if i != 5 {
            assert_eq!(*g, 0.0);
        }
    }
    assert!(eq.config().enabled);
}

#[test]
fn update_band_clamps_to_range() {
    let mut eq = Equalizer::default();
    assert!(eq.update_band(0, 50.0));
    assert!(eq.update_band(1, -50.0));
    assert_eq!(eq.config().bands[0].gain, 12.0);
    assert_eq!(eq.config().bands[1].gain, -12.0);
}

#[test]
fn update_band_touches_only_that_band() {
    let mut eq = Equalizer::default();
    eq.update_band(4, 3.5);
    let gains = eq.config().gains();
    assert_eq!(gains.iter().filter(|g| **g != 0.0).count(), 1);
    assert_eq!(gains[4], 3.5);
}

#[test]
fn unknown_band_is_ignored() {
    let mut eq = Equalizer::default();
    assert!(!eq.update_band(BAND_COUNT, 3.0));
    assert!(eq.config().is_flat());
}

#[test]
fn disabling_keeps_gains() {
    let mut eq = Equalizer::default();
    eq.apply_preset(&[3.0; BAND_COUNT]);
    eq.set_enabled(false);
    assert_eq!(eq.config().gains(), vec![3.0; BAND_COUNT]);
    eq.set_enabled(true);
    assert_eq!(eq.config().gains(), vec![3.0; BAND_COUNT]);
}

#[test]
fn named_presets_have_nine_in_range_gains() {
    for preset in PRESETS {
        assert_eq!(preset.gains.len(), BAND_COUNT, "{}", preset.name);
        assert!(
            preset
                .gains
                .iter()
                .all(|g| (MIN_GAIN_DB..=MAX_GAIN_DB).contains(g))
        );
    }
    let mut eq = Equalizer::default();
    assert!(eq.apply_named_preset("Bass-Boost"));
    assert_eq!(eq.config().bands[0].gain, 6.0);
    assert!(!eq.apply_named_preset("nope"));
}

#[test]
fn nan_gain_is_flat() {
    assert_eq!(clamp_gain(f32::NAN), 0.0);
}

#[test]
fn linear_crossfade_gains_sum_to_one() {
    for i in 0..=100 {
        let t = i as f32 / 100.0;
        let sum = FadeCurve::Linear.fade_out(t) + FadeCurve::Linear.fade_in(t);
        assert!((sum - 1.0).abs() < 1e-6, "t={t} sum={sum}");
    }
}

#[test]
fn equal_power_crossfade_keeps_power_constant() {
    for i in 0..=100 {
        let t = i as f32 / 100.0;
        let out = FadeCurve::EqualPower.fade_out(t);
        let inc = FadeCurve::EqualPower.fade_in(t);
        assert!((out * out + inc * inc - 1.0).abs() < 1e-5);
    }
}

#[test]
fn curves_are_monotonic_and_symmetric() {
    for curve in [FadeCurve::Linear, FadeCurve::EqualPower] {
        let mut last = curve.fade_in(0.0);
        for i in 1..=50 {
            let t = i as f32 / 50.0;
            let g = curve.fade_in(t);
            assert!(g >= last);
            last = g;
            assert!((curve.fade_out(t) - curve.fade_in(1.0 - t)).abs() < 1e-5);
        }
        assert_eq!(curve.fade_in(0.0), 0.0);
        assert_eq!(curve.fade_in(1.0), 1.0);
    }
}

#[test]
fn gain_ramp_reaches_target() {
    let ramp = GainRamp {
        from: 1.0,
        to: 0.0,
        duration: Duration::from_secs(2),
        curve: FadeCurve::Linear,
    };
    assert_eq!(ramp.gain_at(Duration::ZERO), 1.0);
    assert!((ramp.gain_at(Duration::from_secs(1)) - 0.5).abs() < 1e-6);
    assert_eq!(ramp.gain_at(Duration::from_secs(5)), 0.0);
    assert_eq!(GainRamp::immediate(0.3).gain_at(Duration::ZERO), 0.3);
}

#[test]
fn window_starts_crossfade_seconds_before_end() {
    let s = CrossfadeScheduler::new(5, FadeCurve::Linear);
    assert_eq!(s.window_start(180.0), Some(175.0));
    assert_eq!(s.window_start(3.0), Some(0.0));
    assert_eq!(s.window_start(0.0), None);
    assert_eq!(CrossfadeScheduler::new(0, FadeCurve::Linear).window_start(180.0), None);
}

#[test]
fn scheduler_ramps_both_sources_and_completes() {
    let mut backend = MockBackend::new();
    let mut s = CrossfadeScheduler::new(4, FadeCurve::Linear);
    s.begin(&mut backend, track("a", 100), track("b", 100), 1, 2, 4.0, 0.0);

    assert!(backend.calls.contains(&Call::SetGain(2, 0.0)));
    assert!(backend.calls.contains(&Call::Play(2)));
    assert!(backend.calls.iter().any(|c| matches!(
        c,
        Call::Ramp(1, r) if r.from == 1.0 && r.to == 0.0 && r.duration == Duration::from_secs(4)
    )));
    assert!(backend.calls.iter().any(|c| matches!(
        c,
        Call::Ramp(2, r) if r.from == 0.0 && r.to == 1.0
    )));

    let (out, inc) = s.active().unwrap().gains_at(1.0);
    assert!((out + inc - 1.0).abs() < 1e-6);

    assert_eq!(s.advance(3.0), Some(FadeProgress::Running { elapsed: 3.0 }));
    assert_eq!(s.advance(1.5), Some(FadeProgress::Complete { overshoot: 0.5 }));
    let fade = s.complete(&mut backend).unwrap();
    assert_eq!(fade.to.id, "b");
    assert!(backend.calls.contains(&Call::Release(1)));
    assert!(!s.is_active());
    assert_eq!(s.advance(1.0), None);
}

#[test]
fn cancel_snaps_incoming_to_start_at_full_gain() {
    let mut backend = MockBackend::new();
    let mut s = CrossfadeScheduler::new(4, FadeCurve::EqualPower);
    s.begin(&mut backend, track("a", 100), track("b", 100), 1, 2, 4.0, 1.0);
    s.cancel(&mut backend);

    let tail = &backend.calls[backend.calls.len() - 3..];
    assert_eq!(
        tail,
        &[
            Call::Release(1),
            Call::Seek(2, Duration::ZERO),
            Call::SetGain(2, 1.0)
        ]
    );
}

#[test]
fn linear_ramp_reaches_target_in_steps() {
    let mut r = LinearRamp::new(0.0);
    r.set_target(1.0, 4);
    assert!(!r.is_settled());
    assert!((r.advance(2) - 0.5).abs() < 1e-6);
    assert_eq!(r.advance(10), 1.0);
    assert!(r.is_settled());
}

fn sine(freq: f32, sample_rate: f32, n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn run_mono(chain: &mut EqualizerChain, input: &[f32]) -> Vec<f32> {
    input
        .iter()
        .map(|&s| {
            let mut frame = [s];
            chain.process_frame(&mut frame);
            frame[0]
        })
        .collect()
}

#[test]
fn disabled_chain_passes_signal_through() {
    let config = EqualizerConfig::from_gains(false, &[12.0; BAND_COUNT]);
    let mut chain = EqualizerChain::new(48_000, 1, &config);
    let input = sine(1_000.0, 48_000.0, 2_048);
    assert_eq!(run_mono(&mut chain, &input), input);
    assert!(chain.is_bypassed());
}

#[test]
fn boosted_band_raises_level_at_its_frequency() {
    let mut gains = [0.0; BAND_COUNT];
    gains[4] = 12.0;
    let config = EqualizerConfig::from_gains(true, &gains);
    let mut chain = EqualizerChain::new(48_000, 1, &config);
    let input = sine(1_000.0, 48_000.0, 48_000);
    let output = run_mono(&mut chain, &input);
    // Skip the filter's settling time.
    let ratio = rms(&output[24_000..]) / rms(&input[24_000..]);
    assert!(ratio > 3.0, "ratio {ratio}");
}

#[test]
fn enabling_ramps_in_without_a_step() {
    let off = EqualizerConfig::from_gains(false, &[12.0; BAND_COUNT]);
    let mut chain = EqualizerChain::new(48_000, 1, &off);
    let input = vec![0.5; 4_800];
    run_mono(&mut chain, &input[..100]);

    let mut on = off.clone();
    on.enabled = true;
    chain.set_target(&on);
    let output = run_mono(&mut chain, &input[100..]);
    // The first sample after enabling is still essentially dry.
    assert!((output[0] - 0.5).abs() < 0.05);
}

#[test]
fn flat_band_coefficients_are_passthrough() {
    assert_eq!(BiquadCoeffs::for_band(3, 0.0, 44_100.0), BiquadCoeffs::passthrough());
    assert_ne!(BiquadCoeffs::for_band(3, 6.0, 44_100.0), BiquadCoeffs::passthrough());
}

/// One second of 8 kHz mono 16-bit PCM silence as a WAV file.
fn silent_wav() -> Vec<u8> {
    let samples = 8_000u32;
    let data_len = samples * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&8_000u32.to_le_bytes());
    wav.extend_from_slice(&16_000u32.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

#[test]
fn file_scheme_is_stripped_from_local_urls() {
    assert_eq!(local_path("file:///music/a.flac"), "/music/a.flac");
    assert_eq!(local_path("/music/a.flac"), "/music/a.flac");
    assert_eq!(local_path("music/a.flac"), "music/a.flac");
}

#[test]
fn file_urls_decode_like_plain_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    std::fs::write(&path, silent_wav()).unwrap();
    let client = reqwest::blocking::Client::new();

    let source = decode(&client, &format!("file://{}", path.display())).unwrap();
    assert_eq!(source.channels(), 1);
    assert_eq!(source.sample_rate(), 8_000);
    assert!(decode(&client, &path.display().to_string()).is_ok());

    let missing = format!("file://{}", dir.path().join("gone.wav").display());
    assert!(decode(&client, &missing).is_err());
}
