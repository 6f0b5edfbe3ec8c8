use crate::error::SynthError;
use crate::{AMPLITUDE, CHANNELS, DEFAULT_MAX_SIGNAL_DURATION_MS, DEFAULT_MIN_BUFFER_BYTES, SAMPLE_RATE};
use byteorder::{LittleEndian, WriteBytesExt};
use dashmap::DashMap;
use std::f64::consts::PI;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<i16>();
/// Interleaved samples per second across both channels.
const SAMPLES_PER_SECOND: f64 = SAMPLE_RATE as f64 * CHANNELS as f64;
/// The segment cache is flushed once it holds this many entries.
pub const MAX_CACHED_SEGMENTS: usize = 1024;

/// Interleaved 16-bit stereo PCM ready for an audio sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
    pattern_us: Vec<u32>,
}

impl PcmBuffer {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Pattern the buffer was generated from, after buffer-size correction.
    pub fn pattern_us(&self) -> &[u32] {
        &self.pattern_us
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn channels(&self) -> u16 {
        CHANNELS
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / CHANNELS as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / SAMPLE_RATE as f64)
    }

    /// Writes the samples as interleaved little-endian s16.
    pub fn write_le<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for &sample in &self.samples {
            writer.write_i16::<LittleEndian>(sample)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SegmentKey {
    Tone { duration_bits: u64, frequency_hz: u32 },
    Silence { duration_bits: u64 },
}

/// Interleaved sample count for `duration_s`, rounded down to whole frames.
pub fn segment_sample_count(duration_s: f64) -> usize {
    ((SAMPLES_PER_SECOND * duration_s) as usize) & !1
}

fn interval_seconds(interval_us: u32) -> f64 {
    interval_us as f64 / 1_000_000.0
}

/// Turns `(frequency, pattern)` pairs into stereo tone bursts for a passive IR LED
/// wired across both channels of an audio jack.
pub struct PulseSynthesizer {
    min_buffer_bytes: usize,
    max_duration: Duration,
    segments: DashMap<SegmentKey, Arc<[i16]>>,
}

impl PulseSynthesizer {
    pub fn new(min_buffer_bytes: usize) -> Self {
        Self {
            min_buffer_bytes,
            max_duration: Duration::from_millis(DEFAULT_MAX_SIGNAL_DURATION_MS),
            segments: DashMap::new(),
        }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn min_buffer_bytes(&self) -> usize {
        self.min_buffer_bytes
    }

    pub fn cached_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn generate_tone(&self, frequency_hz: u32, duration_s: f64) -> Arc<[i16]> {
        let key = SegmentKey::Tone {
            duration_bits: duration_s.to_bits(),
            frequency_hz,
        };
        self.segments
            .entry(key)
            .or_insert_with(|| {
                let count = segment_sample_count(duration_s);
                let samples_per_cycle = SAMPLE_RATE as f64 / frequency_hz as f64;
                let mut samples = Vec::with_capacity(count);

                for i in (0..count).step_by(2) {
                    let sample = ((PI * i as f64 / samples_per_cycle).sin() * AMPLITUDE as f64) as i16;
                    samples.push(sample);
                    samples.push(-sample);
                }

                samples.into()
            })
            .clone()
    }

    pub fn generate_silence(&self, duration_s: f64) -> Arc<[i16]> {
        let key = SegmentKey::Silence {
            duration_bits: duration_s.to_bits(),
        };
        self.segments
            .entry(key)
            .or_insert_with(|| vec![0i16; segment_sample_count(duration_s)].into())
            .clone()
    }

    /// Builds the PCM buffer for a pulse pattern given in microseconds.
    ///
    /// If the result would be smaller than the device minimum, the trailing
    /// silence is lengthened to make up the difference. A pattern ending in a
    /// burst gets a new silence interval instead, so no burst ever grows.
    pub fn synthesize(&self, frequency_hz: u32, pattern_us: &[u32]) -> Result<PcmBuffer, SynthError> {
        if pattern_us.is_empty() {
            return Err(SynthError::EmptyPattern);
        }
        if frequency_hz == 0 {
            return Err(SynthError::InvalidFrequency(frequency_hz));
        }

        let total_us: u64 = pattern_us.iter().map(|&v| v as u64).sum();
        let duration = Duration::from_micros(total_us);
        if duration > self.max_duration {
            log::warn!(
                "synthesize: signal lasts {:?}, over the {:?} limit; skipping",
                duration,
                self.max_duration
            );
            return Err(SynthError::SignalTooLong {
                duration_ms: duration.as_millis() as u64,
                limit_ms: self.max_duration.as_millis() as u64,
            });
        }

        let mut pattern = pattern_us.to_vec();
        let mut count = (SAMPLES_PER_SECOND * duration.as_secs_f64()) as usize;
        let buffer_bytes = count * BYTES_PER_SAMPLE;

        if buffer_bytes < self.min_buffer_bytes {
            let shortfall = (self.min_buffer_bytes - buffer_bytes).div_ceil(BYTES_PER_SAMPLE);
            let extra_us = (shortfall as f64 * 1_000_000.0 / SAMPLES_PER_SECOND).ceil() as u32;
            count += shortfall;
            if pattern.len() % 2 == 1 {
                pattern.push(extra_us);
            } else if let Some(last) = pattern.last_mut() {
                *last = last.saturating_add(extra_us);
            }
            log::warn!(
                "synthesize: buffer {} bytes below device minimum {}; trailing silence +{} us, {} samples",
                buffer_bytes,
                self.min_buffer_bytes,
                extra_us,
                count
            );
        }

        // whole stereo frames only
        count += count & 1;

        if self.segments.len() >= MAX_CACHED_SEGMENTS {
            log::debug!("synthesize: flushing {} cached segments", self.segments.len());
            self.segments.clear();
        }

        let mut samples = Vec::with_capacity(count);
        for (i, &interval) in pattern.iter().enumerate() {
            let segment = if i % 2 == 0 {
                self.generate_tone(frequency_hz, interval_seconds(interval))
            } else {
                self.generate_silence(interval_seconds(interval))
            };
            samples.extend_from_slice(&segment);
        }
        if samples.len() < count {
            samples.resize(count, 0);
        }

        log::debug!(
            "synthesize: {} Hz, {} intervals, {} samples",
            frequency_hz,
            pattern.len(),
            samples.len()
        );

        Ok(PcmBuffer {
            samples,
            pattern_us: pattern,
        })
    }
}

impl Default for PulseSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BUFFER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HEX_PATTERN: [u32; 16] = [96, 64, 64, 32, 32, 64, 32, 64, 32, 64, 32, 64, 32, 32, 32, 3450];

    #[test]
    fn test_segment_sample_count_is_frame_aligned() {
        assert_eq!(segment_sample_count(0.001), 88);
        assert_eq!(segment_sample_count(0.000563), 48);
        assert_eq!(segment_sample_count(0.0), 0);
    }

    #[test]
    fn test_tone_is_differential() {
        let synth = PulseSynthesizer::new(0);
        let tone = synth.generate_tone(38_000, 0.001);
        assert_eq!(tone.len(), 88);
        assert_eq!(tone[0], 0);
        for frame in tone.chunks(2) {
            assert_eq!(frame[0], -frame[1]);
        }
        assert!(tone.iter().any(|&s| s != 0));
        assert!(tone.iter().all(|&s| s.unsigned_abs() <= AMPLITUDE as u16));
    }

    #[test]
    fn test_bursts_and_silence_alternate() {
        let synth = PulseSynthesizer::new(0);
        let pcm = synth.synthesize(38_000, &[1_000, 1_000]).unwrap();
        assert_eq!(pcm.samples().len(), 176);
        assert!(pcm.samples()[..88].iter().any(|&s| s != 0));
        assert!(pcm.samples()[88..].iter().all(|&s| s == 0));
        assert_eq!(pcm.pattern_us(), &[1_000, 1_000]);
    }

    #[test]
    fn test_short_signal_is_padded_at_the_end() {
        let synth = PulseSynthesizer::new(DEFAULT_MIN_BUFFER_BYTES);
        let pcm = synth.synthesize(38_028, &HEX_PATTERN).unwrap();

        assert!(pcm.byte_len() >= DEFAULT_MIN_BUFFER_BYTES);
        let (head, tail) = pcm.pattern_us().split_at(HEX_PATTERN.len() - 1);
        assert_eq!(head, &HEX_PATTERN[..HEX_PATTERN.len() - 1]);
        assert!(tail[0] > HEX_PATTERN[HEX_PATTERN.len() - 1]);
    }

    #[test]
    fn test_padding_never_lengthens_a_burst() {
        let synth = PulseSynthesizer::new(3_530);
        let pcm = synth.synthesize(38_000, &[96, 64, 64]).unwrap();

        assert_eq!(pcm.pattern_us(), &[96, 64, 64, 19_796]);
        assert!(pcm.byte_len() >= 3_530);
        // tone 96 us = 8 samples, silence 64 us = 4, tone 64 us = 4
        assert!(pcm.samples()[8..12].iter().all(|&s| s == 0));
        assert!(pcm.samples()[16..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_sample_count_is_whole_frames() {
        let synth = PulseSynthesizer::new(0);
        assert_eq!(synth.synthesize(38_000, &[20]).unwrap().samples().len(), 2);

        let nec = crate::codec::decode_nec("0xF708FB04").unwrap();
        let pcm = PulseSynthesizer::default()
            .synthesize(38_000, nec.pulse_pattern_us())
            .unwrap();
        assert_eq!(pcm.samples().len() % 2, 0);
        assert_eq!(pcm.frame_count() * 2, pcm.samples().len());
    }

    #[test]
    fn test_segment_cache_is_bounded() {
        let synth = PulseSynthesizer::new(0);
        for interval in 1..=(MAX_CACHED_SEGMENTS as u32 + 100) {
            synth.synthesize(38_000, &[interval]).unwrap();
            assert!(synth.cached_segments() <= MAX_CACHED_SEGMENTS);
        }
        assert!(synth.cached_segments() < MAX_CACHED_SEGMENTS);
    }

    #[test]
    fn test_concurrent_synthesis_shares_the_cache() {
        let synth = PulseSynthesizer::default();
        let expected = PulseSynthesizer::default().synthesize(38_028, &HEX_PATTERN).unwrap();

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| synth.synthesize(38_028, &HEX_PATTERN).unwrap()))
                .collect();
            for worker in workers {
                assert_eq!(worker.join().unwrap(), expected);
            }
        });
        assert!(synth.cached_segments() > 0);
    }

    #[test]
    fn test_long_signal_is_rejected() {
        let synth = PulseSynthesizer::new(0);
        let err = synth.synthesize(38_000, &[1_500_000, 600_000]).unwrap_err();
        assert_eq!(
            err,
            SynthError::SignalTooLong {
                duration_ms: 2_100,
                limit_ms: 2_000
            }
        );
        assert_eq!(synth.cached_segments(), 0);
    }

    #[test]
    fn test_degenerate_input() {
        let synth = PulseSynthesizer::default();
        assert_eq!(synth.synthesize(38_000, &[]), Err(SynthError::EmptyPattern));
        assert_eq!(synth.synthesize(0, &[100]), Err(SynthError::InvalidFrequency(0)));
    }

    #[test]
    fn test_segments_are_cached() {
        let synth = PulseSynthesizer::new(0);
        synth.synthesize(38_000, &[563, 563, 563, 1_688]).unwrap();
        // tone 563, silence 563, silence 1688
        assert_eq!(synth.cached_segments(), 3);
    }

    #[test]
    fn test_write_le() {
        let synth = PulseSynthesizer::new(0);
        let pcm = synth.synthesize(38_000, &[100]).unwrap();
        let mut out = Vec::new();
        pcm.write_le(&mut out).unwrap();
        assert_eq!(out.len(), pcm.byte_len());
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), pcm.samples()[1]);
    }

    proptest! {
        #[test]
        fn prop_synthesis_is_deterministic(
            frequency in 30_000u32..=60_000,
            pattern in proptest::collection::vec(1u32..5_000, 1..40),
        ) {
            let synth = PulseSynthesizer::default();
            let first = synth.synthesize(frequency, &pattern).unwrap();
            let second = synth.synthesize(frequency, &pattern).unwrap();
            prop_assert_eq!(first, second);

            let fresh = PulseSynthesizer::default().synthesize(frequency, &pattern).unwrap();
            let again = synth.synthesize(frequency, &pattern).unwrap();
            prop_assert_eq!(fresh.samples(), again.samples());
        }

        #[test]
        fn prop_buffer_correction_only_extends_trailing_silence(
            min_buffer in 0usize..20_000,
            pattern in proptest::collection::vec(1u32..2_000, 1..20),
        ) {
            let synth = PulseSynthesizer::new(min_buffer);
            let pcm = synth.synthesize(38_000, &pattern).unwrap();
            let corrected = pcm.pattern_us();

            prop_assert!(pcm.byte_len() >= min_buffer);
            prop_assert_eq!(pcm.samples().len() % 2, 0);
            if pattern.len() % 2 == 1 {
                // bursts are untouched; any extra time is a new silence
                prop_assert_eq!(&corrected[..pattern.len()], &pattern[..]);
                prop_assert!(corrected.len() <= pattern.len() + 1);
            } else {
                let last = pattern.len() - 1;
                prop_assert_eq!(corrected.len(), pattern.len());
                prop_assert_eq!(&corrected[..last], &pattern[..last]);
                prop_assert!(corrected[last] >= pattern[last]);
            }
        }
    }
}
