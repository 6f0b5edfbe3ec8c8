//! Routes a validated signal to the built-in emitter or the audio jack.

use crate::audio::{AudioSink, PlaybackStatus};
use crate::emitter::IrEmitter;
use crate::error::TransmitError;
use crate::modulation::PulseSynthesizer;
use crate::signal::{IrSignal, TransmissionMethod};
use crate::Config;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CapabilityCheck,
    NativeEmit,
    AudioPrepare,
    AudioEmit,
    AudioCleanup,
}

/// Runs `cleanup_output` when dropped, including while unwinding.
struct OutputGuard<'a> {
    sink: &'a dyn AudioSink,
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        log::debug!("dispatch: {:?}", Stage::AudioCleanup);
        self.sink.cleanup_output();
    }
}

pub struct Dispatcher {
    emitter: Arc<dyn IrEmitter>,
    sink: Arc<dyn AudioSink>,
    synthesizer: PulseSynthesizer,
    playback_grace: Duration,
    /// Held for the whole prepare, emit and cleanup sequence of an audio transmission.
    audio_token: Mutex<()>,
}

impl Dispatcher {
    pub fn new(emitter: Arc<dyn IrEmitter>, sink: Arc<dyn AudioSink>, config: &Config) -> Self {
        let min_buffer_bytes = config
            .min_buffer_bytes
            .unwrap_or_else(|| sink.min_buffer_bytes());
        let synthesizer =
            PulseSynthesizer::new(min_buffer_bytes).with_max_duration(config.max_signal_duration);

        Self {
            emitter,
            sink,
            synthesizer,
            playback_grace: config.playback_grace,
            audio_token: Mutex::new(()),
        }
    }

    pub fn synthesizer(&self) -> &PulseSynthesizer {
        &self.synthesizer
    }

    pub fn has_emitter(&self) -> bool {
        self.emitter.has_emitter()
    }

    pub fn select_method(&self, allow_audio_fallback: bool) -> TransmissionMethod {
        let method = TransmissionMethod::infer(self.has_emitter(), allow_audio_fallback);
        log::info!("select_method: {:?}", method);
        method
    }

    /// Sends `signal` by `method`. Never panics; every failure maps to a [`TransmitError`].
    pub fn transmit(&self, signal: &IrSignal, method: TransmissionMethod) -> Result<(), TransmitError> {
        log::info!(
            "transmit: {:?}, {} Hz, {} us",
            method,
            signal.carrier_frequency_hz(),
            signal.total_duration_us()
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match method {
            TransmissionMethod::DeviceEmitter => self.transmit_native(signal),
            TransmissionMethod::AudioPulse => self.transmit_audio(signal),
        }));

        match outcome {
            Ok(result) => {
                if let Err(e) = &result {
                    log::error!("transmit: {:?} failed: {}", method, e);
                }
                result
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                log::error!("transmit: {:?} aborted: {}", method, reason);
                Err(TransmitError::Unknown(reason))
            }
        }
    }

    fn transmit_native(&self, signal: &IrSignal) -> Result<(), TransmitError> {
        log::debug!("dispatch: {:?}", Stage::CapabilityCheck);
        if !self.emitter.has_emitter() {
            return Err(TransmitError::NoBuiltinEmitter);
        }

        let pattern = signal
            .pulse_pattern_us()
            .iter()
            .map(|&v| i32::try_from(v))
            .collect::<Result<Vec<i32>, _>>()
            .map_err(|_| TransmitError::Unknown("pulse interval exceeds i32".into()))?;

        log::debug!("dispatch: {:?}", Stage::NativeEmit);
        self.emitter
            .transmit(signal.carrier_frequency_hz(), &pattern)
            .map_err(TransmitError::from)
    }

    fn transmit_audio(&self, signal: &IrSignal) -> Result<(), TransmitError> {
        log::debug!("dispatch: {:?}", Stage::CapabilityCheck);
        if !self.sink.is_wired_sink_present() {
            return Err(TransmitError::NoWiredHeadphone);
        }

        let _token = self.audio_token.lock();

        log::debug!("dispatch: {:?}", Stage::AudioPrepare);
        let _guard = OutputGuard { sink: &*self.sink };
        self.sink.prepare_output()?;

        log::debug!("dispatch: {:?}", Stage::AudioEmit);
        let pcm = self
            .synthesizer
            .synthesize(signal.carrier_frequency_hz(), signal.pulse_pattern_us())?;
        let completion = self.sink.play(&pcm)?;

        let timeout = pcm.duration() + self.playback_grace;
        let status = completion.wait_timeout(timeout);
        // The stream must be gone before cleanup restores the output and the
        // token lets the next transmission open its own.
        if !completion.release(self.playback_grace) {
            log::warn!("transmit_audio: output stream still open after {:?}", self.playback_grace);
        }

        match status {
            PlaybackStatus::Completed => Ok(()),
            PlaybackStatus::TimedOut => Err(TransmitError::Unknown(format!(
                "playback did not finish within {:?}",
                timeout
            ))),
            PlaybackStatus::Aborted => Err(TransmitError::Unknown("playback aborted".into())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeEmitter, FakeSink, PlayBehavior};
    use super::*;
    use crate::codec::decode_nec;
    use crate::error::ErrorCode;

    fn dispatcher(emitter: FakeEmitter, sink: FakeSink) -> (Dispatcher, Arc<FakeEmitter>, Arc<FakeSink>) {
        let emitter = Arc::new(emitter);
        let sink = Arc::new(sink);
        let config = Config {
            playback_grace: Duration::from_millis(50),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(emitter.clone(), sink.clone(), &config);
        (dispatcher, emitter, sink)
    }

    fn short_signal() -> IrSignal {
        IrSignal::new(38_000, vec![9_000, 4_500, 563, 563, 563])
    }

    #[test]
    fn test_native_path_forwards_pattern() {
        let emitter = FakeEmitter {
            present: true,
            ..Default::default()
        };
        let (dispatcher, emitter, sink) = dispatcher(emitter, FakeSink::new(true, PlayBehavior::Complete));

        dispatcher
            .transmit(&short_signal(), TransmissionMethod::DeviceEmitter)
            .unwrap();
        let sent = emitter.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (38_000, vec![9_000, 4_500, 563, 563, 563]));
        assert_eq!(sink.prepared.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_native_path_without_emitter() {
        let (dispatcher, _, _) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Complete));
        let err = dispatcher
            .transmit(&short_signal(), TransmissionMethod::DeviceEmitter)
            .unwrap_err();
        assert_eq!(err, TransmitError::NoBuiltinEmitter);
        assert_eq!(err.code().code(), 5);
    }

    #[test]
    fn test_native_driver_failure_is_normalized() {
        let emitter = FakeEmitter {
            present: true,
            fail: true,
            ..Default::default()
        };
        let (dispatcher, _, _) = dispatcher(emitter, FakeSink::new(true, PlayBehavior::Complete));
        let err = dispatcher
            .transmit(&short_signal(), TransmissionMethod::DeviceEmitter)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransmissionFailed);
    }

    #[test]
    fn test_audio_path_plays_and_cleans_up() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Complete));
        let signal = decode_nec("0xF708FB04").unwrap();

        dispatcher.transmit(&signal, TransmissionMethod::AudioPulse).unwrap();
        assert_eq!(sink.played.lock().len(), 1);
        assert_eq!(sink.cleaned(), 1);
        assert_eq!(sink.level.level(), 0.25);
    }

    #[test]
    fn test_audio_path_without_wired_sink() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(false, PlayBehavior::Complete));
        let err = dispatcher
            .transmit(&short_signal(), TransmissionMethod::AudioPulse)
            .unwrap_err();
        assert_eq!(err, TransmitError::NoWiredHeadphone);
        assert_eq!(err.code().code(), 7);
        assert_eq!(sink.cleaned(), 0);
    }

    #[test]
    fn test_cleanup_runs_when_playback_fails() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Fail));
        let err = dispatcher
            .transmit(&short_signal(), TransmissionMethod::AudioPulse)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransmissionFailed);
        assert_eq!(sink.cleaned(), 1);
        assert_eq!(sink.level.level(), 0.25);
    }

    #[test]
    fn test_cleanup_runs_when_sink_panics() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Panic));
        let err = dispatcher
            .transmit(&short_signal(), TransmissionMethod::AudioPulse)
            .unwrap_err();
        assert_eq!(err, TransmitError::Unknown("audio driver crashed".into()));
        assert_eq!(sink.cleaned(), 1);
        assert_eq!(sink.level.level(), 0.25);

        // parking_lot never poisons, so the token is free again.
        assert!(dispatcher.audio_token.try_lock().is_some());
    }

    #[test]
    fn test_cleanup_runs_when_playback_never_completes() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Hang));
        let err = dispatcher
            .transmit(&short_signal(), TransmissionMethod::AudioPulse)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransmissionFailed);
        assert_eq!(sink.cleaned(), 1);
    }

    #[test]
    fn test_overlong_signal_is_rejected_with_cleanup() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Complete));
        let signal = IrSignal::new(38_000, vec![1_000_000, 1_000_000, 1_000]);
        let err = dispatcher
            .transmit(&signal, TransmissionMethod::AudioPulse)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransmissionFailed);
        assert!(sink.played.lock().is_empty());
        assert_eq!(sink.cleaned(), 1);
    }

    #[test]
    fn test_audio_transmissions_are_serialized() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Complete));
        let dispatcher = Arc::new(dispatcher);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    dispatcher.transmit(&short_signal(), TransmissionMethod::AudioPulse)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(sink.played.lock().len(), 4);
        assert_eq!(sink.cleaned(), 4);
        assert_eq!(sink.level.level(), 0.25);
    }

    #[test]
    fn test_next_transmission_waits_for_the_open_stream() {
        let (dispatcher, _, sink) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Linger));
        let dispatcher = Arc::new(dispatcher);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    dispatcher.transmit(&short_signal(), TransmissionMethod::AudioPulse)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(sink.played.lock().len(), 3);
        assert_eq!(sink.max_open_streams.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(sink.streams_open_at_cleanup.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(sink.open_streams.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_min_buffer_override() {
        let sink = Arc::new(FakeSink::new(true, PlayBehavior::Complete));
        let config = Config {
            min_buffer_bytes: Some(8_192),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(Arc::new(FakeEmitter::default()), sink.clone(), &config);
        assert_eq!(dispatcher.synthesizer().min_buffer_bytes(), 8_192);

        dispatcher
            .transmit(&short_signal(), TransmissionMethod::AudioPulse)
            .unwrap();
        assert!(sink.played.lock()[0].byte_len() >= 8_192);
    }

    #[test]
    fn test_select_method() {
        let (dispatcher, _, _) = dispatcher(FakeEmitter::default(), FakeSink::new(true, PlayBehavior::Complete));
        assert_eq!(dispatcher.select_method(true), TransmissionMethod::AudioPulse);
        assert_eq!(dispatcher.select_method(false), TransmissionMethod::DeviceEmitter);
    }
}
