use crate::error::AudioError;
use crate::modulation::PcmBuffer;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use crate::routing::{self, AudioRouter};
#[cfg(not(target_arch = "wasm32"))]
use crate::{RoutingStrategy, CHANNELS, DEFAULT_MIN_BUFFER_BYTES, SAMPLE_RATE};
#[cfg(not(target_arch = "wasm32"))]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
#[cfg(not(target_arch = "wasm32"))]
use cpal::StreamConfig;

/// An analog audio output able to play synthesized pulse trains.
pub trait AudioSink: Send + Sync {
    fn is_wired_sink_present(&self) -> bool;

    /// Smallest buffer, in bytes, the output accepts for 16-bit stereo.
    fn min_buffer_bytes(&self) -> usize;

    /// Selects the wired output and raises it to full volume.
    fn prepare_output(&self) -> Result<(), AudioError>;

    /// Queues `pcm` for playback and returns once it is queued.
    fn play(&self, pcm: &PcmBuffer) -> Result<CompletionHandle, AudioError>;

    /// Restores the routing and volume found before [`AudioSink::prepare_output`].
    fn cleanup_output(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Completed,
    TimedOut,
    /// The sink dropped the notifier without reaching the end marker.
    Aborted,
}

/// Fired by the sink when playback passes the end of the buffer.
pub struct CompletionNotifier {
    tx: Sender<()>,
}

impl CompletionNotifier {
    pub fn notify(self) {
        let _ = self.tx.try_send(());
    }
}

/// Kept by whoever owns the live output stream; dropping it tells the
/// handle the stream is closed.
pub struct StreamOwner {
    stop: Receiver<()>,
    _released: Sender<()>,
}

impl StreamOwner {
    /// Fires when the handle asks for the stream to stop early.
    pub fn stop_requested(&self) -> &Receiver<()> {
        &self.stop
    }
}

struct StreamLease {
    stop: Sender<()>,
    released: Receiver<()>,
}

pub struct CompletionHandle {
    rx: Receiver<()>,
    lease: Option<StreamLease>,
}

impl CompletionHandle {
    pub fn channel() -> (CompletionNotifier, CompletionHandle) {
        let (tx, rx) = bounded(1);
        (CompletionNotifier { tx }, CompletionHandle { rx, lease: None })
    }

    /// Like [`CompletionHandle::channel`], for sinks that keep a stream open
    /// after queueing the buffer.
    pub fn with_owner() -> (CompletionNotifier, CompletionHandle, StreamOwner) {
        let (notifier, mut handle) = Self::channel();
        let (stop_tx, stop_rx) = bounded(1);
        let (released_tx, released_rx) = bounded(0);
        handle.lease = Some(StreamLease {
            stop: stop_tx,
            released: released_rx,
        });
        let owner = StreamOwner {
            stop: stop_rx,
            _released: released_tx,
        };
        (notifier, handle, owner)
    }

    pub fn completed() -> Self {
        let (notifier, handle) = Self::channel();
        notifier.notify();
        handle
    }

    pub fn is_complete(&self) -> bool {
        !self.rx.is_empty()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> PlaybackStatus {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => PlaybackStatus::Completed,
            Err(RecvTimeoutError::Timeout) => PlaybackStatus::TimedOut,
            Err(RecvTimeoutError::Disconnected) => PlaybackStatus::Aborted,
        }
    }

    /// Asks the stream owner to stop and waits until it has dropped the
    /// stream. `false` if it is still open after `timeout`.
    pub fn release(&self, timeout: Duration) -> bool {
        let Some(lease) = &self.lease else {
            return true;
        };
        let _ = lease.stop.try_send(());
        !matches!(lease.released.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

#[derive(Debug)]
struct LevelState {
    level: f32,
    saved: Option<f32>,
}

/// Software output level, saved on raise and put back on restore.
#[derive(Debug, Clone)]
pub struct OutputLevel {
    state: Arc<Mutex<LevelState>>,
}

impl OutputLevel {
    pub const MAX: f32 = 1.0;

    pub fn new(level: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(LevelState {
                level: level.clamp(0.0, Self::MAX),
                saved: None,
            })),
        }
    }

    pub fn level(&self) -> f32 {
        self.state.lock().level
    }

    pub fn raise_to_max(&self) {
        let mut state = self.state.lock();
        if state.saved.is_none() {
            state.saved = Some(state.level);
        }
        state.level = Self::MAX;
    }

    /// Puts back the level saved by [`OutputLevel::raise_to_max`]. Idempotent.
    pub fn restore(&self) {
        let mut state = self.state.lock();
        if let Some(original) = state.saved.take() {
            state.level = original;
            log::debug!("restore: output level back to {}", original);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub struct CpalAudioSink {
    router: Arc<dyn AudioRouter>,
    output_level: OutputLevel,
    min_buffer_bytes: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CpalAudioSink {
    pub fn new(strategy: RoutingStrategy, min_buffer_bytes: Option<usize>) -> Self {
        let host = cpal::default_host();
        let router: Arc<dyn AudioRouter> = Arc::from(routing::router_for(strategy, &host));
        let min_buffer_bytes = min_buffer_bytes.unwrap_or_else(|| {
            router
                .wired_output(&host)
                .and_then(|device| device_min_buffer_bytes(&device))
                .unwrap_or(DEFAULT_MIN_BUFFER_BYTES)
        });

        Self {
            router,
            output_level: OutputLevel::new(0.5),
            min_buffer_bytes,
        }
    }

    pub fn output_level(&self) -> &OutputLevel {
        &self.output_level
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn device_min_buffer_bytes(device: &cpal::Device) -> Option<usize> {
    let config = device.default_output_config().ok()?;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, .. } => {
            Some(*min as usize * CHANNELS as usize * std::mem::size_of::<i16>())
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AudioSink for CpalAudioSink {
    fn is_wired_sink_present(&self) -> bool {
        let host = cpal::default_host();
        self.router.wired_output(&host).is_some()
    }

    fn min_buffer_bytes(&self) -> usize {
        self.min_buffer_bytes
    }

    fn prepare_output(&self) -> Result<(), AudioError> {
        let host = cpal::default_host();
        let result = self.router.select(&host).map(|_| ());
        self.output_level.raise_to_max();
        result
    }

    fn play(&self, pcm: &PcmBuffer) -> Result<CompletionHandle, AudioError> {
        let samples: Vec<f32> = pcm.samples().iter().map(|&s| s as f32 / 32768.0).collect();
        let router = Arc::clone(&self.router);
        let output_level = self.output_level.clone();
        let hold = pcm.duration() + Duration::from_millis(500);
        let (notifier, handle, owner) = CompletionHandle::with_owner();
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        // cpal streams are not Send on every platform, so the stream lives
        // and dies on its own thread.
        std::thread::spawn(move || {
            let host = cpal::default_host();
            let (done_tx, done_rx) = bounded::<()>(1);
            let stream = match open_stream(&*router, &host, samples, output_level, notifier, done_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            crossbeam_channel::select! {
                recv(done_rx) -> _ => {
                    // let the device drain its last period
                    std::thread::sleep(Duration::from_millis(100));
                }
                recv(owner.stop_requested()) -> _ => {
                    log::debug!("play: stopped before the end marker");
                }
                default(hold) => {
                    log::warn!("play: end marker not reached within {:?}", hold);
                }
            }
            drop(stream);
            drop(owner);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::Stream("playback thread exited".into())),
        }
    }

    fn cleanup_output(&self) {
        self.router.restore();
        self.output_level.restore();
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn open_stream(
    router: &dyn AudioRouter,
    host: &cpal::Host,
    samples: Vec<f32>,
    output_level: OutputLevel,
    notifier: CompletionNotifier,
    done_tx: Sender<()>,
) -> Result<cpal::Stream, AudioError> {
    let device = router.output(host)?;
    let config = StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut position = 0usize;
    let mut notifier = Some(notifier);

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let gain = output_level.level();
                for sample in data.iter_mut() {
                    if position < samples.len() {
                        *sample = samples[position] * gain;
                        position += 1;
                    } else {
                        *sample = 0.0;
                    }
                }
                if position >= samples.len() {
                    // End marker: put the volume back as soon as the buffer is consumed.
                    if let Some(notifier) = notifier.take() {
                        output_level.restore();
                        notifier.notify();
                        let _ = done_tx.try_send(());
                    }
                }
            },
            |err| log::error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn list_audio_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let marker = if routing::is_wired_name(&name) { " [wired]" } else { "" };
                devices.push(format!("Output: {}{}", name, marker));
            }
        }
    }

    devices
}
