//! Fake devices and connector for unit tests.

use crate::audio::codec::AudioFrame;
use crate::audio::device::{
    CaptureConfig, CaptureDevice, CaptureStream, FrameCallback, PlaybackDevice, PlaybackHandle,
    PlaybackOutput,
};
use crate::error::VoiceError;
use crate::live::transport::{InboundEvent, InboundSink, LiveConnector, LiveSetup, OutboundMessage, TransportLink};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

/// Shared, ordered record of device and transport side effects.
///
/// Device fakes record synchronously. A link close is only visible through
/// its close signal, so every access first checks the watched links and
/// records `transport.close` for any that closed since the last entry.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<LogState>>);

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<&'static str>,
    links: Vec<Arc<LinkWatch>>,
}

#[derive(Debug)]
struct LinkWatch {
    close: Mutex<oneshot::Receiver<()>>,
    closed: AtomicBool,
}

impl LinkWatch {
    /// `true` the first time the close signal is seen.
    fn poll(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        if matches!(self.close.lock().unwrap().try_recv(), Err(TryRecvError::Empty)) {
            return false;
        }
        self.closed.store(true, Ordering::SeqCst);
        true
    }
}

impl LogState {
    fn sync_links(&mut self) {
        let newly_closed = self.links.iter().filter(|link| link.poll()).count();
        self.entries.extend(std::iter::repeat("transport.close").take(newly_closed));
    }
}

impl EventLog {
    pub fn record(&self, entry: &'static str) {
        let mut state = self.0.lock().unwrap();
        state.sync_links();
        state.entries.push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        let mut state = self.0.lock().unwrap();
        state.sync_links();
        state.entries.clone()
    }

    fn watch(&self, close: oneshot::Receiver<()>) -> Arc<LinkWatch> {
        let watch = Arc::new(LinkWatch {
            close: Mutex::new(close),
            closed: AtomicBool::new(false),
        });
        self.0.lock().unwrap().links.push(Arc::clone(&watch));
        watch
    }
}

#[derive(Default)]
struct CaptureState {
    callback: Mutex<Option<FrameCallback>>,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    denied: AtomicBool,
    log: EventLog,
}

/// Microphone whose frames are pushed by the test.
#[derive(Clone, Default)]
pub struct FakeCapture {
    state: Arc<CaptureState>,
}

impl FakeCapture {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            state: Arc::new(CaptureState { log, ..Default::default() }),
        }
    }

    /// Make every later acquisition fail.
    pub fn deny(&self) {
        self.state.denied.store(true, Ordering::SeqCst);
    }

    /// Deliver a frame as the device thread would.
    pub fn emit(&self, frame: AudioFrame) {
        if let Some(callback) = self.state.callback.lock().unwrap().as_mut() {
            callback(frame);
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.state.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn has_subscriber(&self) -> bool {
        self.state.callback.lock().unwrap().is_some()
    }
}

impl CaptureDevice for FakeCapture {
    fn acquire(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, VoiceError> {
        if self.state.denied.load(Ordering::SeqCst) {
            return Err(VoiceError::AccessDenied("permission denied".to_string()));
        }
        self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCaptureStream {
            state: Arc::clone(&self.state),
            released: false,
        }))
    }
}

struct FakeCaptureStream {
    state: Arc<CaptureState>,
    released: bool,
}

impl CaptureStream for FakeCaptureStream {
    fn on_frame(&mut self, callback: FrameCallback) {
        *self.state.callback.lock().unwrap() = Some(callback);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.callback.lock().unwrap().take();
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        self.state.log.record("capture.release");
    }
}

#[derive(Default)]
struct PlaybackState {
    clock: Mutex<f64>,
    next_handle: AtomicU64,
    scheduled: Mutex<Vec<(PlaybackHandle, f64)>>,
    stopped: Mutex<Vec<PlaybackHandle>>,
    unavailable: AtomicBool,
    log: EventLog,
}

/// Playback device with a clock the test moves by hand.
#[derive(Clone, Default)]
pub struct ManualPlayback {
    state: Arc<PlaybackState>,
}

impl ManualPlayback {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            state: Arc::new(PlaybackState { log, ..Default::default() }),
        }
    }

    pub fn advance(&self, seconds: f64) {
        *self.state.clock.lock().unwrap() += seconds;
    }

    pub fn make_unavailable(&self) {
        self.state.unavailable.store(true, Ordering::SeqCst);
    }

    /// Every buffer scheduled so far, with its start time.
    pub fn scheduled(&self) -> Vec<(PlaybackHandle, f64)> {
        self.state.scheduled.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<PlaybackHandle> {
        self.state.stopped.lock().unwrap().clone()
    }
}

impl PlaybackDevice for ManualPlayback {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackOutput>, VoiceError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(VoiceError::OutputUnavailable("no output device".to_string()));
        }
        Ok(Box::new(ManualOutput {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualOutput {
    state: Arc<PlaybackState>,
}

impl PlaybackOutput for ManualOutput {
    fn now(&self) -> f64 {
        *self.state.clock.lock().unwrap()
    }

    fn schedule_buffer(&mut self, _samples: Arc<[f32]>, start_time: f64) -> PlaybackHandle {
        let handle = PlaybackHandle(self.state.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.scheduled.lock().unwrap().push((handle, start_time));
        handle
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.state.stopped.lock().unwrap().push(handle);
        self.state.log.record("playback.stop");
    }
}

struct FakeLink {
    setup: LiveSetup,
    outbound: Option<mpsc::Receiver<OutboundMessage>>,
    sink: InboundSink,
    close: Arc<LinkWatch>,
}

#[derive(Default)]
struct ConnectorState {
    links: Mutex<Vec<FakeLink>>,
    failure: Mutex<Option<VoiceError>>,
    log: EventLog,
}

/// Connector that records each link instead of opening a socket.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<ConnectorState>,
}

impl FakeConnector {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            state: Arc::new(ConnectorState { log, ..Default::default() }),
        }
    }

    pub fn fail_with(&self, error: VoiceError) {
        *self.state.failure.lock().unwrap() = Some(error);
    }

    pub fn connects(&self) -> usize {
        self.state.links.lock().unwrap().len()
    }

    pub fn setup(&self, index: usize) -> LiveSetup {
        self.state.links.lock().unwrap()[index].setup.clone()
    }

    /// The outbound audio queue of the `index`th link.
    pub fn take_outbound(&self, index: usize) -> mpsc::Receiver<OutboundMessage> {
        self.state.links.lock().unwrap()[index]
            .outbound
            .take()
            .expect("outbound already taken")
    }

    /// Deliver an event as the `index`th link's connection task would.
    pub fn inject(&self, index: usize, event: InboundEvent) -> bool {
        self.state.links.lock().unwrap()[index].sink.send(event)
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.state.log.entries();
        self.state.links.lock().unwrap()[index].close.closed.load(Ordering::SeqCst)
    }
}

impl LiveConnector for FakeConnector {
    fn connect(&self, setup: &LiveSetup, sink: InboundSink) -> Result<TransportLink, VoiceError> {
        if let Some(error) = self.state.failure.lock().unwrap().clone() {
            self.state.log.record("transport.refused");
            return Err(error);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(setup.outbound_queue.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        self.state.links.lock().unwrap().push(FakeLink {
            setup: setup.clone(),
            outbound: Some(outbound_rx),
            sink,
            close: self.state.log.watch(close_rx),
        });
        Ok(TransportLink::new(outbound_tx, close_tx))
    }
}
