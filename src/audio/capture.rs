//! # Capture Pipeline
//!
//! Bridges the microphone's continuous frame stream into encoded chunks on
//! the session's outbound queue.
//!
//! ## Backpressure Policy:
//! The capture callback must never wait. Every frame goes through the
//! [`OutboundGate`]:
//! - **gate closed** (session still connecting, or tearing down): drop
//! - **queue full** (stalled connection): drop
//! - **otherwise**: encode and hand over with `try_send`
//!
//! Dropped frames are gone for good. Audio cannot usefully be delayed, and
//! buffering behind a stalled socket would grow without bound.

use crate::audio::codec::{AudioFrame, PcmCodec};
use crate::audio::device::{CaptureConfig, CaptureDevice, CaptureStream};
use crate::error::VoiceError;
use crate::live::transport::OutboundMessage;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// What happened to one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    DroppedNotReady,
    DroppedQueueFull,
    DroppedClosed,
}

/// Readiness flag plus the outbound queue it guards.
///
/// ## Thread Safety:
/// Shared between the device thread (which forwards frames) and the engine
/// task (which opens and closes it). Only atomics are touched on the hot
/// path, so no lock is ever held by the capture callback.
#[derive(Debug)]
pub struct OutboundGate {
    ready: AtomicBool,
    outbound: mpsc::Sender<OutboundMessage>,
    sent: AtomicU64,
    dropped: AtomicU64,
    /// Latest frame RMS, stored as `f32` bits for the level meter
    level: AtomicU32,
}

impl OutboundGate {
    pub fn new(outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            ready: AtomicBool::new(false),
            outbound,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            level: AtomicU32::new(0),
        }
    }

    pub fn open(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Encode and send one frame, or drop it.
    pub fn forward(&self, codec: &PcmCodec, frame: AudioFrame) -> ForwardOutcome {
        self.level.store(frame.rms().to_bits(), Ordering::Relaxed);

        if !self.is_open() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return ForwardOutcome::DroppedNotReady;
        }

        let chunk = codec.encode(&frame);
        match self.outbound.try_send(OutboundMessage::Audio(chunk)) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                ForwardOutcome::Sent
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                ForwardOutcome::DroppedQueueFull
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                ForwardOutcome::DroppedClosed
            }
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

/// A running capture subscription wired to one session's outbound queue.
pub struct CapturePipeline {
    stream: Box<dyn CaptureStream>,
    gate: Arc<OutboundGate>,
    released: bool,
}

impl CapturePipeline {
    /// Acquire the microphone. No frame is delivered anywhere until
    /// [`CapturePipeline::attach`] is called.
    pub fn acquire(device: &dyn CaptureDevice, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, VoiceError> {
        device.acquire(config)
    }

    /// Route an acquired stream's frames through a closed gate into `outbound`.
    pub fn attach(
        mut stream: Box<dyn CaptureStream>,
        codec: PcmCodec,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let gate = Arc::new(OutboundGate::new(outbound));
        let callback_gate = Arc::clone(&gate);
        stream.on_frame(Box::new(move |frame| {
            callback_gate.forward(&codec, frame);
        }));

        Self {
            stream,
            gate,
            released: false,
        }
    }

    /// Start forwarding frames. Anything captured before this was dropped.
    pub fn open(&self) {
        self.gate.open();
    }

    /// Close the gate and release the device. Idempotent.
    pub fn stop(&mut self) {
        if self.released {
            return;
        }
        self.gate.close();
        self.stream.release();
        self.released = true;
        debug!(
            sent = self.gate.frames_sent(),
            dropped = self.gate.frames_dropped(),
            "Capture pipeline stopped"
        );
    }

    pub fn gate(&self) -> &OutboundGate {
        &self.gate
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCapture;

    fn frame(value: f32) -> AudioFrame {
        AudioFrame::new(vec![value; 160], 16_000)
    }

    fn config() -> CaptureConfig {
        CaptureConfig { sample_rate: 16_000, frame_size: 160 }
    }

    #[test]
    fn test_closed_gate_drops_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        let gate = OutboundGate::new(tx);
        let codec = PcmCodec::new(16_000);

        assert_eq!(gate.forward(&codec, frame(0.1)), ForwardOutcome::DroppedNotReady);
        assert_eq!(gate.frames_dropped(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (tx, mut rx) = mpsc::channel(1);
        let gate = OutboundGate::new(tx);
        let codec = PcmCodec::new(16_000);
        gate.open();

        assert_eq!(gate.forward(&codec, frame(0.1)), ForwardOutcome::Sent);
        assert_eq!(gate.forward(&codec, frame(0.2)), ForwardOutcome::DroppedQueueFull);

        let OutboundMessage::Audio(first) = rx.try_recv().unwrap();
        assert_eq!(first, codec.encode(&frame(0.1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let gate = OutboundGate::new(tx);
        gate.open();
        assert_eq!(
            gate.forward(&PcmCodec::new(16_000), frame(0.1)),
            ForwardOutcome::DroppedClosed
        );
    }

    #[test]
    fn test_frames_before_ready_are_never_sent() {
        let capture = FakeCapture::default();
        let (tx, mut rx) = mpsc::channel(8);
        let codec = PcmCodec::new(16_000);

        let stream = CapturePipeline::acquire(&capture, &config()).unwrap();
        let pipeline = CapturePipeline::attach(stream, codec, tx);

        capture.emit(frame(0.1));
        capture.emit(frame(0.2));
        pipeline.open();
        capture.emit(frame(0.3));
        capture.emit(frame(0.4));

        let mut received = Vec::new();
        while let Ok(OutboundMessage::Audio(chunk)) = rx.try_recv() {
            received.push(chunk);
        }
        assert_eq!(received, vec![codec.encode(&frame(0.3)), codec.encode(&frame(0.4))]);
        assert_eq!(pipeline.gate().frames_dropped(), 2);
        assert_eq!(pipeline.gate().frames_sent(), 2);
    }

    #[test]
    fn test_stop_releases_device_once() {
        let capture = FakeCapture::default();
        let (tx, _rx) = mpsc::channel(8);

        let stream = CapturePipeline::acquire(&capture, &config()).unwrap();
        let mut pipeline = CapturePipeline::attach(stream, PcmCodec::new(16_000), tx);
        pipeline.open();
        pipeline.stop();
        pipeline.stop();
        drop(pipeline);

        assert_eq!(capture.releases(), 1);
        assert!(!capture.has_subscriber());
    }

    #[test]
    fn test_level_tracks_latest_frame() {
        let (tx, _rx) = mpsc::channel(1);
        let gate = OutboundGate::new(tx);
        gate.forward(&PcmCodec::new(16_000), frame(0.5));
        assert!((gate.level() - 0.5).abs() < 1e-6);
    }
}
