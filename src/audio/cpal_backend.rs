//! # Sound-Card Backend (cpal)
//!
//! Capture and playback on the system's default devices.
//!
//! `cpal::Stream` is not `Send` on every platform, so each stream lives on a
//! dedicated thread that builds it, starts it, and parks until it is told to
//! stop. The engine only ever holds the thread's stop handle.

use crate::audio::codec::{pcm_to_float, AudioFrame};
use crate::audio::device::{
    CaptureConfig, CaptureDevice, CaptureStream, FrameCallback, PlaybackDevice, PlaybackHandle,
    PlaybackOutput,
};
use crate::audio::frames::{downmix_to_mono, resample_linear, FrameAssembler};
use crate::audio::mixer::Mixer;
use crate::error::VoiceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

type SharedCallback = Arc<Mutex<Option<FrameCallback>>>;

/// Owns the thread that keeps a cpal stream alive.
struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Build a stream on a new thread and wait until it is playing.
    ///
    /// `build` runs on the new thread; whatever extra value it returns next to
    /// the stream is handed back to the caller.
    fn spawn<T, F>(
        name: &str,
        error: fn(String) -> VoiceError,
        build: F,
    ) -> Result<(Self, T), VoiceError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<(cpal::Stream, T), VoiceError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<T, VoiceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match build() {
                Ok((stream, value)) => {
                    let _ = ready_tx.send(Ok(value));
                    // Parks until stop is sent or the handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| error(format!("failed to spawn audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(value)) => Ok((
                Self {
                    stop: Some(stop_tx),
                    join: Some(join),
                },
                value,
            )),
            Ok(Err(err)) => {
                let _ = join.join();
                Err(err)
            }
            Err(_) => {
                let _ = join.join();
                Err(error("audio thread exited during startup".to_string()))
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Default system microphone.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCapture;

impl CaptureDevice for CpalCapture {
    fn acquire(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, VoiceError> {
        let callback: SharedCallback = Arc::new(Mutex::new(None));
        let config = *config;
        let stream_callback = Arc::clone(&callback);

        let (thread, device_rate) = StreamThread::spawn("voice-capture", VoiceError::AccessDenied, move || {
            build_input_stream(config, stream_callback)
        })?;
        debug!(device_rate, target_rate = config.sample_rate, "Microphone acquired");

        Ok(Box::new(CpalCaptureStream {
            callback,
            thread: Some(thread),
        }))
    }
}

struct CpalCaptureStream {
    callback: SharedCallback,
    thread: Option<StreamThread>,
}

impl CaptureStream for CpalCaptureStream {
    fn on_frame(&mut self, callback: FrameCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    fn release(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.shutdown();
            debug!("Microphone released");
        }
        if let Ok(mut slot) = self.callback.lock() {
            slot.take();
        }
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_input_stream(
    config: CaptureConfig,
    callback: SharedCallback,
) -> Result<(cpal::Stream, u32), VoiceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::AccessDenied("no microphone found".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| VoiceError::AccessDenied(format!("failed to query input config: {}", e)))?;

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.config();
    let device_rate = stream_config.sample_rate.0;
    let channels = usize::from(stream_config.channels.max(1));

    let mut assembler = FrameAssembler::new(config.frame_size, config.sample_rate);
    let mut deliver = move |mono: Vec<f32>| {
        let resampled = resample_linear(&mono, device_rate, config.sample_rate);
        let frames: Vec<AudioFrame> = assembler.push(&resampled);
        if frames.is_empty() {
            return;
        }
        if let Ok(mut slot) = callback.lock() {
            if let Some(on_frame) = slot.as_mut() {
                for frame in frames {
                    on_frame(frame);
                }
            }
        }
    };

    let error_callback = |err: cpal::StreamError| warn!(error = %err, "Capture stream error");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                deliver(downmix_to_mono(data, channels));
            },
            error_callback,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|s| pcm_to_float(*s)).collect();
                deliver(downmix_to_mono(&floats, channels));
            },
            error_callback,
            None,
        ),
        other => {
            return Err(VoiceError::AccessDenied(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| VoiceError::AccessDenied(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| VoiceError::AccessDenied(format!("failed to start input stream: {}", e)))?;

    Ok((stream, device_rate))
}

/// Default system speakers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalPlayback;

impl PlaybackDevice for CpalPlayback {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackOutput>, VoiceError> {
        let (thread, mixer) = StreamThread::spawn(
            "voice-playback",
            VoiceError::OutputUnavailable,
            move || build_output_stream(sample_rate),
        )?;

        Ok(Box::new(CpalOutput {
            mixer,
            _thread: thread,
        }))
    }
}

struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    _thread: StreamThread,
}

impl PlaybackOutput for CpalOutput {
    fn now(&self) -> f64 {
        self.mixer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .now()
    }

    fn schedule_buffer(&mut self, samples: Arc<[f32]>, start_time: f64) -> PlaybackHandle {
        self.mixer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .schedule(samples, start_time)
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.mixer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stop(handle);
    }
}

fn build_output_stream(source_rate: u32) -> Result<(cpal::Stream, Arc<Mutex<Mixer>>), VoiceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::OutputUnavailable("no output device found".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| VoiceError::OutputUnavailable(format!("failed to query output config: {}", e)))?;

    if supported.sample_format() != SampleFormat::F32 {
        return Err(VoiceError::OutputUnavailable(format!(
            "unsupported output sample format: {:?}",
            supported.sample_format()
        )));
    }

    let stream_config: cpal::StreamConfig = supported.config();
    let channels = usize::from(stream_config.channels.max(1));
    let mixer = Arc::new(Mutex::new(Mixer::new(stream_config.sample_rate.0, source_rate)));
    let render_mixer = Arc::clone(&mixer);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match render_mixer.lock() {
                Ok(mut mixer) => mixer.render(data, channels),
                Err(_) => data.fill(0.0),
            },
            |err: cpal::StreamError| warn!(error = %err, "Playback stream error"),
            None,
        )
        .map_err(|e| VoiceError::OutputUnavailable(format!("failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| VoiceError::OutputUnavailable(format!("failed to start output stream: {}", e)))?;

    Ok((stream, mixer))
}
