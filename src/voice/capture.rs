//! Microphone capture in fixed-size frames

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Capture rate expected by the remote session (16 kHz speech)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Frames buffered between the audio callback and the session task
const FRAME_QUEUE: usize = 64;

/// Captures mono frames from the default input device
pub struct MicrophoneCapture {
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    stream: Option<Stream>,
}

impl MicrophoneCapture {
    /// Open the default input device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if there is no input device or it cannot
    /// run at the requested rate
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supports_rate = |c: &SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .filter(supports_rate)
            .min_by_key(SupportedStreamConfigRange::channels)
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!("input device cannot capture at {sample_rate} Hz"))
            })?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            stream: None,
        })
    }

    /// Start capturing and deliver frames of exactly `frame_size` samples
    ///
    /// Multi-channel input is downmixed to mono. Frames are dropped if the
    /// session falls more than a few frames behind.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the stream cannot be started
    pub fn start(&mut self, frame_size: usize) -> Result<mpsc::Receiver<Vec<f32>>> {
        if self.stream.is_some() {
            return Err(Error::Audio("microphone already started".to_string()));
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        let channels = usize::from(self.config.channels.max(1));
        let pending = Arc::new(Mutex::new(Vec::with_capacity(frame_size * 2)));

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut pending) = pending.lock() else {
                        return;
                    };
                    if channels == 1 {
                        pending.extend_from_slice(data);
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        let scale = 1.0 / channels as f32;
                        pending.extend(data.chunks(channels).map(|c| c.iter().sum::<f32>() * scale));
                    }
                    while pending.len() >= frame_size {
                        let frame: Vec<f32> = pending.drain(..frame_size).collect();
                        forward_frame(&tx, frame);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone stream error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(frame_size, "microphone capture started");
        Ok(rx)
    }

    /// Stop capturing and release the device stream
    ///
    /// The frame receiver observes end-of-stream once buffered frames drain.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("microphone capture stopped");
        }
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Hand a frame to the session without blocking the audio callback
///
/// A full queue means the session is behind; the frame is dropped and the
/// session clock, which counts delivered samples, falls behind wall time.
fn forward_frame(tx: &mpsc::Sender<Vec<f32>>, frame: Vec<f32>) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(frame)) => {
            tracing::debug!(samples = frame.len(), "session behind, microphone frame dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
