//! Scheduled playback to speakers
//!
//! The output stream's own frame counter is the output clock. Sources are
//! queued with a start time on that clock and mixed in the audio callback.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::AudioSink;
use crate::floor::{ScheduledSource, SourceId};
use crate::{Error, Result};

/// Output rate of the remote agent's audio
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Arc<[f32]>,
    /// Source samples advanced per output frame
    step: f64,
    position: f64,
}

/// Hardware-independent mixing core
///
/// Counts rendered frames, starts each source at its scheduled frame (or
/// right away if that frame already passed) and reports sources that ran
/// out of samples.
pub struct Mixer {
    sample_rate: u32,
    clock: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock: 0,
            voices: Vec::new(),
        }
    }

    /// Output clock reading
    #[must_use]
    pub fn now(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(self.clock) * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Queue a source
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn add(&mut self, source: ScheduledSource, samples: Arc<[f32]>, sample_rate: u32) {
        let start_frame = (source.start.as_secs_f64() * f64::from(self.sample_rate)).round() as u64;
        let step = if self.sample_rate == 0 {
            1.0
        } else {
            f64::from(sample_rate) / f64::from(self.sample_rate)
        };

        self.voices.push(Voice {
            id: source.id,
            start_frame,
            samples,
            step,
            position: 0.0,
        });
    }

    /// Drop sources; they produce no further output or ended reports
    pub fn remove(&mut self, ids: &[SourceId]) {
        self.voices.retain(|v| !ids.contains(&v.id));
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Fill an interleaved buffer and return the sources that finished
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> Vec<SourceId> {
        let channels = channels.max(1);
        let mut finished = Vec::new();

        for frame in out.chunks_mut(channels) {
            let mut mixed = 0.0_f32;
            for voice in &mut self.voices {
                if self.clock < voice.start_frame {
                    continue;
                }
                let index = voice.position as usize;
                if let Some(sample) = voice.samples.get(index) {
                    mixed += *sample;
                    voice.position += voice.step;
                }
            }

            frame.fill(mixed.clamp(-1.0, 1.0));
            self.clock += 1;
        }

        self.voices.retain(|voice| {
            let done = voice.position as usize >= voice.samples.len();
            if done {
                finished.push(voice.id);
            }
            !done
        });

        finished
    }
}

/// Output device driving a [`Mixer`] from the audio callback
pub struct OutputMixer {
    mixer: Arc<Mutex<Mixer>>,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl OutputMixer {
    /// Open the default output device and start the clock
    ///
    /// Finished sources are reported on `ended`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no output device can play at
    /// `sample_rate`
    pub fn open(sample_rate: u32, ended: mpsc::UnboundedSender<SourceId>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            // Prefer mono, fall back to stereo
            .min_by_key(|c| c.channels())
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!("output device cannot play at {sample_rate} Hz"))
            })?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        let channels = usize::from(config.channels);
        let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate)));
        let callback_mixer = Arc::clone(&mixer);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let finished = match callback_mixer.lock() {
                        Ok(mut mixer) => mixer.render(data, channels),
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    for id in finished {
                        let _ = ended.send(id);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "speaker stream error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "speaker opened"
        );

        Ok(Self {
            mixer,
            config,
            stream: Some(stream),
        })
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl AudioSink for OutputMixer {
    fn now(&self) -> Duration {
        self.mixer.lock().map(|m| m.now()).unwrap_or_default()
    }

    fn start(&mut self, source: ScheduledSource, samples: Arc<[f32]>, sample_rate: u32) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Audio("speaker already closed".to_string()));
        }
        self.mixer
            .lock()
            .map_err(|_| Error::Audio("mixer lock poisoned".to_string()))?
            .add(source, samples, sample_rate);
        Ok(())
    }

    fn stop(&mut self, ids: &[SourceId]) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.remove(ids);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Ok(mut mixer) = self.mixer.lock() {
                mixer.clear();
            }
            drop(stream);
            tracing::debug!("speaker closed");
        }
    }
}

impl Drop for OutputMixer {
    fn drop(&mut self) {
        self.close();
    }
}
