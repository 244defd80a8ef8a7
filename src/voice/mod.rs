//! Audio devices
//!
//! Microphone frames in, scheduled agent audio out, PCM16 on the wire.

mod capture;
mod pcm;
mod playback;

use std::sync::Arc;
use std::time::Duration;

pub use capture::{INPUT_SAMPLE_RATE, MicrophoneCapture};
pub use pcm::{decode_chunk, decode_pcm16, encode_pcm16, samples_to_wav, write_wav};
pub use playback::{Mixer, OUTPUT_SAMPLE_RATE, OutputMixer};

use crate::Result;
use crate::floor::{ScheduledSource, SourceId};

/// Output device as seen by the session
///
/// Implementations report finished sources through the ended channel they
/// were built with. A stopped source must never be reported.
pub trait AudioSink {
    /// Current reading of the output clock
    fn now(&self) -> Duration;

    /// Queue `samples` to begin at `source.start` on the output clock
    ///
    /// # Errors
    ///
    /// Returns error if the device can no longer accept audio
    fn start(&mut self, source: ScheduledSource, samples: Arc<[f32]>, sample_rate: u32) -> Result<()>;

    /// Silence sources immediately
    fn stop(&mut self, ids: &[SourceId]);

    /// Release the device; further calls are no-ops
    fn close(&mut self);
}
