//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley::floor::{FloorConfig, ScheduledSource, SourceId};
use parley::session::SessionConfig;
use parley::voice::AudioSink;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Microphone frame length used throughout the tests
pub const FRAME: usize = 2048;

/// Microphone rate used throughout the tests
pub const INPUT_RATE: u32 = 16_000;

/// Agent audio rate used throughout the tests
pub const OUTPUT_RATE: u32 = 24_000;

/// Duration of one microphone frame
pub const FRAME_TIME: Duration = Duration::from_millis(128);

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sine(frequency: f32, len: usize, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// One frame of clear speech-level audio
pub fn voiced_frame() -> Vec<f32> {
    sine(220.0, FRAME, 0.3, INPUT_RATE)
}

/// One frame of silence
pub fn silent_frame() -> Vec<f32> {
    vec![0.0; FRAME]
}

/// Agent speech lasting `seconds` at the output rate
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn agent_speech(seconds: f32) -> Vec<f32> {
    let len = (OUTPUT_RATE as f32 * seconds) as usize;
    sine(330.0, len, 0.2, OUTPUT_RATE)
}

/// Session settings with a recognizable nudge and no greeting
pub fn session_config() -> SessionConfig {
    SessionConfig {
        floor: FloorConfig::default(),
        input_sample_rate: INPUT_RATE,
        greeting: None,
        nudge_prompt: "Are you still there?".to_string(),
    }
}

/// What the fake speaker was asked to do
#[derive(Debug, Default)]
pub struct SinkLog {
    pub started: Vec<ScheduledSource>,
    pub stopped: Vec<SourceId>,
    pub closed: u32,
}

/// Speaker stand-in driven by the tokio clock
///
/// Each started source reports ended at its scheduled end unless it was
/// stopped first, like the real mixer.
pub struct FakeSink {
    origin: Instant,
    ended: mpsc::UnboundedSender<SourceId>,
    live: Arc<Mutex<HashSet<SourceId>>>,
    log: Arc<Mutex<SinkLog>>,
}

impl FakeSink {
    /// Create a sink plus its ended-notification receiver and a log handle
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SourceId>, Arc<Mutex<SinkLog>>) {
        let (ended, ended_rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let sink = Self {
            origin: Instant::now(),
            ended,
            live: Arc::new(Mutex::new(HashSet::new())),
            log: Arc::clone(&log),
        };
        (sink, ended_rx, log)
    }
}

impl AudioSink for FakeSink {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn start(
        &mut self,
        source: ScheduledSource,
        _samples: Arc<[f32]>,
        _sample_rate: u32,
    ) -> parley::Result<()> {
        self.live.lock().unwrap().insert(source.id);
        self.log.lock().unwrap().started.push(source);

        let live = Arc::clone(&self.live);
        let ended = self.ended.clone();
        let end = self.origin + source.end();
        tokio::spawn(async move {
            tokio::time::sleep_until(end).await;
            if live.lock().unwrap().remove(&source.id) {
                let _ = ended.send(source.id);
            }
        });
        Ok(())
    }

    fn stop(&mut self, ids: &[SourceId]) {
        let mut live = self.live.lock().unwrap();
        for id in ids {
            live.remove(id);
        }
        self.log.lock().unwrap().stopped.extend_from_slice(ids);
    }

    fn close(&mut self) {
        self.live.lock().unwrap().clear();
        self.log.lock().unwrap().closed += 1;
    }
}
