//! Interview session task
//!
//! [`FloorSession`] is the single owner of floor state. It multiplexes
//! microphone frames, remote events, playback-ended notifications and timer
//! deadlines into coordinator events, and carries out the effects the
//! coordinator returns. Nothing else mutates the floor.

use std::collections::VecDeque;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::floor::timer::{self, Deadlines};
use crate::floor::{
    Coordinator, Effect, FloorConfig, FloorEvent, FloorState, SourceId, TimerToken, Transcript,
    chunk_duration,
};
use crate::prompt;
use crate::remote::{RemoteEvent, RemoteLink};
use crate::voice::{AudioSink, MicrophoneCapture, decode_chunk, encode_pcm16};
use crate::{Error, Result};

/// Everything a session needs besides its devices and link
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub floor: FloorConfig,
    /// Rate of microphone frames and outbound audio
    pub input_sample_rate: u32,
    /// Sent as text once the session starts
    pub greeting: Option<String>,
    /// Sent when the silence watchdog fires
    pub nudge_prompt: String,
}

impl SessionConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            floor: config.floor.clone(),
            input_sample_rate: config.audio.input_sample_rate,
            greeting: Some(prompt::greeting_prompt(&config.session)),
            nudge_prompt: prompt::nudge_prompt(config.session.language).to_string(),
        }
    }
}

/// Live view of the session for presentation layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: FloorState,
    /// Microphone level, 0-100
    pub meter: u8,
    /// The candidate finished and the agent has not started yet
    pub agent_thinking: bool,
    pub nudges: u32,
    pub transcript_entries: usize,
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Shutdown,
    RemoteClosed,
    MicrophoneClosed,
}

/// One floor transition, relative to session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FloorChange {
    pub at_ms: u64,
    pub from: FloorState,
    pub to: FloorState,
}

/// Result of a finished session
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub transcript: Transcript,
    pub floor_log: Vec<FloorChange>,
    pub nudges: u32,
}

enum Wake {
    Shutdown,
    Ended(Option<SourceId>),
    Timer(TimerToken),
    Remote(Option<RemoteEvent>),
    Frame(Option<Vec<f32>>),
}

/// The state-owning session task
pub struct FloorSession<S: AudioSink> {
    id: Uuid,
    started_at: DateTime<Utc>,
    origin: Instant,
    coordinator: Coordinator,
    deadlines: Deadlines,
    transcript: Transcript,
    floor_log: Vec<FloorChange>,
    frames: mpsc::Receiver<Vec<f32>>,
    ended: mpsc::UnboundedReceiver<SourceId>,
    remote: RemoteLink,
    sink: S,
    microphone: Option<MicrophoneCapture>,
    status: watch::Sender<SessionStatus>,
    input_sample_rate: u32,
    captured_samples: usize,
    greeting: Option<String>,
    closed: bool,
}

impl<S: AudioSink> FloorSession<S> {
    /// Assemble a session
    ///
    /// `frames` carries microphone frames, `ended` the playback-ended
    /// notifications produced by `sink`.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        remote: RemoteLink,
        sink: S,
        frames: mpsc::Receiver<Vec<f32>>,
        ended: mpsc::UnboundedReceiver<SourceId>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());

        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            origin: Instant::now(),
            coordinator: Coordinator::new(config.floor, config.nudge_prompt),
            deadlines: Deadlines::default(),
            transcript: Transcript::new(),
            floor_log: Vec::new(),
            frames,
            ended,
            remote,
            sink,
            microphone: None,
            status,
            input_sample_rate: config.input_sample_rate,
            captured_samples: 0,
            greeting: config.greeting,
            closed: false,
        }
    }

    /// Hand the microphone to the session so teardown releases it
    #[must_use]
    pub fn with_microphone(mut self, microphone: MicrophoneCapture) -> Self {
        self.microphone = Some(microphone);
        self
    }

    /// Subscribe to status updates
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> FloorState {
        self.coordinator.state()
    }

    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run until `shutdown` resolves, the remote closes or a fatal error
    ///
    /// The session is torn down before this returns, whatever the reason.
    ///
    /// # Errors
    ///
    /// Returns `RemoteSession` if the remote reports a failure, `Audio` if
    /// the speaker stops reporting, or if the session already ran
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<SessionOutcome> {
        if self.closed {
            return Err(Error::Audio("session already finished".to_string()));
        }

        tokio::pin!(shutdown);

        if let Some(greeting) = self.greeting.take() {
            self.remote.sink.send_text(&greeting);
        }
        tracing::info!(session = %self.id, "interview session started");

        let result = loop {
            let wake = tokio::select! {
                biased;
                () = &mut shutdown => Wake::Shutdown,
                id = self.ended.recv() => Wake::Ended(id),
                token = timer::wait_for(self.deadlines.next()) => Wake::Timer(token),
                event = self.remote.events.recv() => Wake::Remote(event),
                frame = self.frames.recv() => Wake::Frame(frame),
            };

            match wake {
                Wake::Shutdown => {
                    tracing::info!("shutdown requested");
                    break Ok(EndReason::Shutdown);
                }
                Wake::Ended(Some(id)) => self.dispatch(FloorEvent::SourceEnded(id)),
                Wake::Ended(None) => {
                    break Err(Error::Audio("speaker stopped reporting playback".to_string()));
                }
                Wake::Timer(token) => {
                    self.deadlines.fired(token);
                    self.dispatch(FloorEvent::TimerFired(token));
                }
                Wake::Remote(Some(event)) => {
                    if let Some(end) = self.on_remote(event) {
                        break end;
                    }
                }
                Wake::Remote(None) => break Ok(EndReason::RemoteClosed),
                Wake::Frame(Some(samples)) => self.on_frame(samples),
                Wake::Frame(None) => break Ok(EndReason::MicrophoneClosed),
            }
        };

        self.teardown();

        let end_reason = result.inspect_err(|e| tracing::error!(error = %e, "session failed"))?;
        tracing::info!(
            session = %self.id,
            reason = ?end_reason,
            entries = self.transcript.len(),
            "interview session ended"
        );

        Ok(SessionOutcome {
            id: self.id,
            started_at: self.started_at,
            ended_at: Utc::now(),
            end_reason,
            transcript: self.transcript.clone(),
            floor_log: self.floor_log.clone(),
            nudges: self.coordinator.nudges(),
        })
    }

    fn on_frame(&mut self, samples: Vec<f32>) {
        let at = chunk_duration(self.captured_samples, self.input_sample_rate);
        self.captured_samples += samples.len();
        self.dispatch(FloorEvent::Frame { samples, at });
    }

    fn on_remote(&mut self, event: RemoteEvent) -> Option<Result<EndReason>> {
        match event {
            RemoteEvent::AudioChunk { pcm16, sample_rate } => {
                match decode_chunk(&pcm16, sample_rate) {
                    Ok(samples) => {
                        let output_now = self.sink.now();
                        self.dispatch(FloorEvent::Chunk {
                            samples,
                            sample_rate,
                            output_now,
                        });
                    }
                    Err(e) if !e.is_fatal() => {
                        tracing::warn!(error = %e, "dropping undecodable agent chunk");
                    }
                    Err(e) => return Some(Err(e)),
                }
                None
            }
            RemoteEvent::Transcript { role, text } => {
                self.transcript.push_delta(role, &text);
                let entries = self.transcript.len();
                self.status.send_if_modified(|status| {
                    let changed = status.transcript_entries != entries;
                    status.transcript_entries = entries;
                    changed
                });
                None
            }
            RemoteEvent::Interrupted => {
                self.dispatch(FloorEvent::Interrupted);
                None
            }
            RemoteEvent::Error(cause) => Some(Err(Error::RemoteSession(cause))),
            RemoteEvent::Closed => Some(Ok(EndReason::RemoteClosed)),
        }
    }

    /// Feed an event through the coordinator and apply its effects
    fn dispatch(&mut self, event: FloorEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for effect in self.coordinator.handle(event) {
                if let Some(follow_up) = self.apply(effect) {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    fn apply(&mut self, effect: Effect) -> Option<FloorEvent> {
        match effect {
            Effect::SendAudio(samples) => {
                self.remote
                    .sink
                    .send_audio(encode_pcm16(&samples), self.input_sample_rate);
            }
            Effect::SendText(text) => {
                self.remote.sink.send_text(&text);
                let nudges = self.coordinator.nudges();
                self.status.send_modify(|status| status.nudges = nudges);
            }
            Effect::StartSource {
                source,
                samples,
                sample_rate,
            } => {
                if let Err(e) = self.sink.start(source, samples, sample_rate) {
                    tracing::warn!(id = %source.id, error = %e, "failed to queue agent audio");
                    // Keep the active set honest so the floor can drain
                    return Some(FloorEvent::SourceEnded(source.id));
                }
            }
            Effect::StopSources(ids) => self.sink.stop(&ids),
            Effect::ArmTimer { token, after } => self.deadlines.arm(token, after),
            Effect::CancelTimer(kind) => self.deadlines.cancel(kind),
            Effect::Transition { from, to } => {
                let at_ms = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.floor_log.push(FloorChange { at_ms, from, to });
                self.status.send_modify(|status| {
                    status.state = to;
                    if to != FloorState::Idle {
                        status.agent_thinking = false;
                    }
                });
            }
            Effect::AgentThinking => {
                self.status.send_modify(|status| status.agent_thinking = true);
            }
            Effect::Meter(meter) => {
                self.status.send_if_modified(|status| {
                    let changed = status.meter != meter;
                    status.meter = meter;
                    changed
                });
            }
        }
        None
    }

    /// Stop playback, cancel timers and release every resource
    ///
    /// Safe to call more than once; only the first call does anything.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for effect in self.coordinator.shutdown() {
            if let Effect::StopSources(ids) = effect {
                self.sink.stop(&ids);
            }
        }
        self.deadlines.clear();
        self.sink.close();

        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        self.frames.close();
        self.remote.sink.close();
        self.remote.events.close();

        tracing::info!(session = %self.id, "session torn down");
    }
}

impl<S: AudioSink> Drop for FloorSession<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
