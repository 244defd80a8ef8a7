//! Turn coordinator
//!
//! The only writer of [`FloorState`]. Every input is a typed
//! [`FloorEvent`]; every consequence is returned as an [`Effect`] for the
//! session task to carry out. Nothing in here awaits or touches a device,
//! so a transition is fully determined by the current state and the event.

use std::sync::Arc;
use std::time::Duration;

use super::FloorConfig;
use super::preroll::PreRollBuffer;
use super::scheduler::{PlaybackScheduler, ScheduledSource, SourceId};
use super::state::FloorState;
use super::timer::{TimerKind, TimerSlots, TimerToken};
use super::vad::{ThresholdTable, VadTransition, VoiceActivityDetector};
use super::watchdog::SilenceWatchdog;

/// Input to the coordinator
#[derive(Debug, Clone)]
pub enum FloorEvent {
    /// A microphone frame captured `at` (session clock)
    Frame { samples: Vec<f32>, at: Duration },
    /// A decoded agent audio chunk; `output_now` is the output clock reading
    Chunk {
        samples: Arc<[f32]>,
        sample_rate: u32,
        output_now: Duration,
    },
    /// The output device finished playing a source
    SourceEnded(SourceId),
    /// A deferred timer elapsed
    TimerFired(TimerToken),
    /// The remote session cut the agent off
    Interrupted,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Transmit microphone audio (already gated)
    SendAudio(Vec<f32>),
    /// Transmit a text prompt
    SendText(String),
    /// Queue a source on the output device
    StartSource {
        source: ScheduledSource,
        samples: Arc<[f32]>,
        sample_rate: u32,
    },
    /// Silence sources immediately
    StopSources(Vec<SourceId>),
    ArmTimer {
        token: TimerToken,
        after: Duration,
    },
    CancelTimer(TimerKind),
    /// Floor changed hands
    Transition { from: FloorState, to: FloorState },
    /// Candidate turn looks complete; the agent is probably thinking
    AgentThinking,
    /// Microphone meter, 0-100
    Meter(u8),
}

/// Duration of `len` samples at `sample_rate`
#[must_use]
pub fn chunk_duration(len: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = (len as u128) * 1_000_000_000 / u128::from(sample_rate);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Floor-ownership state machine
#[derive(Debug)]
pub struct Coordinator {
    state: FloorState,
    vad: VoiceActivityDetector,
    preroll: PreRollBuffer,
    scheduler: PlaybackScheduler,
    watchdog: SilenceWatchdog,
    timers: TimerSlots,
    config: FloorConfig,
    nudge_prompt: String,
}

impl Coordinator {
    /// Create a coordinator using the live threshold table
    #[must_use]
    pub fn new(config: FloorConfig, nudge_prompt: impl Into<String>) -> Self {
        let vad = VoiceActivityDetector::new(
            &ThresholdTable::LIVE,
            config.sensitivity,
            config.debounce,
            config.hangover,
        );

        Self {
            state: FloorState::Idle,
            vad,
            preroll: PreRollBuffer::new(config.preroll_samples()),
            scheduler: PlaybackScheduler::new(config.lead_time),
            watchdog: SilenceWatchdog::new(config.silence_nudge),
            timers: TimerSlots::default(),
            config,
            nudge_prompt: nudge_prompt.into(),
        }
    }

    /// Apply one event and return the effects it requires
    pub fn handle(&mut self, event: FloorEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            FloorEvent::Frame { samples, at } => self.on_frame(samples, at, &mut effects),
            FloorEvent::Chunk {
                samples,
                sample_rate,
                output_now,
            } => self.on_chunk(samples, sample_rate, output_now, &mut effects),
            FloorEvent::SourceEnded(id) => self.on_source_ended(id, &mut effects),
            FloorEvent::TimerFired(token) => self.on_timer(token, &mut effects),
            FloorEvent::Interrupted => self.on_interrupted(&mut effects),
        }

        debug_assert!(
            self.state != FloorState::AgentSpeaking || !self.scheduler.is_empty(),
            "agent speaking with no active source"
        );

        effects
    }

    /// Stop all playback and cancel every timer
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        let stopped = self.scheduler.stop_all();
        if !stopped.is_empty() {
            effects.push(Effect::StopSources(stopped));
        }
        for kind in self.timers.armed() {
            self.timers.cancel(kind);
            effects.push(Effect::CancelTimer(kind));
        }

        effects
    }

    fn on_frame(&mut self, samples: Vec<f32>, at: Duration, effects: &mut Vec<Effect>) {
        self.preroll.push(&samples);

        let locked = self.state.is_locked();
        let detection_locked = locked && !self.config.local_barge_in;
        let reading = self.vad.process(&samples, at, detection_locked);
        effects.push(Effect::Meter(reading.meter));

        match reading.transition {
            Some(VadTransition::Onset) => self.on_onset(effects),
            Some(VadTransition::Offset) => self.on_offset(effects),
            None => {}
        }

        let outbound = if locked {
            vec![0.0; samples.len()]
        } else {
            samples
        };
        effects.push(Effect::SendAudio(outbound));
    }

    fn on_onset(&mut self, effects: &mut Vec<Effect>) {
        let from = self.state;

        self.cancel_watchdog(effects);
        self.cancel_timer(TimerKind::CandidateGrace, effects);

        if from.is_agent() || !self.scheduler.is_empty() {
            let stopped = self.scheduler.stop_all();
            tracing::info!(%from, stopped = stopped.len(), "barge-in, stopping agent audio");
            if !stopped.is_empty() {
                effects.push(Effect::StopSources(stopped));
            }
            self.cancel_timer(TimerKind::AgentStart, effects);
            self.cancel_timer(TimerKind::Drain, effects);
        }

        if let Some(preroll) = self.preroll.take_once() {
            effects.push(Effect::SendAudio(preroll));
        }

        self.transition(FloorState::CandidateSpeaking, effects);
    }

    fn on_offset(&mut self, effects: &mut Vec<Effect>) {
        self.preroll.rearm();

        if self.state == FloorState::CandidateSpeaking {
            let token = self.timers.arm(TimerKind::CandidateGrace);
            effects.push(Effect::ArmTimer {
                token,
                after: self.config.candidate_grace,
            });
            self.transition(FloorState::CandidateTrailing, effects);
        }
    }

    fn on_chunk(
        &mut self,
        samples: Arc<[f32]>,
        sample_rate: u32,
        output_now: Duration,
        effects: &mut Vec<Effect>,
    ) {
        if samples.is_empty() {
            return;
        }

        self.cancel_watchdog(effects);
        let duration = chunk_duration(samples.len(), sample_rate);

        match self.state {
            FloorState::CandidateSpeaking => {
                tracing::debug!(
                    duration_ms = duration.as_millis(),
                    "agent chunk dropped, candidate holds the floor"
                );
            }
            FloorState::Idle | FloorState::CandidateTrailing => {
                self.cancel_timer(TimerKind::CandidateGrace, effects);

                let source = self.scheduler.schedule(duration, output_now);
                effects.push(Effect::StartSource {
                    source,
                    samples,
                    sample_rate,
                });

                let token = self.timers.arm(TimerKind::AgentStart);
                effects.push(Effect::ArmTimer {
                    token,
                    after: source.start.saturating_sub(output_now),
                });

                self.transition(FloorState::AgentPreparing, effects);
            }
            FloorState::AgentPreparing | FloorState::AgentSpeaking => {
                let source = self.scheduler.schedule(duration, output_now);
                effects.push(Effect::StartSource {
                    source,
                    samples,
                    sample_rate,
                });
            }
            FloorState::AgentTrailing => {
                self.cancel_timer(TimerKind::Drain, effects);

                let source = self.scheduler.resume(duration, output_now);
                effects.push(Effect::StartSource {
                    source,
                    samples,
                    sample_rate,
                });

                self.transition(FloorState::AgentSpeaking, effects);
            }
        }
    }

    fn on_source_ended(&mut self, id: SourceId, effects: &mut Vec<Effect>) {
        if !self.scheduler.finish(id) {
            tracing::trace!(%id, "ended notification for inactive source ignored");
            return;
        }

        if self.scheduler.is_empty() && self.state == FloorState::AgentSpeaking {
            let token = self.timers.arm(TimerKind::Drain);
            effects.push(Effect::ArmTimer {
                token,
                after: self.config.drain_delay,
            });
            self.transition(FloorState::AgentTrailing, effects);
        }
    }

    fn on_timer(&mut self, token: TimerToken, effects: &mut Vec<Effect>) {
        if token.kind == TimerKind::Watchdog {
            let floor_free = self.state == FloorState::Idle
                && self.scheduler.is_empty()
                && !self.vad.is_speaking();
            if self.watchdog.fire(token, &mut self.timers, floor_free) {
                tracing::info!("candidate silent, sending check-in prompt");
                effects.push(Effect::SendText(self.nudge_prompt.clone()));
            }
            return;
        }

        if !self.timers.accept(token) {
            tracing::trace!(kind = %token.kind, generation = token.generation, "stale timer ignored");
            return;
        }

        match (token.kind, self.state) {
            (TimerKind::CandidateGrace, FloorState::CandidateTrailing) => {
                effects.push(Effect::AgentThinking);
                self.transition(FloorState::Idle, effects);
            }
            (TimerKind::AgentStart, FloorState::AgentPreparing) => {
                if self.scheduler.is_empty() {
                    self.scheduler.end_turn();
                    self.transition(FloorState::Idle, effects);
                } else {
                    self.transition(FloorState::AgentSpeaking, effects);
                }
            }
            (TimerKind::Drain, FloorState::AgentTrailing) => {
                self.scheduler.end_turn();
                self.transition(FloorState::Idle, effects);

                let (token, after) = self.watchdog.arm(&mut self.timers);
                effects.push(Effect::ArmTimer { token, after });
            }
            (kind, state) => {
                tracing::trace!(%kind, %state, "timer fired in unrelated state");
            }
        }
    }

    fn on_interrupted(&mut self, effects: &mut Vec<Effect>) {
        let stopped = self.scheduler.stop_all();
        tracing::info!(state = %self.state, stopped = stopped.len(), "agent interrupted");
        if !stopped.is_empty() {
            effects.push(Effect::StopSources(stopped));
        }

        self.cancel_watchdog(effects);
        self.cancel_timer(TimerKind::AgentStart, effects);
        self.cancel_timer(TimerKind::Drain, effects);

        if self.state.is_agent() {
            self.transition(FloorState::Idle, effects);
        }
    }

    fn cancel_timer(&mut self, kind: TimerKind, effects: &mut Vec<Effect>) {
        if self.timers.cancel(kind) {
            effects.push(Effect::CancelTimer(kind));
        }
    }

    fn cancel_watchdog(&mut self, effects: &mut Vec<Effect>) {
        if self.watchdog.cancel(&mut self.timers) {
            effects.push(Effect::CancelTimer(TimerKind::Watchdog));
        }
    }

    fn transition(&mut self, to: FloorState, effects: &mut Vec<Effect>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(%from, %to, "floor transition");
        effects.push(Effect::Transition { from, to });
    }

    #[must_use]
    pub const fn state(&self) -> FloorState {
        self.state
    }

    /// Number of sources still queued or playing
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.scheduler.active_len()
    }

    #[must_use]
    pub const fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    #[must_use]
    pub const fn is_timer_armed(&self, kind: TimerKind) -> bool {
        self.timers.is_armed(kind)
    }

    /// Check-ins sent so far
    #[must_use]
    pub const fn nudges(&self) -> u32 {
        self.watchdog.nudges()
    }

    #[must_use]
    pub const fn config(&self) -> &FloorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Coordinator {
        Coordinator::new(FloorConfig::default(), "are you there?")
    }

    fn armed(effects: &[Effect], kind: TimerKind) -> Option<TimerToken> {
        effects.iter().find_map(|e| match e {
            Effect::ArmTimer { token, .. } if token.kind == kind => Some(*token),
            _ => None,
        })
    }

    fn chunk(seconds: f32) -> FloorEvent {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = (24_000.0 * seconds) as usize;
        FloorEvent::Chunk {
            samples: vec![0.1; len].into(),
            sample_rate: 24_000,
            output_now: Duration::ZERO,
        }
    }

    #[test]
    fn chunk_duration_is_exact() {
        assert_eq!(chunk_duration(24_000, 24_000), Duration::from_secs(1));
        assert_eq!(chunk_duration(2048, 16_000), Duration::from_millis(128));
        assert_eq!(chunk_duration(10, 0), Duration::ZERO);
    }

    #[test]
    fn locked_frames_are_muted() {
        let mut coordinator = coordinator();
        coordinator.handle(chunk(1.0));
        assert_eq!(coordinator.state(), FloorState::AgentPreparing);

        let effects = coordinator.handle(FloorEvent::Frame {
            samples: vec![0.4; 64],
            at: Duration::ZERO,
        });
        assert!(effects.contains(&Effect::SendAudio(vec![0.0; 64])));
        assert!(effects.contains(&Effect::Meter(100)));
    }

    #[test]
    fn stale_drain_timer_is_ignored() {
        let mut coordinator = coordinator();
        let effects = coordinator.handle(chunk(0.5));
        let start = armed(&effects, TimerKind::AgentStart).unwrap();
        coordinator.handle(FloorEvent::TimerFired(start));

        let ended = coordinator.handle(FloorEvent::SourceEnded(SourceId(0)));
        let drain = armed(&ended, TimerKind::Drain).unwrap();

        // More audio for the same turn arrives before the drain fires
        coordinator.handle(chunk(0.5));
        assert_eq!(coordinator.state(), FloorState::AgentSpeaking);

        let effects = coordinator.handle(FloorEvent::TimerFired(drain));
        assert!(effects.is_empty());
        assert_eq!(coordinator.state(), FloorState::AgentSpeaking);
    }

    #[test]
    fn chunk_during_candidate_speech_is_dropped() {
        let mut coordinator = coordinator();
        for i in 0..4 {
            coordinator.handle(FloorEvent::Frame {
                samples: vec![0.3; 2048],
                at: Duration::from_millis(128) * i,
            });
        }
        assert_eq!(coordinator.state(), FloorState::CandidateSpeaking);

        let effects = coordinator.handle(chunk(1.0));
        assert!(!effects.iter().any(|e| matches!(e, Effect::StartSource { .. })));
        assert_eq!(coordinator.active_sources(), 0);
    }

    #[test]
    fn shutdown_cancels_everything() {
        let mut coordinator = coordinator();
        coordinator.handle(chunk(1.0));
        coordinator.handle(chunk(1.0));

        let effects = coordinator.shutdown();
        assert!(effects.contains(&Effect::StopSources(vec![SourceId(0), SourceId(1)])));
        assert!(effects.contains(&Effect::CancelTimer(TimerKind::AgentStart)));
        assert!(coordinator.shutdown().is_empty());
    }
}
