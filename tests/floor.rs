//! Floor coordinator scenarios
//!
//! Drives the coordinator directly with frames, chunks and timer firings;
//! no runtime or audio hardware involved.

use std::time::Duration;

use parley::floor::{
    Coordinator, Effect, FloorConfig, FloorEvent, FloorState, SourceId, TimerKind, TimerToken,
};

mod common;

use common::{FRAME_TIME, OUTPUT_RATE, agent_speech, silent_frame, voiced_frame};

const NUDGE: &str = "Are you still there?";

struct Harness {
    coordinator: Coordinator,
    next_frame: u32,
}

impl Harness {
    fn new(config: FloorConfig) -> Self {
        Self {
            coordinator: Coordinator::new(config, NUDGE),
            next_frame: 0,
        }
    }

    fn frame(&mut self, samples: Vec<f32>) -> Vec<Effect> {
        let at = FRAME_TIME * self.next_frame;
        self.next_frame += 1;
        self.coordinator.handle(FloorEvent::Frame { samples, at })
    }

    fn frames(&mut self, make: fn() -> Vec<f32>, count: usize) -> Vec<Effect> {
        (0..count).flat_map(|_| self.frame(make())).collect()
    }

    fn chunk(&mut self, seconds: f32, output_now: Duration) -> Vec<Effect> {
        self.coordinator.handle(FloorEvent::Chunk {
            samples: agent_speech(seconds).into(),
            sample_rate: OUTPUT_RATE,
            output_now,
        })
    }

    fn fire(&mut self, token: TimerToken) -> Vec<Effect> {
        self.coordinator.handle(FloorEvent::TimerFired(token))
    }

    fn state(&self) -> FloorState {
        self.coordinator.state()
    }
}

fn armed(effects: &[Effect], kind: TimerKind) -> Option<(TimerToken, Duration)> {
    effects.iter().find_map(|e| match e {
        Effect::ArmTimer { token, after } if token.kind == kind => Some((*token, *after)),
        _ => None,
    })
}

fn transitions(effects: &[Effect]) -> Vec<(FloorState, FloorState)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Transition { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

fn outbound(effects: &[Effect]) -> Vec<&Vec<f32>> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::SendAudio(samples) => Some(samples),
            _ => None,
        })
        .collect()
}

fn started(effects: &[Effect]) -> Vec<SourceId> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::StartSource { source, .. } => Some(source.id),
            _ => None,
        })
        .collect()
}

/// Play a single chunk through to the end of the agent turn
fn complete_agent_turn(harness: &mut Harness) -> TimerToken {
    let effects = harness.chunk(1.0, Duration::ZERO);
    let id = started(&effects)[0];
    let (start, _) = armed(&effects, TimerKind::AgentStart).unwrap();
    harness.fire(start);
    let ended = harness.coordinator.handle(FloorEvent::SourceEnded(id));
    let (drain, _) = armed(&ended, TimerKind::Drain).unwrap();
    let effects = harness.fire(drain);
    armed(&effects, TimerKind::Watchdog).unwrap().0
}

#[test]
fn agent_turn_runs_its_full_lifecycle() {
    let mut harness = Harness::new(FloorConfig::default());

    let effects = harness.chunk(1.2, Duration::ZERO);
    let started = effects
        .iter()
        .find_map(|e| match e {
            Effect::StartSource { source, .. } => Some(*source),
            _ => None,
        })
        .unwrap();
    assert_eq!(started.start, Duration::from_millis(800));
    assert_eq!(started.duration, Duration::from_millis(1200));

    let (start, after) = armed(&effects, TimerKind::AgentStart).unwrap();
    assert_eq!(after, Duration::from_millis(800));
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::Idle, FloorState::AgentPreparing)]
    );

    let effects = harness.fire(start);
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::AgentPreparing, FloorState::AgentSpeaking)]
    );

    let effects = harness
        .coordinator
        .handle(FloorEvent::SourceEnded(started.id));
    let (drain, after) = armed(&effects, TimerKind::Drain).unwrap();
    assert_eq!(after, Duration::from_millis(600));
    assert_eq!(harness.state(), FloorState::AgentTrailing);

    let effects = harness.fire(drain);
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::AgentTrailing, FloorState::Idle)]
    );
    let watchdogs: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, Effect::ArmTimer { token, .. } if token.kind == TimerKind::Watchdog))
        .collect();
    assert_eq!(watchdogs.len(), 1);

    let (watchdog, after) = armed(&effects, TimerKind::Watchdog).unwrap();
    assert_eq!(after, Duration::from_millis(3500));

    let effects = harness.fire(watchdog);
    assert_eq!(effects, vec![Effect::SendText(NUDGE.to_string())]);
    assert_eq!(harness.coordinator.nudges(), 1);

    // A duplicate firing never produces a second nudge
    assert!(harness.fire(watchdog).is_empty());
    assert_eq!(harness.coordinator.nudges(), 1);
}

#[test]
fn short_excursions_never_take_the_floor() {
    let mut harness = Harness::new(FloorConfig::default());

    for _ in 0..10 {
        let mut effects = harness.frames(voiced_frame, 2);
        effects.extend(harness.frame(silent_frame()));
        assert!(transitions(&effects).is_empty());
    }

    assert_eq!(harness.state(), FloorState::Idle);
}

#[test]
fn onset_confirms_after_debounce() {
    let mut harness = Harness::new(FloorConfig::default());

    assert!(transitions(&harness.frames(voiced_frame, 2)).is_empty());

    let effects = harness.frame(voiced_frame());
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::Idle, FloorState::CandidateSpeaking)]
    );
}

#[test]
fn pre_roll_is_sent_once_per_onset() {
    let mut harness = Harness::new(FloorConfig::default());

    let mut effects = harness.frames(voiced_frame, 6);
    let preroll_sends = |effects: &[Effect]| {
        outbound(effects)
            .into_iter()
            .filter(|samples| samples.len() == 8000)
            .count()
    };
    assert_eq!(preroll_sends(&effects), 1);

    // Pre-roll goes out ahead of the frame that confirmed the onset
    let sends = outbound(&effects);
    assert_eq!(sends[2].len(), 8000);
    assert_eq!(sends[3].len(), 2048);

    effects = harness.frames(silent_frame, 4);
    assert_eq!(harness.state(), FloorState::CandidateTrailing);
    assert_eq!(preroll_sends(&effects), 0);

    effects = harness.frames(voiced_frame, 3);
    assert_eq!(harness.state(), FloorState::CandidateSpeaking);
    assert_eq!(preroll_sends(&effects), 1);
}

#[test]
fn pre_roll_covers_the_same_window_at_any_input_rate() {
    let config = FloorConfig {
        input_sample_rate: 48_000,
        ..FloorConfig::default()
    };
    let mut harness = Harness::new(config);

    let effects = harness.frames(voiced_frame, 3);
    let sends = outbound(&effects);
    assert_eq!(sends[2].len(), 24_000);
    assert_eq!(harness.state(), FloorState::CandidateSpeaking);
}

#[test]
fn candidate_turn_ends_with_agent_thinking() {
    let mut harness = Harness::new(FloorConfig::default());
    harness.frames(voiced_frame, 4);

    let effects = harness.frames(silent_frame, 4);
    let (grace, after) = armed(&effects, TimerKind::CandidateGrace).unwrap();
    assert_eq!(after, Duration::from_millis(1000));
    assert_eq!(harness.state(), FloorState::CandidateTrailing);

    let effects = harness.fire(grace);
    assert!(effects.contains(&Effect::AgentThinking));
    assert_eq!(harness.state(), FloorState::Idle);
}

#[test]
fn agent_reply_during_grace_takes_the_floor() {
    let mut harness = Harness::new(FloorConfig::default());
    harness.frames(voiced_frame, 4);
    let effects = harness.frames(silent_frame, 4);
    let (grace, _) = armed(&effects, TimerKind::CandidateGrace).unwrap();

    let effects = harness.chunk(0.5, Duration::ZERO);
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::CandidateGrace)));
    assert_eq!(harness.state(), FloorState::AgentPreparing);

    assert!(harness.fire(grace).is_empty());
    assert_eq!(harness.state(), FloorState::AgentPreparing);
}

#[test]
fn locked_floor_mutes_and_ignores_the_microphone() {
    let mut harness = Harness::new(FloorConfig::default());
    let effects = harness.chunk(3.0, Duration::ZERO);
    let (start, _) = armed(&effects, TimerKind::AgentStart).unwrap();
    harness.fire(start);

    let effects = harness.frames(voiced_frame, 10);
    assert!(transitions(&effects).is_empty());
    for samples in outbound(&effects) {
        assert_eq!(*samples, vec![0.0; samples.len()]);
    }
    assert!(effects.iter().any(|e| matches!(e, Effect::Meter(m) if *m > 0)));
    assert_eq!(harness.state(), FloorState::AgentSpeaking);
}

#[test]
fn local_barge_in_stops_agent_within_debounce() {
    let config = FloorConfig {
        local_barge_in: true,
        ..FloorConfig::default()
    };
    let mut harness = Harness::new(config);

    let effects = harness.chunk(2.0, Duration::ZERO);
    let (start, _) = armed(&effects, TimerKind::AgentStart).unwrap();
    harness.fire(start);
    harness.chunk(1.0, Duration::ZERO);
    assert_eq!(harness.coordinator.active_sources(), 2);

    assert!(transitions(&harness.frames(voiced_frame, 2)).is_empty());

    let effects = harness.frame(voiced_frame());
    assert!(effects.contains(&Effect::StopSources(vec![SourceId(0), SourceId(1)])));
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::AgentSpeaking, FloorState::CandidateSpeaking)]
    );
    assert_eq!(harness.coordinator.active_sources(), 0);

    // Late ended notifications for the stopped sources change nothing
    assert!(
        harness
            .coordinator
            .handle(FloorEvent::SourceEnded(SourceId(0)))
            .is_empty()
    );
    assert_eq!(harness.state(), FloorState::CandidateSpeaking);
}

#[test]
fn interruption_returns_floor_and_ignores_late_ends() {
    let mut harness = Harness::new(FloorConfig::default());
    let effects = harness.chunk(1.0, Duration::ZERO);
    let (start, _) = armed(&effects, TimerKind::AgentStart).unwrap();
    harness.fire(start);
    harness.chunk(1.0, Duration::ZERO);

    let effects = harness.coordinator.handle(FloorEvent::Interrupted);
    assert!(effects.contains(&Effect::StopSources(vec![SourceId(0), SourceId(1)])));
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::AgentSpeaking, FloorState::Idle)]
    );

    for id in [SourceId(0), SourceId(1)] {
        assert!(harness.coordinator.handle(FloorEvent::SourceEnded(id)).is_empty());
    }
    assert_eq!(harness.state(), FloorState::Idle);
    assert!(!harness.coordinator.is_timer_armed(TimerKind::Watchdog));
}

#[test]
fn speech_cancels_the_watchdog() {
    let mut harness = Harness::new(FloorConfig::default());
    let watchdog = complete_agent_turn(&mut harness);
    assert!(harness.coordinator.is_timer_armed(TimerKind::Watchdog));

    let effects = harness.frames(voiced_frame, 3);
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::Watchdog)));

    assert!(harness.fire(watchdog).is_empty());
    assert_eq!(harness.coordinator.nudges(), 0);
}

#[test]
fn agent_audio_cancels_the_watchdog() {
    let mut harness = Harness::new(FloorConfig::default());
    let watchdog = complete_agent_turn(&mut harness);

    let effects = harness.chunk(0.5, Duration::from_secs(3));
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::Watchdog)));
    assert!(harness.fire(watchdog).is_empty());
}

#[test]
fn turn_is_scheduled_gaplessly() {
    let mut harness = Harness::new(FloorConfig::default());

    let mut starts = Vec::new();
    for now_ms in [0, 100, 250] {
        let effects = harness.chunk(0.5, Duration::from_millis(now_ms));
        for effect in effects {
            if let Effect::StartSource { source, .. } = effect {
                starts.push((source.start, source.end()));
            }
        }
    }

    assert_eq!(starts[0].0, Duration::from_millis(800));
    for pair in starts.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
}

#[test]
fn next_turn_gets_fresh_lead_time() {
    let mut harness = Harness::new(FloorConfig::default());
    complete_agent_turn(&mut harness);

    let effects = harness.chunk(0.5, Duration::from_secs(5));
    let source = effects
        .iter()
        .find_map(|e| match e {
            Effect::StartSource { source, .. } => Some(*source),
            _ => None,
        })
        .unwrap();
    assert_eq!(source.start, Duration::from_millis(5800));
}

#[test]
fn lead_window_with_nothing_queued_returns_to_idle() {
    let mut harness = Harness::new(FloorConfig::default());
    let effects = harness.chunk(0.5, Duration::ZERO);
    let (start, _) = armed(&effects, TimerKind::AgentStart).unwrap();

    // The source was dropped before it ever played
    harness
        .coordinator
        .handle(FloorEvent::SourceEnded(SourceId(0)));
    assert_eq!(harness.state(), FloorState::AgentPreparing);

    let effects = harness.fire(start);
    assert_eq!(
        transitions(&effects),
        vec![(FloorState::AgentPreparing, FloorState::Idle)]
    );
}
