//! Session task scenarios
//!
//! Runs a full session against an in-memory remote peer and a fake
//! speaker, with the tokio clock paused so timers elapse instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley::Error;
use parley::floor::{FloorState, Role, SourceId, TranscriptEntry};
use parley::remote::channel::{self, RemotePeer};
use parley::remote::{Outbound, RemoteEvent};
use parley::session::{EndReason, FloorSession, SessionConfig, SessionStatus};
use tokio::sync::{mpsc, oneshot, watch};

mod common;

use common::{
    FRAME_TIME, FakeSink, INPUT_RATE, OUTPUT_RATE, SinkLog, agent_speech, session_config,
    silent_frame, voiced_frame,
};

struct Rig {
    session: FloorSession<FakeSink>,
    peer: RemotePeer,
    frames: mpsc::Sender<Vec<f32>>,
    log: Arc<Mutex<SinkLog>>,
    status: watch::Receiver<SessionStatus>,
}

fn rig(config: SessionConfig) -> Rig {
    let (link, peer) = channel::pair(32);
    let (frames, frames_rx) = mpsc::channel(64);
    let (sink, ended, log) = FakeSink::new();
    let session = FloorSession::new(config, link, sink, frames_rx, ended);
    let status = session.status();

    Rig {
        session,
        peer,
        frames,
        log,
        status,
    }
}

fn texts(messages: &[Outbound]) -> Vec<&str> {
    messages
        .iter()
        .filter_map(|m| match m {
            Outbound::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

async fn send_frames(frames: &mpsc::Sender<Vec<f32>>, make: fn() -> Vec<f32>, count: usize) {
    for _ in 0..count {
        frames.send(make()).await.unwrap();
        tokio::time::sleep(FRAME_TIME).await;
    }
}

#[tokio::test(start_paused = true)]
async fn greeting_goes_out_before_anything_else() {
    let config = SessionConfig {
        greeting: Some("Introduce yourself.".to_string()),
        ..session_config()
    };
    let Rig {
        mut session,
        mut peer,
        frames: _frames,
        ..
    } = rig(config);
    let (stop, stopped) = oneshot::channel::<()>();

    let (outcome, ()) = tokio::join!(
        session.run(async {
            let _ = stopped.await;
        }),
        async {
            assert_eq!(
                peer.recv().await,
                Some(Outbound::Text("Introduce yourself.".to_string()))
            );
            stop.send(()).unwrap();
        }
    );

    let outcome = outcome.unwrap();
    assert_eq!(outcome.end_reason, EndReason::Shutdown);
    assert!(outcome.floor_log.is_empty());
}

#[tokio::test(start_paused = true)]
async fn agent_turn_drains_then_nudges_once() {
    let Rig {
        mut session,
        mut peer,
        frames: _frames,
        log,
        status,
    } = rig(session_config());
    let (stop, stopped) = oneshot::channel::<()>();

    let (outcome, ()) = tokio::join!(
        session.run(async {
            let _ = stopped.await;
        }),
        async {
            assert!(peer.speak(&agent_speech(1.2), OUTPUT_RATE).await);

            tokio::time::sleep(Duration::from_millis(1000)).await;
            assert_eq!(status.borrow().state, FloorState::AgentSpeaking);

            tokio::time::sleep(Duration::from_secs(9)).await;
            assert_eq!(status.borrow().state, FloorState::Idle);
            assert_eq!(texts(&peer.drain()), vec!["Are you still there?"]);

            // The watchdog does not re-arm itself
            tokio::time::sleep(Duration::from_secs(20)).await;
            assert!(texts(&peer.drain()).is_empty());
            assert_eq!(status.borrow().nudges, 1);

            stop.send(()).unwrap();
        }
    );

    let outcome = outcome.unwrap();
    assert_eq!(outcome.nudges, 1);

    let states: Vec<_> = outcome.floor_log.iter().map(|c| c.to).collect();
    assert_eq!(
        states,
        vec![
            FloorState::AgentPreparing,
            FloorState::AgentSpeaking,
            FloorState::AgentTrailing,
            FloorState::Idle,
        ]
    );

    let speaking = outcome.floor_log[1].at_ms;
    let trailing = outcome.floor_log[2].at_ms;
    assert_eq!(speaking, 800);
    assert_eq!(trailing, 2000);

    let log = log.lock().unwrap();
    assert_eq!(log.started.len(), 1);
    assert_eq!(log.started[0].start, Duration::from_millis(800));
    assert_eq!(log.closed, 1);
}

#[tokio::test(start_paused = true)]
async fn interruption_silences_playback() {
    let Rig {
        mut session,
        mut peer,
        frames: _frames,
        log,
        status,
    } = rig(session_config());
    let (stop, stopped) = oneshot::channel::<()>();

    let (outcome, ()) = tokio::join!(
        session.run(async {
            let _ = stopped.await;
        }),
        async {
            assert!(peer.speak(&agent_speech(2.0), OUTPUT_RATE).await);
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(status.borrow().state, FloorState::AgentSpeaking);

            assert!(peer.send(RemoteEvent::Interrupted).await);
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(status.borrow().state, FloorState::Idle);
            assert_eq!(log.lock().unwrap().stopped, vec![SourceId(0)]);

            // No drain, no watchdog after an interruption
            tokio::time::sleep(Duration::from_secs(10)).await;
            assert!(texts(&peer.drain()).is_empty());
            assert_eq!(status.borrow().state, FloorState::Idle);

            stop.send(()).unwrap();
        }
    );

    let outcome = outcome.unwrap();
    let last = outcome.floor_log.last().unwrap();
    assert_eq!((last.from, last.to), (FloorState::AgentSpeaking, FloorState::Idle));
    assert_eq!(outcome.nudges, 0);
}

#[tokio::test(start_paused = true)]
async fn candidate_speech_streams_with_pre_roll() {
    let Rig {
        mut session,
        mut peer,
        frames,
        status,
        ..
    } = rig(session_config());
    let (stop, stopped) = oneshot::channel::<()>();

    let (outcome, ()) = tokio::join!(
        session.run(async {
            let _ = stopped.await;
        }),
        async {
            send_frames(&frames, voiced_frame, 5).await;
            assert_eq!(status.borrow().state, FloorState::CandidateSpeaking);

            let audio: Vec<_> = peer
                .drain()
                .into_iter()
                .filter_map(|m| match m {
                    Outbound::Audio { pcm16, sample_rate } => Some((pcm16.len(), sample_rate)),
                    _ => None,
                })
                .collect();
            assert_eq!(audio.len(), 6);
            assert_eq!(audio[2], (16_000, INPUT_RATE));
            assert!(
                audio
                    .iter()
                    .enumerate()
                    .all(|(i, (len, _))| i == 2 || *len == 4096)
            );

            send_frames(&frames, silent_frame, 4).await;
            assert_eq!(status.borrow().state, FloorState::CandidateTrailing);

            tokio::time::sleep(Duration::from_millis(1100)).await;
            assert_eq!(status.borrow().state, FloorState::Idle);
            assert!(status.borrow().agent_thinking);

            assert!(peer.speak(&agent_speech(0.5), OUTPUT_RATE).await);
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(status.borrow().state, FloorState::AgentPreparing);
            assert!(!status.borrow().agent_thinking);

            stop.send(()).unwrap();
        }
    );

    assert_eq!(outcome.unwrap().end_reason, EndReason::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn transcript_deltas_are_aggregated() {
    let Rig {
        mut session,
        peer,
        frames: _frames,
        status,
        ..
    } = rig(session_config());
    let (stop, stopped) = oneshot::channel::<()>();

    let (outcome, ()) = tokio::join!(
        session.run(async {
            let _ = stopped.await;
        }),
        async {
            assert!(peer.transcribe(Role::Agent, "Welcome").await);
            assert!(peer.transcribe(Role::Agent, "to the interview.").await);
            assert!(peer.transcribe(Role::Candidate, "Thank you").await);
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(status.borrow().transcript_entries, 2);
            stop.send(()).unwrap();
        }
    );

    let outcome = outcome.unwrap();
    assert_eq!(
        outcome.transcript.entries(),
        &[
            TranscriptEntry {
                role: Role::Agent,
                text: "Welcome to the interview.".to_string(),
            },
            TranscriptEntry {
                role: Role::Candidate,
                text: "Thank you".to_string(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn undecodable_chunk_is_dropped() {
    let Rig {
        mut session,
        peer,
        frames: _frames,
        log,
        status,
    } = rig(session_config());
    let (stop, stopped) = oneshot::channel::<()>();

    let (outcome, ()) = tokio::join!(
        session.run(async {
            let _ = stopped.await;
        }),
        async {
            assert!(
                peer.send(RemoteEvent::AudioChunk {
                    pcm16: vec![1, 2, 3],
                    sample_rate: OUTPUT_RATE,
                })
                .await
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(log.lock().unwrap().started.is_empty());
            assert_eq!(status.borrow().state, FloorState::Idle);

            assert!(peer.speak(&agent_speech(0.5), OUTPUT_RATE).await);
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(log.lock().unwrap().started.len(), 1);
            stop.send(()).unwrap();
        }
    );

    assert!(outcome.is_ok());

    // Teardown stops whatever was still queued
    let log = log.lock().unwrap();
    assert_eq!(log.stopped, vec![SourceId(0)]);
    assert_eq!(log.closed, 1);
}

#[tokio::test(start_paused = true)]
async fn remote_error_ends_the_session() {
    let Rig {
        mut session,
        peer,
        frames: _frames,
        log,
        ..
    } = rig(session_config());

    let (outcome, ()) = tokio::join!(session.run(std::future::pending()), async {
        assert!(peer.transcribe(Role::Agent, "Hello").await);
        assert!(
            peer.send(RemoteEvent::Error("session expired".to_string()))
                .await
        );
    });

    assert!(matches!(outcome, Err(Error::RemoteSession(_))));
    assert!(session.is_closed());
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(log.lock().unwrap().closed, 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_remote_closes_the_session() {
    let Rig {
        mut session,
        peer,
        frames: _frames,
        ..
    } = rig(session_config());

    let (outcome, ()) = tokio::join!(session.run(std::future::pending()), async move {
        drop(peer);
    });

    assert_eq!(outcome.unwrap().end_reason, EndReason::RemoteClosed);
}

#[tokio::test(start_paused = true)]
async fn closed_microphone_ends_the_session() {
    let Rig {
        mut session,
        peer: _peer,
        frames,
        ..
    } = rig(session_config());
    drop(frames);

    let outcome = session.run(std::future::pending()).await.unwrap();
    assert_eq!(outcome.end_reason, EndReason::MicrophoneClosed);
}
