use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use parley::analysis::{self, HttpAnalyzer};
use parley::floor::{MicCheck, ScheduledSource, Sensitivity, SourceId};
use parley::prompt::{self, Difficulty, Language};
use parley::session::{FloorSession, SessionConfig, SessionOutcome};
use parley::voice::{AudioSink, MicrophoneCapture, OutputMixer, write_wav};
use parley::{Config, Error, remote};

/// Parley - live voice mock interviews with a streaming agent
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// WebSocket URL of the remote agent session
    #[arg(long, env = "PARLEY_REMOTE_URL")]
    remote: Option<String>,

    /// Bearer token for the remote session
    #[arg(long, env = "PARLEY_REMOTE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Grading service URL; the transcript is graded when set
    #[arg(long, env = "PARLEY_ANALYSIS_URL")]
    analysis_url: Option<String>,

    /// Candidate's full name
    #[arg(long)]
    name: Option<String>,

    /// Company the interview is for
    #[arg(long)]
    company: Option<String>,

    /// Position being interviewed for
    #[arg(long)]
    job_title: Option<String>,

    /// Interview language (english, spanish)
    #[arg(long)]
    language: Option<Language>,

    /// Microphone sensitivity (high, normal, low)
    #[arg(long)]
    sensitivity: Option<Sensitivity>,

    /// Grading rigor (student, professional)
    #[arg(long)]
    difficulty: Option<Difficulty>,

    /// Detect speech while the interviewer is talking
    #[arg(long)]
    local_barge_in: bool,

    /// Write the session outcome as JSON
    #[arg(long)]
    transcript_out: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Calibrate the microphone against the selected sensitivity
    CheckMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Record the check to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Play a test sweep through the speaker
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::CheckMic { duration, output } => {
                check_mic(&config, duration, output.as_deref()).await
            }
            Command::TestSpeaker => test_speaker(&config).await,
        };
    }

    let url = config
        .remote
        .url
        .clone()
        .context("no remote session configured (pass --remote or set PARLEY_REMOTE_URL)")?;

    tracing::info!(
        candidate = %config.session.candidate_name,
        language = %config.session.language,
        sensitivity = %config.session.sensitivity,
        "starting interview"
    );

    // Devices first: a missing microphone should fail before we connect
    let (ended_tx, ended_rx) = mpsc::unbounded_channel();
    let speaker = OutputMixer::open(config.audio.output_sample_rate, ended_tx)?;
    let mut microphone = MicrophoneCapture::open(config.audio.input_sample_rate)?;

    let link = remote::ws::connect(
        &url,
        config.remote.token.as_deref(),
        &prompt::system_instructions(&config.session),
        &config.session.interviewer_voice,
    )
    .await?;

    let frames = microphone.start(config.floor.frame_size)?;
    let mut session = FloorSession::new(
        SessionConfig::from_config(&config),
        link,
        speaker,
        frames,
        ended_rx,
    )
    .with_microphone(microphone);

    let mut status = session.status();
    tokio::spawn(async move {
        let mut last = status.borrow().state;
        while status.changed().await.is_ok() {
            let current = status.borrow().clone();
            if current.state != last {
                tracing::info!(state = %current.state, "floor");
                last = current.state;
            }
        }
    });

    println!("Interview in progress. Press Ctrl+C to finish.\n");

    let outcome = session
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            print_transcript(session.transcript().entries(), &config);
            return Err(e.into());
        }
    };

    print_transcript(outcome.transcript.entries(), &config);

    if let Some(path) = &cli.transcript_out {
        write_outcome(path, &outcome)?;
    }

    if config.analysis.url.is_some() {
        grade(&config, &outcome).await?;
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.remote {
        config.remote.url = Some(url.clone());
    }
    if let Some(token) = &cli.token {
        config.remote.token = Some(token.clone());
    }
    if let Some(url) = &cli.analysis_url {
        config.analysis.url = Some(url.clone());
    }
    if let Some(name) = &cli.name {
        config.session.candidate_name.clone_from(name);
    }
    if let Some(company) = &cli.company {
        config.session.company.clone_from(company);
    }
    if let Some(job_title) = &cli.job_title {
        config.session.job_title.clone_from(job_title);
    }
    if let Some(language) = cli.language {
        config.session.language = language;
    }
    if let Some(sensitivity) = cli.sensitivity {
        config.session.sensitivity = sensitivity;
        config.floor.sensitivity = sensitivity;
    }
    if let Some(difficulty) = cli.difficulty {
        config.session.difficulty = difficulty;
    }
    if cli.local_barge_in {
        config.floor.local_barge_in = true;
    }
}

fn print_transcript(entries: &[parley::floor::TranscriptEntry], config: &Config) {
    println!("\n--- Transcript ---");
    for entry in entries {
        let label = match entry.role {
            parley::floor::Role::Agent => config.session.interviewer_name.as_str(),
            parley::floor::Role::Candidate => config.session.candidate_name.as_str(),
        };
        println!("{label}: {}", entry.text);
    }
    println!("------------------");
}

fn write_outcome(path: &std::path::Path, outcome: &SessionOutcome) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(outcome)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Session saved to {}", path.display());
    Ok(())
}

async fn grade(config: &Config, outcome: &SessionOutcome) -> anyhow::Result<()> {
    let analyzer = HttpAnalyzer::new(&config.analysis)?;

    println!("\nAnalyzing interview...");
    match analysis::analyze_interview(&analyzer, &config.session, outcome.transcript.entries())
        .await
    {
        Ok(feedback) => {
            println!("\nScore: {}/100", feedback.score);
            if feedback.is_partial {
                println!("(partial: short answers limit this assessment)");
            }
            if feedback.is_low_power_mode {
                println!("(graded by the fallback model)");
            }
            println!("\n{}", feedback.summary);
            println!("\nStrengths:");
            for strength in &feedback.strengths {
                println!("  + {strength}");
            }
            println!("\nTo improve:");
            for improvement in &feedback.improvements {
                println!("  - {improvement}");
            }
            Ok(())
        }
        Err(Error::InsufficientEvidence(message)) => {
            println!("\n{message}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Calibrate the microphone
#[allow(clippy::future_not_send)]
async fn check_mic(
    config: &Config,
    duration: u64,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let sensitivity = config.session.sensitivity;
    println!("Checking microphone for {duration} seconds (sensitivity: {sensitivity})...");
    println!("Speak normally into your microphone!\n");

    let rate = config.audio.input_sample_rate;
    let mut capture = MicrophoneCapture::open(rate)?;
    let mut frames = capture.start(config.floor.frame_size)?;
    let check = MicCheck::new(sensitivity);

    let mut recorded = Vec::new();
    let mut triggered = 0_usize;
    let mut total = 0_usize;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);

    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, frames.recv()).await {
        let level = check.measure(&frame);
        total += 1;
        if level.would_trigger {
            triggered += 1;
        }

        let bar_len = usize::from(level.meter / 2);
        let bar = "#".repeat(bar_len) + &" ".repeat(50 - bar_len);
        println!(
            "RMS: {:.4} | [{bar}] {:3}{}",
            level.rms,
            level.meter,
            if level.would_trigger { " speech" } else { "" }
        );

        if output.is_some() {
            recorded.extend_from_slice(&frame);
        }
    }

    capture.stop();

    println!("\n---");
    println!("{triggered} of {total} frames crossed the speech threshold.");
    if triggered == 0 {
        println!("Nothing registered as speech. Try --sensitivity high or move closer.");
    }

    if let Some(path) = output {
        write_wav(path, &recorded, capture.sample_rate())?;
        println!("Recording saved to {}", path.display());
    }

    Ok(())
}

/// Play a rising sweep through the output mixer
#[allow(clippy::future_not_send)]
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a tone rising from 440 Hz to 880 Hz\n");

    let rate = config.audio.output_sample_rate;
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let mut speaker = OutputMixer::open(rate, ended_tx)?;

    let samples = sweep(rate, 440.0, 880.0, Duration::from_secs(2));
    let source = ScheduledSource {
        id: SourceId(0),
        start: speaker.now() + Duration::from_millis(100),
        duration: Duration::from_secs(2),
    };
    speaker.start(source, samples.into(), rate)?;

    match tokio::time::timeout(Duration::from_secs(4), ended_rx.recv()).await {
        Ok(Some(_)) => println!("Playback finished."),
        _ => println!("Playback did not report completion; check the output device."),
    }
    speaker.close();

    Ok(())
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn sweep(rate: u32, from_hz: f32, to_hz: f32, length: Duration) -> Vec<f32> {
    let count = (length.as_secs_f32() * rate as f32) as usize;
    let mut phase = 0.0_f32;
    (0..count)
        .map(|i| {
            let progress = i as f32 / count as f32;
            let frequency = (to_hz - from_hz).mul_add(progress, from_hz);
            phase += std::f32::consts::TAU * frequency / rate as f32;
            phase.sin() * 0.3
        })
        .collect()
}
