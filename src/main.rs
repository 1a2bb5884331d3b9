//! Spoken interview client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse arguments and load [`AppConfig`] (a missing file yields defaults).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the [`VoiceEngine`] around the cpal microphone and rodio player.
//! 5. Connect the WebSocket transport.
//! 6. Spawn the engine and start listening.
//! 7. Print interviewer replies until the session ends; Ctrl-C stops it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use interview_voice::{
    audio::CpalMicrophone,
    config::{AppConfig, AppPaths},
    engine::{EngineError, EngineHandle, EngineNotice, VoiceEngine},
    playback::RodioPlayer,
    transport::WsTransport,
};

#[derive(Parser, Debug)]
#[command(name = "interview-voice", version)]
#[command(about = "Hands-free spoken interview with an AI interviewer")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    config: Option<PathBuf>,

    /// WebSocket URL of the interview service
    #[arg(long)]
    url: Option<String>,

    /// Input device name (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    /// Role being interviewed for
    #[arg(long)]
    job_role: Option<String>,

    /// Company context given to the interviewer
    #[arg(long)]
    company: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_config: bool,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments + configuration
    let args = Args::parse();

    if args.list_devices {
        for name in CpalMicrophone::device_names()? {
            println!("{name}");
        }
        return Ok(());
    }

    let settings_path = AppPaths::settings_path(args.config.clone());
    let mut config = AppConfig::load_from(&settings_path)
        .with_context(|| format!("failed to load {}", settings_path.display()))?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    if args.save_config {
        config.save_to(&settings_path)?;
        log::info!("settings written to {}", settings_path.display());
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(url) = &args.url {
        config.transport.url = url.clone();
    }
    if let Some(device) = &args.device {
        config.audio.input_device = Some(device.clone());
    }
    if let Some(role) = &args.job_role {
        config.interview.job_role = role.clone();
    }
    if let Some(company) = &args.company {
        config.interview.company_context = company.clone();
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

async fn run(config: AppConfig) -> Result<()> {
    // 4. Engine
    let mic = CpalMicrophone::new(config.audio.input_device.clone(), config.audio.frame_ms);
    let (engine, notices) =
        VoiceEngine::new(config.clone(), Box::new(mic), Box::new(RodioPlayer::new()));

    // 5. Transport
    let transport = WsTransport::connect(
        &config.transport.url,
        Duration::from_secs(config.transport.connect_timeout_secs),
        engine.transport_callback(),
    )
    .await
    .context("could not reach the interview service")?;

    // 6. Spawn + start
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run(Box::new(transport)));
    handle.start()?;

    println!(
        "Interview for {} ({}). Speak when ready; Ctrl-C ends the session.",
        config.interview.job_role, config.interview.company_context
    );

    // 7. Notices
    report_notices(notices, &handle).await;

    if let Err(e) = engine_task.await {
        log::error!("engine task failed: {e}");
    }
    Ok(())
}

async fn report_notices(mut notices: mpsc::UnboundedReceiver<EngineNotice>, handle: &EngineHandle) {
    loop {
        tokio::select! {
            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                if print_notice(notice, handle) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                if handle.stop().is_err() {
                    break;
                }
            }
        }
    }
}

/// Print one notice.  Returns `true` once the session is over.
fn print_notice(notice: EngineNotice, handle: &EngineHandle) -> bool {
    match notice {
        EngineNotice::SpeechStarted => log::debug!("speech started"),
        EngineNotice::SegmentSent { bytes, .. } => {
            log::info!("answer sent ({bytes} bytes), waiting for the interviewer");
        }
        EngineNotice::Reply { text, .. } if !text.is_empty() => {
            println!("\nInterviewer: {text}\n");
        }
        EngineNotice::Error(err @ EngineError::Device(_)) => {
            eprintln!("error: {err}");
            // Nothing to listen with; end rather than wait forever.
            let _ = handle.stop();
        }
        EngineNotice::Error(err) => eprintln!("error: {err}"),
        EngineNotice::SessionEnded { feedback } => {
            match feedback {
                Some(feedback) => println!("\n=== Feedback ===\n{feedback}"),
                None => println!("\nSession ended."),
            }
            return true;
        }
        _ => {}
    }
    false
}
