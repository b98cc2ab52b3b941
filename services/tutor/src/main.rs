use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::time::ChronoLocal;
use voice_session_core::{
    ContentGenerator, GeminiTextClient, LiveSessionConfig, LiveTransport, Role, SessionHandle,
    SessionState, VoiceSessionController,
};
use voice_tutor::capture::CpalCapture;
use voice_tutor::config::{CHAT_PROMPT, Config, LIVE_PROMPT};
use voice_tutor::output::CpalOutput;
use voice_tutor::{ask, prompt_loader};

#[derive(Parser)]
#[command(name = "voice-tutor", version, about = "A spoken and written homework tutor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hold a live voice conversation with the tutor
    Voice {
        /// Microphone to use instead of the system default
        #[arg(long)]
        input_device: Option<String>,
        /// Speaker to use instead of the system default
        #[arg(long)]
        output_device: Option<String>,
    },
    /// Ask a single written question
    Ask {
        prompt: String,
        /// Image or document to send with the question
        #[arg(long)]
        image: Option<PathBuf>,
        /// JSON schema file; the answer is returned as matching JSON
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// List audio devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();

    match args.command {
        Command::Devices => {
            println!("Inputs:\n{}", gemini_live_utils::device::get_available_inputs()?);
            println!("Outputs:\n{}", gemini_live_utils::device::get_available_outputs()?);
            Ok(())
        }
        Command::Voice {
            input_device,
            output_device,
        } => {
            let prompts = load_prompts(&config)?;
            run_voice(&config, &prompts, input_device, output_device).await
        }
        Command::Ask {
            prompt,
            image,
            schema,
        } => {
            let prompts = load_prompts(&config)?;
            let request = ask::build_request(
                &prompt,
                prompt_loader::instructions(&prompts, CHAT_PROMPT),
                image.as_deref(),
                schema.as_deref(),
            )?;
            let generator =
                GeminiTextClient::new(config.gemini_api_key.clone(), config.chat_model.clone());
            let content = generator
                .generate(request)
                .await
                .context("Failed to get an answer from the tutor")?;
            println!("{}", ask::render(&content)?);
            Ok(())
        }
    }
}

fn load_prompts(config: &Config) -> Result<HashMap<String, String>> {
    let prompts = prompt_loader::load_prompts(&config.prompts_dir)
        .context("Failed to load tutor prompts")?;
    tracing::info!("Loaded {} prompts successfully.", prompts.len());
    Ok(prompts)
}

async fn run_voice(
    config: &Config,
    prompts: &HashMap<String, String>,
    input_device: Option<String>,
    output_device: Option<String>,
) -> Result<()> {
    let mut live_config = LiveSessionConfig::new(config.live_model.as_str());
    match prompt_loader::instructions(prompts, LIVE_PROMPT) {
        Some(instructions) => live_config = live_config.with_instructions(instructions),
        None => tracing::warn!("No {} prompt found, using model defaults", LIVE_PROMPT),
    }
    if let Some(ref voice) = config.live_voice {
        live_config = live_config.with_voice(voice.clone());
    }

    let controller = VoiceSessionController::new(
        LiveTransport::new(&config.gemini_api_key),
        CpalCapture::new(input_device),
        CpalOutput::new(output_device),
        live_config,
    );
    let (handle, commands) = controller.handle(8);
    handle.start().await?;
    println!("Connecting... press Ctrl-C to end the conversation.");

    // The controller owns the device streams, so it stays on this task.
    let follower = tokio::spawn(follow_session(handle));
    controller.run(commands).await;
    follower.await.context("session follower panicked")?;

    tracing::info!("Shutting down...");
    Ok(())
}

/// Prints the conversation as turns are sealed and stops on Ctrl-C.
/// Returns, dropping the handle, once the session is back to idle.
async fn follow_session(handle: SessionHandle) {
    let mut view = handle.subscribe();
    let mut printed = 0;
    let mut listening = false;

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                let sealed: Vec<_> = snapshot
                    .conversation
                    .iter()
                    .filter(|turn| turn.is_sealed())
                    .collect();
                for turn in sealed.iter().skip(printed) {
                    if turn.text().trim().is_empty() {
                        continue;
                    }
                    let speaker = match turn.role() {
                        Role::User => "you",
                        Role::Assistant => "tutor",
                    };
                    println!("{:>5}: {}", speaker, turn.text().trim());
                }
                printed = printed.max(sealed.len());

                match snapshot.state {
                    SessionState::Active if !listening => {
                        listening = true;
                        println!("Listening.");
                    }
                    SessionState::Idle => {
                        if let Some(error) = snapshot.error {
                            eprintln!("{}", error);
                        }
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, ending session...");
                if let Err(e) = handle.stop().await {
                    tracing::warn!("Failed to stop session: {:#}", e);
                    break;
                }
            }
        }
    }
}
