mod config;
mod dashboard;
#[cfg(feature = "voice")]
mod voice;

use crate::config::Config;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use interview_core::Command;
use interview_core::acquisition::{ResponseAcquirer, TextResponder, VoiceListener};
use interview_core::coach::InterviewCoach;
use interview_core::profile::UserProfile;
use interview_core::prompts::{PromptSet, load_prompt_overrides};
use interview_core::question_bank::QuestionBank;
use interview_core::resume::clip_resume;
use interview_core::reviewer::build_reviewer;
use interview_core::session_state::Session;
use interview_core::store::{InterviewStore, open_store};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Practice mock interviews with an AI coach")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a mock interview in the terminal
    Interview {
        /// The kind of interview, e.g. "software_engineer"
        #[arg(long, default_value = "software_engineer")]
        interview_type: String,
        /// junior, mid or senior
        #[arg(long, default_value = "mid")]
        level: String,
        /// A plain-text resume used to tailor the questions
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Continue an existing profile instead of creating a new one
        #[arg(long)]
        user: Option<String>,
        /// Seed for reproducible question selection
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Lists a user's past interviews, newest first
    History { user: String },
    /// Prints a stored interview
    Show {
        interview_id: String,
        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr so they don't interleave with the interview on stdout.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting interview coach...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    let store = open_store(config.store_backend, &config.storage_dir, &config.db_path)
        .context("Failed to open the interview store")?;

    match args.command {
        Commands::Interview {
            interview_type,
            level,
            resume,
            user,
            seed,
        } => {
            let resume_text = match resume {
                Some(path) => read_resume(&path).await?,
                None => String::new(),
            };
            let options = InterviewOptions {
                interview_type,
                level,
                resume_text,
                user,
                seed,
            };
            run_interview(&config, store, options).await
        }
        Commands::History { user } => {
            let overviews = store
                .list_for_user(&user)
                .await
                .context("Failed to list interviews")?;
            println!("{}", dashboard::render_history(&user, &overviews));
            Ok(())
        }
        Commands::Show { interview_id, json } => {
            let record = store
                .load_interview(&interview_id)
                .await
                .context("Failed to load interview")?
                .with_context(|| format!("No interview with id '{interview_id}'"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", dashboard::render_record(&record));
            }
            Ok(())
        }
    }
}

struct InterviewOptions {
    interview_type: String,
    level: String,
    resume_text: String,
    user: Option<String>,
    seed: Option<u64>,
}

async fn read_resume(path: &Path) -> Result<String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read resume from {}", path.display()))?;
    if text.trim().is_empty() {
        tracing::warn!("Resume file {} is empty, proceeding without it", path.display());
    }
    Ok(clip_resume(&text))
}

fn load_prompts(dir: &Path) -> Result<PromptSet> {
    if !dir.is_dir() {
        tracing::debug!("No prompt directory at {}, using defaults", dir.display());
        return Ok(PromptSet::default());
    }
    let overrides = load_prompt_overrides(dir).context("Failed to load LLM prompts")?;
    tracing::info!("Loaded {} prompt overrides.", overrides.len());
    Ok(PromptSet::default().with_overrides(overrides))
}

#[cfg(feature = "voice")]
fn voice_listener(config: &Config) -> Option<Arc<dyn VoiceListener>> {
    if !config.voice_enabled {
        return None;
    }
    match config.reviewer_settings() {
        Some(settings) => {
            match voice::MicrophoneListener::new(settings, config.transcription_model.clone()) {
                Ok(listener) => {
                    tracing::info!("Listening for spoken answers as well as typed ones");
                    Some(Arc::new(listener))
                }
                Err(e) => {
                    tracing::warn!("Voice input unavailable, answers are typed only: {e}");
                    None
                }
            }
        }
        None => {
            tracing::warn!("VOICE_ENABLED is set but no OPENAI_API_KEY is available for transcription");
            None
        }
    }
}

#[cfg(not(feature = "voice"))]
fn voice_listener(config: &Config) -> Option<Arc<dyn VoiceListener>> {
    if config.voice_enabled {
        tracing::warn!("VOICE_ENABLED is set but this build has no voice support; answers are typed only");
    }
    None
}

/// Forwards stdin lines as typed answers.
///
/// Runs on a plain thread: a blocking read cannot be cancelled, and the
/// process exits without waiting for it.
fn spawn_stdin_reader(responder: TextResponder) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if responder.blocking_submit(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to start the input reader")?;
    Ok(())
}

async fn run_interview(
    config: &Config,
    store: Arc<dyn InterviewStore>,
    options: InterviewOptions,
) -> Result<()> {
    // --- 4. Load Prompts and Question Banks ---
    let prompts = load_prompts(&config.prompts_dir)?;
    let bank = QuestionBank::load(&config.question_banks_dir)
        .context("Failed to load question banks")?;
    tracing::info!("Question banks available: {:?}", bank.interview_types());

    // --- 5. Initialize API Clients ---
    let reviewer = build_reviewer(config.provider, config.reviewer_settings(), prompts)?;

    // --- 6. Session Setup ---
    let user_id = options.user.unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("user_{}", &id[..8])
    });
    let mut session = Session::new(&user_id, &options.interview_type, &options.level)
        .with_resume(options.resume_text);

    if store
        .load_profile(&user_id)
        .await
        .context("Failed to load user profile")?
        .is_none()
    {
        let mut profile = UserProfile::new(&user_id);
        profile.name = "Console User".to_string();
        profile.target_roles = vec![session.interview_type.clone()];
        profile.current_level = session.level.clone();
        store
            .save_profile(&profile)
            .await
            .context("Failed to save user profile")?;
        tracing::info!("Created profile {user_id}");
    }

    let (responder, mut acquirer) = ResponseAcquirer::channel(voice_listener(config));
    let (command_tx, mut command_rx) = tokio::sync::mpsc::channel::<Command>(32);
    spawn_stdin_reader(responder)?;

    // This task renders commands from the coach.
    let command_handler = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            if let Command::ResponseHeard(text) = &command {
                tracing::debug!("COMMAND RECEIVED: Response heard: '{}'", text);
            }
            if let Some(text) = dashboard::render_command(&command) {
                println!("{text}");
            }
        }
    });

    let mut coach = InterviewCoach::new(reviewer, bank, store)
        .with_turn_budget(config.response_timeout);
    if let Some(seed) = options.seed {
        coach = coach.with_seed(seed);
    }

    println!("=== Starting Interview ===");
    let interview = async {
        let record = coach.run(&mut session, &mut acquirer, &command_tx).await;
        // Closing the channel lets the renderer drain and finish.
        drop(command_tx);
        record
    };

    tokio::select! {
        record = interview => {
            if let Err(e) = command_handler.await {
                tracing::error!("Renderer task failed: {:?}", e);
            }
            match record {
                Some(record) => {
                    println!("Interview saved as {} for user {}.", record.interview_id, record.user_id);
                }
                None => bail!("The interview ended before closing"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
            println!("\nInterview session cancelled by user");
        }
    }
    Ok(())
}
