//! CLI interface for cochat
//!
//! Maps the workbench operations onto subcommands plus an interactive
//! prompt loop: panels are added, bound and routed from the prompt, with
//! streamed responses printed as they arrive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::export::{self, ExportFormat, PdfExporter};
use crate::llm::{ChatParams, LlmClient};
use crate::orchestrator::{Mode, Orchestrator, WorkbenchEvent};
use crate::store::ConversationStore;
use crate::tts::{AudioScheduler, Playback, RodioPlayback, TtsClient};
use crate::tts::playback::SilentPlayback;
use crate::types::CancelToken;

#[derive(Parser)]
#[command(name = "cochat")]
#[command(about = "Multi-panel conversational workbench for local LLM endpoints", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive workbench (default when no command given)
    Chat {
        /// Routing mode: individual, sequential, parallel or cyclic
        #[arg(short, long, default_value = "individual")]
        mode: String,
        /// Round count for cyclic mode (clamped to 1-10)
        #[arg(short, long, default_value = "1")]
        cycles: u32,
    },
    /// List models offered by the model server
    Models,
    /// List voices offered by the TTS service
    Voices,
    /// Manage saved conversations
    Conversations {
        #[command(subcommand)]
        command: ConversationCommands,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Subcommand)]
enum ConversationCommands {
    /// List saved conversations, newest first
    List,
    /// Print one conversation as plain text
    Show { id: String },
    /// Delete a conversation permanently
    Delete { id: String },
    /// Export a conversation (markdown, text, json or pdf)
    Export {
        id: String,
        #[arg(short, long, default_value = "markdown")]
        format: String,
        /// Output file (stdout when omitted; required for pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        None => run_chat(config, "individual".to_string(), 1).await,
        Some(Commands::Chat { mode, cycles }) => run_chat(config, mode, cycles).await,
        Some(Commands::Models) => run_models(config).await,
        Some(Commands::Voices) => run_voices(config).await,
        Some(Commands::Conversations { command }) => run_conversations(config, command).await,
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
            println!("# config file: {}", Config::config_path().display());
            Ok(())
        }
    }
}

async fn run_models(config: Config) -> Result<()> {
    let client = LlmClient::new(&config.endpoints.llm_base_url);
    use crate::llm::ChatTransport;
    let models = client
        .list_models()
        .await
        .context("Failed to list models - is the model server running?")?;
    for model in models {
        match model.name {
            Some(name) => println!("{}  ({})", model.id, name),
            None => println!("{}", model.id),
        }
    }
    Ok(())
}

async fn run_voices(config: Config) -> Result<()> {
    let client = TtsClient::new(&config.endpoints.tts_base_url);
    let voices = client
        .voices()
        .await
        .context("Failed to list voices - is the TTS service running?")?;
    for voice in voices {
        let marker = if voice.is_default { " (default)" } else { "" };
        println!("{}  {}{}", voice.id, voice.name, marker);
    }
    Ok(())
}

async fn run_conversations(config: Config, command: ConversationCommands) -> Result<()> {
    let store = ConversationStore::new(&config.store.database_path).await?;
    match command {
        ConversationCommands::List => {
            for summary in store.list().await? {
                println!(
                    "{}  [{}] {}  ({})",
                    summary.id,
                    summary.mode,
                    summary.title,
                    summary.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ConversationCommands::Show { id } => {
            let record = store
                .load(&id)
                .await?
                .with_context(|| format!("Conversation {id} not found"))?;
            println!("{}", export::to_text(&record));
        }
        ConversationCommands::Delete { id } => {
            store.delete(&id).await?;
            println!("Deleted {id}");
        }
        ConversationCommands::Export { id, format, output } => {
            let record = store
                .load(&id)
                .await?
                .with_context(|| format!("Conversation {id} not found"))?;
            let format = ExportFormat::from_str(&format).map_err(anyhow::Error::msg)?;
            let pdf = PdfExporter::new(&config.endpoints.export_base_url);
            let bytes = export::export(&record, format, &pdf).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, bytes).await?;
                    println!("Exported {id} to {}", path.display());
                }
                None => {
                    if format == ExportFormat::Pdf {
                        anyhow::bail!("PDF export needs --output FILE");
                    }
                    println!("{}", String::from_utf8_lossy(&bytes));
                }
            }
        }
    }
    Ok(())
}

async fn run_chat(config: Config, mode: String, cycles: u32) -> Result<()> {
    let mode = Mode::from_str(&mode).map_err(anyhow::Error::msg)?;

    let transport = Arc::new(LlmClient::new(&config.endpoints.llm_base_url));
    let synth = Arc::new(TtsClient::new(&config.endpoints.tts_base_url));
    let playback: Arc<dyn Playback> = match RodioPlayback::new() {
        Ok(playback) => Arc::new(playback),
        Err(e) => {
            eprintln!("Audio unavailable ({e}); continuing without sound");
            Arc::new(SilentPlayback)
        }
    };
    let scheduler = AudioScheduler::new(synth, playback);
    scheduler.set_muted(config.audio.muted);

    let store = Arc::new(ConversationStore::new(&config.store.database_path).await?);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));

    let params = ChatParams {
        temperature: config.chat.temperature,
        max_tokens: config.chat.max_tokens,
    };
    let mut orchestrator = Orchestrator::new(
        transport,
        scheduler,
        store.clone(),
        events_tx,
        params,
        config.audio.auto_read,
    );
    orchestrator.set_mode(mode).await;
    orchestrator.set_max_cycles(cycles);

    if let Ok(Some(url)) = store.completion_sound_url().await {
        match tokio::fs::read(&url).await {
            Ok(audio) => orchestrator.set_completion_sound(Some(audio)),
            Err(e) => eprintln!("Could not load completion sound {url}: {e}"),
        }
    }

    println!("cochat [{} mode]. Type /help for commands.", orchestrator.mode());

    let mut editor = rustyline::DefaultEditor::new()?;
    loop {
        let line = match editor.readline("you> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(&line);

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(command, &mut orchestrator, &store).await? {
                break;
            }
            continue;
        }

        // Ctrl-C during the turn cancels it at the next delta boundary.
        let cancel = CancelToken::new();
        let turn_cancel = cancel.clone();
        let submit = orchestrator.submit_user_message(&line, cancel);
        tokio::pin!(submit);
        let result = loop {
            tokio::select! {
                result = &mut submit => break result,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nStopping…");
                    turn_cancel.cancel();
                }
            }
        };
        if let Err(e) = result {
            eprintln!("Error: {e}");
        }
    }

    printer.abort();
    Ok(())
}

/// Handle a `/command` line; returns false when the loop should exit
async fn handle_command(
    command: &str,
    orchestrator: &mut Orchestrator,
    store: &Arc<ConversationStore>,
) -> Result<bool> {
    let parts: Vec<&str> = command.split_whitespace().collect();
    match parts.as_slice() {
        ["help"] => {
            println!("Commands:");
            println!("  /add                          add a panel (max 6)");
            println!("  /remove INDEX                 remove a panel");
            println!("  /bind INDEX MODEL [ROLE] [POSTURE]   bind a panel");
            println!("  /panels                       list panels");
            println!("  /clear INDEX                  clear a panel's messages");
            println!("  /mode MODE                    individual|sequential|parallel|cyclic");
            println!("  /cycles N                     cyclic round count (1-10)");
            println!("  /voice INDEX VOICE_ID [RATE] [VOLUME]  set a panel's voice");
            println!("  /mute                         toggle mute");
            println!("  /pause | /resume              suspend / continue playback");
            println!("  /autoread                     toggle auto-read");
            println!("  /summarize MODEL [POSTURE]    summarize all panels");
            println!("  /conversations                list saved conversations");
            println!("  /load ID                      load a saved conversation");
            println!("  /quit                         exit");
        }
        ["add"] => match orchestrator.add_panel() {
            Some(index) => println!("Added panel {}", index + 1),
            None => println!("Panel limit reached"),
        },
        ["remove", index] => {
            let index: usize = index.parse().context("INDEX must be a number")?;
            orchestrator.remove_panel(index.saturating_sub(1)).await;
            println!("Removed panel {index}");
        }
        ["bind", index, model, rest @ ..] => {
            let index: usize = index.parse().context("INDEX must be a number")?;
            let role = rest.first().copied().unwrap_or(crate::persona::DEFAULT_ROLE);
            let posture = rest.get(1).copied().unwrap_or(crate::persona::DEFAULT_POSTURE);
            orchestrator
                .bind_panel(index.saturating_sub(1), model, role, posture)
                .await?;
            println!("Panel {index} bound to {model} as {role} ({posture})");
        }
        ["panels"] => {
            for arc in orchestrator.panels() {
                let panel = arc.lock().await;
                println!(
                    "{}. {} - model: {}, persona: {} ({}), {} messages",
                    panel.index + 1,
                    panel.title,
                    panel.model().unwrap_or("<unbound>"),
                    panel.role(),
                    panel.posture(),
                    panel.messages().len()
                );
            }
        }
        ["clear", index] => {
            let index: usize = index.parse().context("INDEX must be a number")?;
            match orchestrator.panels().get(index.saturating_sub(1)) {
                Some(arc) => {
                    arc.lock().await.clear();
                    println!("Cleared panel {index}");
                }
                None => println!("No panel {index}"),
            }
        }
        ["mode", mode] => match Mode::from_str(mode) {
            Ok(mode) => {
                orchestrator.set_mode(mode).await;
                println!("Mode: {mode}");
            }
            Err(e) => println!("{e}"),
        },
        ["cycles", n] => {
            let n: u32 = n.parse().context("N must be a number")?;
            orchestrator.set_max_cycles(n);
            println!("Cycles: {}", orchestrator.max_cycles());
        }
        ["voice", index, voice_id, rest @ ..] => {
            let index: usize = index.parse().context("INDEX must be a number")?;
            let Some(arc) = orchestrator.panels().get(index.saturating_sub(1)).cloned() else {
                println!("No panel {index}");
                return Ok(true);
            };
            let mut panel = arc.lock().await;
            let mut settings = crate::tts::VoiceSettings::with_voice(*voice_id);
            if let Some(rate) = rest.first().and_then(|r| r.parse().ok()) {
                settings.set_rate(rate);
            }
            if let Some(volume) = rest.get(1).and_then(|v| v.parse().ok()) {
                settings.set_volume(volume);
            }
            panel.voice = settings.clone();
            store.set_voice_settings(panel.id, &settings).await?;
            println!("Panel {index} voice set to {voice_id}");
        }
        ["pause"] => {
            orchestrator.scheduler().pause();
            println!("Playback paused");
        }
        ["resume"] => {
            orchestrator.scheduler().resume();
            println!("Playback resumed");
        }
        ["mute"] => {
            let muted = !orchestrator.scheduler().is_muted();
            orchestrator.scheduler().set_muted(muted);
            println!("{}", if muted { "Muted" } else { "Unmuted" });
        }
        ["autoread"] => {
            let enabled = !orchestrator.auto_read();
            orchestrator.set_auto_read(enabled);
            println!("Auto-read {}", if enabled { "on" } else { "off" });
        }
        ["summarize", model, rest @ ..] => {
            let posture = rest.first().copied().unwrap_or("concise");
            match orchestrator.summarize(model, posture).await {
                Ok(summary) => println!("\n{summary}\n"),
                Err(e) => println!("Summarize failed: {e}"),
            }
        }
        ["conversations"] => {
            for summary in store.list().await? {
                println!("{}  [{}] {}", summary.id, summary.mode, summary.title);
            }
        }
        ["load", id] => match orchestrator.load_conversation(id).await {
            Ok(()) => println!("Loaded {id}"),
            Err(e) => println!("Load failed: {e}"),
        },
        ["quit"] | ["exit"] => return Ok(false),
        _ => println!("Unknown command (try /help)"),
    }
    Ok(true)
}

/// Print workbench events as they arrive
async fn print_events(mut rx: mpsc::UnboundedReceiver<WorkbenchEvent>) {
    use std::io::Write;
    while let Some(event) = rx.recv().await {
        match event {
            WorkbenchEvent::Delta { text, .. } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            WorkbenchEvent::PanelComplete { panel, .. } => {
                println!("\n[panel {} done]", panel + 1);
            }
            WorkbenchEvent::PanelError { panel, message } => {
                eprintln!("\npanel {} error: {}", panel + 1, message);
            }
            WorkbenchEvent::PanelsSkipped { count } => {
                eprintln!("skipped {count} panel(s) without a bound model");
            }
            WorkbenchEvent::Notice { message } => {
                eprintln!("{message}");
            }
            WorkbenchEvent::TurnComplete => {
                println!();
            }
        }
    }
}
