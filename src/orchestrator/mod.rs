//! Panel orchestrator: mode state machine and message routing
//!
//! Routes user messages across the panel set according to the active mode:
//!
//! - **Individual**: panel 0 only.
//! - **Sequential**: one pass across the panels, each panel's final text
//!   feeding the next.
//! - **Parallel**: fan-out to every idle bound panel; TTS is bounded to one
//!   voice at a time by the audio scheduler's gate.
//! - **Cyclic**: up to `max_cycles` sequential passes, the final text of a
//!   round seeding the next.
//!
//! Panel-to-panel coordination happens through method calls on the panel
//! records; completion is the resolution of each panel's submit future.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::error::{CoChatError, Result};
use crate::llm::{ChatMessage, ChatParams, ChatTransport};
use crate::panel::{Panel, PanelDeps, PanelState};
use crate::persona;
use crate::store::{ConversationRecord, ConversationStore, PanelConfig, StoredMessage};
use crate::tts::{AudioScheduler, PanelId, VoiceSettings};
use crate::types::{CancelToken, Role};

/// Maximum number of panels in the workbench
pub const MAX_PANELS: usize = 6;

/// Bounds for the Cyclic round count
pub const MIN_CYCLES: u32 = 1;
pub const MAX_CYCLES: u32 = 10;

/// Top-level routing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Individual,
    Sequential,
    Parallel,
    Cyclic,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Individual => write!(f, "individual"),
            Mode::Sequential => write!(f, "sequential"),
            Mode::Parallel => write!(f, "parallel"),
            Mode::Cyclic => write!(f, "cyclic"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "individual" => Ok(Mode::Individual),
            "sequential" => Ok(Mode::Sequential),
            "parallel" => Ok(Mode::Parallel),
            // "iteration" from older persisted records is intentionally
            // not accepted; the canonical key is "cyclic".
            "cyclic" => Ok(Mode::Cyclic),
            _ => Err(format!("Invalid mode: {}", s)),
        }
    }
}

/// Notifications surfaced to the user interface
#[derive(Debug, Clone)]
pub enum WorkbenchEvent {
    /// A streamed content fragment arrived on a panel
    Delta { panel: usize, text: String },
    /// A panel finished its stream
    PanelComplete { panel: usize, text: String },
    /// A panel's stream failed
    PanelError { panel: usize, message: String },
    /// Panels skipped during a Parallel fan-out
    PanelsSkipped { count: usize },
    /// Non-fatal notification (store/export failures, busy panels)
    Notice { message: String },
    /// The whole turn finished
    TurnComplete,
}

/// The panel orchestrator
pub struct Orchestrator {
    mode: Mode,
    panels: Vec<Arc<Mutex<Panel>>>,
    max_cycles: u32,
    cycle_index: u32,
    parallel_completed: Arc<AtomicUsize>,
    transport: Arc<dyn ChatTransport>,
    scheduler: AudioScheduler,
    store: Arc<ConversationStore>,
    events: mpsc::UnboundedSender<WorkbenchEvent>,
    params: ChatParams,
    auto_read: bool,
    turn_cancel: CancelToken,
    conversation_id: Option<String>,
    conversation_created_at: chrono::DateTime<Utc>,
    next_panel_id: PanelId,
    completion_sound: Option<Vec<u8>>,
}

impl Orchestrator {
    /// Create an orchestrator with one unbound panel, the way the workbench
    /// starts
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        scheduler: AudioScheduler,
        store: Arc<ConversationStore>,
        events: mpsc::UnboundedSender<WorkbenchEvent>,
        params: ChatParams,
        auto_read: bool,
    ) -> Self {
        let mut orchestrator = Self {
            mode: Mode::Individual,
            panels: Vec::new(),
            max_cycles: MIN_CYCLES,
            cycle_index: 0,
            parallel_completed: Arc::new(AtomicUsize::new(0)),
            transport,
            scheduler,
            store,
            events,
            params,
            auto_read,
            turn_cancel: CancelToken::new(),
            conversation_id: None,
            conversation_created_at: Utc::now(),
            next_panel_id: 0,
            completion_sound: None,
        };
        orchestrator.add_panel();
        orchestrator
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    pub fn cycle_index(&self) -> u32 {
        self.cycle_index
    }

    /// Panels that have finished (or failed) in the current Parallel turn
    pub fn parallel_completed(&self) -> usize {
        self.parallel_completed.load(Ordering::SeqCst)
    }

    pub fn panels(&self) -> &[Arc<Mutex<Panel>>] {
        &self.panels
    }

    pub fn auto_read(&self) -> bool {
        self.auto_read
    }

    pub fn set_auto_read(&mut self, auto_read: bool) {
        self.auto_read = auto_read;
    }

    pub fn scheduler(&self) -> &AudioScheduler {
        &self.scheduler
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Configure the turn-complete cue. Played when a turn's final panel
    /// completes, unless muted.
    pub fn set_completion_sound(&mut self, audio: Option<Vec<u8>>) {
        self.completion_sound = audio;
    }

    /// Add a panel, cloning the voice binding of the most recently created
    /// one. Adding beyond the maximum is a no-op; returns the new panel's
    /// index if one was added.
    pub fn add_panel(&mut self) -> Option<usize> {
        if self.panels.len() >= MAX_PANELS {
            let _ = self.events.send(WorkbenchEvent::Notice {
                message: format!("Panel limit reached ({MAX_PANELS})"),
            });
            return None;
        }
        let index = self.panels.len();
        let voice = match self.panels.last() {
            Some(last) => last
                .try_lock()
                .map(|p| p.voice.clone())
                .unwrap_or_default(),
            None => VoiceSettings::default(),
        };
        self.next_panel_id += 1;
        let panel = Panel::new(self.next_panel_id, index, format!("Panel {}", index + 1), voice);
        self.panels.push(Arc::new(Mutex::new(panel)));
        Some(index)
    }

    /// Remove a panel. Cancels any in-flight turn first so the removed
    /// panel's stream and audio stop.
    pub async fn remove_panel(&mut self, index: usize) {
        if index >= self.panels.len() {
            return;
        }
        self.turn_cancel.cancel();
        let removed = self.panels.remove(index);
        let panel_id = removed.lock().await.id;
        self.scheduler.stop_panel(panel_id);
        for (i, arc) in self.panels.iter().enumerate() {
            arc.lock().await.index = i;
        }
    }

    /// Bind a panel to a model and persona
    pub async fn bind_panel(
        &mut self,
        index: usize,
        model: &str,
        role: &str,
        posture: &str,
    ) -> Result<()> {
        let panel = self
            .panels
            .get(index)
            .ok_or_else(|| CoChatError::Store(format!("no panel at index {index}")))?;
        panel.lock().await.bind(model, role, posture);
        Ok(())
    }

    /// Switch the routing mode. Cancels pending handoffs and resets
    /// per-turn counters; panel message logs are untouched. Switching to
    /// the current mode is a no-op.
    pub async fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        info!("Mode change: {} -> {}", self.mode, mode);
        self.turn_cancel.cancel();
        self.cycle_index = 0;
        self.parallel_completed.store(0, Ordering::SeqCst);
        for arc in &self.panels {
            arc.lock().await.sequential_used = false;
        }
        self.scheduler.set_exclusive(mode == Mode::Parallel);
        self.mode = mode;
    }

    /// Set the Cyclic round count, clamped to the supported range
    pub fn set_max_cycles(&mut self, cycles: u32) {
        self.max_cycles = cycles.clamp(MIN_CYCLES, MAX_CYCLES);
    }

    /// Stop the current turn: pending handoffs are cleared, in-flight
    /// streams stop at the next delta boundary, audio queues drain.
    pub fn cancel(&self) {
        self.turn_cancel.cancel();
        self.scheduler.stop_all();
    }

    fn deps(&self) -> PanelDeps {
        PanelDeps {
            transport: self.transport.clone(),
            scheduler: self.scheduler.clone(),
            events: self.events.clone(),
            params: self.params,
            auto_read: self.auto_read,
        }
    }

    /// Route a user message according to the active mode. The caller
    /// supplies the turn's cancel token so "Stop" can fire while the turn
    /// is in flight; mode changes and panel removal cancel it too.
    pub async fn submit_user_message(&mut self, text: &str, cancel: CancelToken) -> Result<()> {
        self.turn_cancel = cancel;
        if self.conversation_id.is_none() {
            self.conversation_id = Some(uuid::Uuid::new_v4().to_string());
            self.conversation_created_at = Utc::now();
        }

        match self.mode {
            Mode::Individual => self.run_individual(text).await?,
            Mode::Sequential => {
                if self.sequential_pass(text).await?.is_none() {
                    return Err(CoChatError::NoModelBound(0));
                }
            }
            Mode::Parallel => self.run_parallel(text).await?,
            Mode::Cyclic => self.run_cyclic(text).await?,
        }

        self.autosave().await;
        if let Err(e) = self.store.flush().await {
            let _ = self.events.send(WorkbenchEvent::Notice {
                message: format!("Autosave flush failed: {e}"),
            });
        }
        let _ = self.events.send(WorkbenchEvent::TurnComplete);
        if let Some(audio) = self.completion_sound.clone() {
            self.scheduler.play_sound(audio).await;
        }
        Ok(())
    }

    async fn run_individual(&mut self, text: &str) -> Result<()> {
        let Some(arc) = self.panels.first().cloned() else {
            return Err(CoChatError::NoModelBound(0));
        };
        let deps = self.deps();
        let cancel = self.turn_cancel.clone();
        let mut panel = arc.lock().await;
        if !matches!(panel.state(), PanelState::Idle | PanelState::Error) {
            let _ = self.events.send(WorkbenchEvent::Notice {
                message: "Panel 1 is busy".to_string(),
            });
            return Ok(());
        }
        match panel.submit(text, &deps, cancel).await {
            Ok(final_text) => {
                drop(panel);
                self.autosave().await;
                let _ = self.events.send(WorkbenchEvent::PanelComplete {
                    panel: 0,
                    text: final_text,
                });
                Ok(())
            }
            Err(e) => {
                drop(panel);
                self.autosave().await;
                let _ = self.events.send(WorkbenchEvent::PanelError {
                    panel: 0,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// One Sequential pass: visit each eligible panel exactly once in
    /// ascending index order, feeding each panel's final text to the next.
    /// Returns the last assistant text, or `None` when no panel was
    /// eligible. All `sequential_used` flags are cleared when the pass
    /// ends.
    async fn sequential_pass(&mut self, seed: &str) -> Result<Option<String>> {
        let deps = self.deps();
        let cancel = self.turn_cancel.clone();
        let mut current = seed.to_string();
        let mut last_output: Option<String> = None;
        let mut pass_error: Option<CoChatError> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Next eligible panel, ascending index. Error-state and unbound
            // panels are consumed as "used" and skipped for this pass.
            let mut target = None;
            for arc in &self.panels {
                let mut panel = arc.lock().await;
                if panel.sequential_used {
                    continue;
                }
                if panel.state() != PanelState::Idle || panel.model().is_none() {
                    panel.sequential_used = true;
                    continue;
                }
                panel.sequential_used = true;
                target = Some(arc.clone());
                break;
            }

            let Some(arc) = target else {
                break;
            };

            let mut panel = arc.lock().await;
            let index = panel.index;
            match panel.submit(&current, &deps, cancel.clone()).await {
                Ok(final_text) => {
                    drop(panel);
                    let _ = self.events.send(WorkbenchEvent::PanelComplete {
                        panel: index,
                        text: final_text.clone(),
                    });
                    self.autosave().await;
                    current = final_text.clone();
                    last_output = Some(final_text);
                }
                Err(e) => {
                    drop(panel);
                    let _ = self.events.send(WorkbenchEvent::PanelError {
                        panel: index,
                        message: e.to_string(),
                    });
                    self.autosave().await;
                    pass_error = Some(e);
                    break;
                }
            }
        }

        for arc in &self.panels {
            arc.lock().await.sequential_used = false;
        }

        match pass_error {
            Some(e) => Err(e),
            None => Ok(last_output),
        }
    }

    /// Fan the text out to every idle bound panel and wait for all of them
    async fn run_parallel(&mut self, text: &str) -> Result<()> {
        let cancel = self.turn_cancel.clone();
        self.parallel_completed.store(0, Ordering::SeqCst);

        let mut dispatched = Vec::new();
        let mut skipped = 0usize;
        for arc in &self.panels {
            let panel = arc.lock().await;
            if panel.state() == PanelState::Idle && panel.model().is_some() {
                dispatched.push(arc.clone());
            } else {
                skipped += 1;
            }
        }

        if skipped > 0 {
            warn!("Parallel fan-out skipping {} panel(s)", skipped);
            let _ = self
                .events
                .send(WorkbenchEvent::PanelsSkipped { count: skipped });
        }
        if dispatched.is_empty() {
            return Err(CoChatError::NoModelBound(0));
        }

        let futures = dispatched.into_iter().map(|arc| {
            let deps = self.deps();
            let cancel = cancel.clone();
            let text = text.to_string();
            let events = self.events.clone();
            let completed = self.parallel_completed.clone();
            async move {
                let mut panel = arc.lock().await;
                let index = panel.index;
                let result = panel.submit(&text, &deps, cancel).await;
                drop(panel);
                // Failures count toward turn completion like successes.
                completed.fetch_add(1, Ordering::SeqCst);
                match result {
                    Ok(final_text) => {
                        let _ = events.send(WorkbenchEvent::PanelComplete {
                            panel: index,
                            text: final_text,
                        });
                    }
                    Err(e) => {
                        let _ = events.send(WorkbenchEvent::PanelError {
                            panel: index,
                            message: e.to_string(),
                        });
                    }
                }
            }
        });

        join_all(futures).await;
        Ok(())
    }

    /// Run `max_cycles` Sequential rounds, seeding each round with the
    /// previous round's final text
    async fn run_cyclic(&mut self, text: &str) -> Result<()> {
        let mut seed = text.to_string();
        self.cycle_index = 0;
        for round in 0..self.max_cycles {
            self.cycle_index = round;
            if self.turn_cancel.is_cancelled() {
                break;
            }
            info!("Cyclic round {}/{}", round + 1, self.max_cycles);
            match self.sequential_pass(&seed).await? {
                Some(final_text) => seed = final_text,
                None => {
                    if round == 0 {
                        return Err(CoChatError::NoModelBound(0));
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Flattened snapshot of the current conversation
    pub async fn snapshot(&self) -> ConversationRecord {
        let mut layout = Vec::new();
        let mut messages = Vec::new();
        let mut first_user: Option<String> = None;

        for (index, arc) in self.panels.iter().enumerate() {
            let panel = arc.lock().await;
            layout.push(PanelConfig {
                title: panel.title.clone(),
                model: panel.model().map(|m| m.to_string()),
                role: panel.role().to_string(),
                posture: panel.posture().to_string(),
            });
            for message in panel.messages() {
                if first_user.is_none() && message.role == Role::User {
                    first_user = Some(message.content.clone());
                }
                messages.push(StoredMessage {
                    panel_index: index,
                    message: message.clone(),
                });
            }
        }

        ConversationRecord {
            id: self
                .conversation_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: crate::store::derive_title(first_user.as_deref().unwrap_or_default()),
            created_at: self.conversation_created_at,
            mode: self.mode,
            panel_layout: layout,
            messages,
        }
    }

    /// Persist the current conversation. Store failures are surfaced as
    /// non-fatal notices.
    async fn autosave(&self) {
        let record = self.snapshot().await;
        if record.messages.is_empty() {
            return;
        }
        if let Err(e) = self.store.autosave(record).await {
            let _ = self.events.send(WorkbenchEvent::Notice {
                message: format!("Autosave failed: {e}"),
            });
        }
    }

    /// Replace the active panel layout and messages with a stored snapshot
    pub async fn load_conversation(&mut self, id: &str) -> Result<()> {
        let record = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| CoChatError::Store(format!("conversation {id} not found")))?;

        self.cancel();
        self.panels.clear();
        self.next_panel_id = 0;
        self.mode = record.mode;
        self.scheduler.set_exclusive(self.mode == Mode::Parallel);
        self.conversation_id = Some(record.id.clone());
        self.conversation_created_at = record.created_at;

        for (index, config) in record.panel_layout.iter().enumerate() {
            self.next_panel_id += 1;
            let mut panel = Panel::new(
                self.next_panel_id,
                index,
                config.title.clone(),
                VoiceSettings::default(),
            );
            if let Some(model) = &config.model {
                panel.bind(model.clone(), &config.role, &config.posture);
            }
            if let Ok(Some(voice)) = self.store.voice_settings(self.next_panel_id).await {
                panel.voice = voice;
            }
            self.panels.push(Arc::new(Mutex::new(panel)));
        }

        for stored in record.messages {
            if let Some(arc) = self.panels.get(stored.panel_index) {
                arc.lock().await.restore_message(stored.message);
            }
        }
        Ok(())
    }

    /// Remove a stored conversation permanently
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    /// Summarize the multi-panel conversation with a dedicated model.
    /// The transcript lists each panel's exchange in panel order, headed by
    /// the initial user prompt.
    pub async fn summarize(&self, model: &str, posture: &str) -> Result<String> {
        let models = self.transport.list_models().await?;
        if !models.iter().any(|m| m.id == model) {
            return Err(CoChatError::NoModels(format!(
                "model {model} not found in the discovery list"
            )));
        }

        let record = self.snapshot().await;
        let transcript = format_transcript(&record);
        let system_prompt = persona::compose("summarizer", posture);
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(format!(
                "Please analyze and summarize the following multi-panel conversation:\n\n{transcript}"
            )),
        ];
        self.transport.complete(model, messages, self.params).await
    }
}

/// Render the flattened record as a per-panel transcript for summarization
pub fn format_transcript(record: &ConversationRecord) -> String {
    let mut sections = Vec::new();

    let initial = record
        .messages
        .iter()
        .find(|m| m.message.role == Role::User)
        .map(|m| m.message.content.clone());
    if let Some(question) = initial {
        sections.push(format!("Initial Question/Prompt:\n{question}\n"));
    }

    for (index, _) in record.panel_layout.iter().enumerate() {
        let mut lines = vec![format!("Panel {}:", index + 1)];
        for stored in record.messages.iter().filter(|m| m.panel_index == index) {
            let speaker = match stored.message.role {
                Role::User => "User".to_string(),
                _ => stored
                    .message
                    .sender_label
                    .clone()
                    .unwrap_or_else(|| "Assistant".to_string()),
            };
            lines.push(format!("{}: {}", speaker, stored.message.content));
        }
        if lines.len() > 1 {
            sections.push(lines.join("\n"));
        }
    }

    sections.join("\n")
}
