//! Panel: one bound conversational slot
//!
//! A panel binds a model and a persona, keeps its own message log, and
//! drives one streaming completion at a time: deltas are appended to the
//! in-flight assistant message while the sentence segmenter feeds the audio
//! scheduler. Completion, cancellation and failure all resolve through the
//! return value of [`Panel::submit`], which the orchestrator uses for
//! handoff decisions.

pub mod segmenter;

pub use segmenter::SentenceSegmenter;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CoChatError, Result};
use crate::llm::{ChatMessage, ChatParams, ChatTransport};
use crate::orchestrator::WorkbenchEvent;
use crate::persona;
use crate::tts::{AudioScheduler, PanelId, VoiceSettings};
use crate::types::{CancelToken, Message, MessageStatus};

/// How long the segmenter waits for the next delta before flushing
const SEGMENT_IDLE: Duration = Duration::from_millis(500);

/// Panel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    AwaitingStream,
    Streaming,
    Error,
}

/// Services a panel needs while driving a stream
pub struct PanelDeps {
    pub transport: Arc<dyn ChatTransport>,
    pub scheduler: AudioScheduler,
    pub events: mpsc::UnboundedSender<WorkbenchEvent>,
    pub params: ChatParams,
    pub auto_read: bool,
}

/// One conversation slot
pub struct Panel {
    /// Stable id for the panel's audio channel and voice-settings key
    pub id: PanelId,
    /// Position in the orchestrator's panel list
    pub index: usize,
    pub title: String,
    model: Option<String>,
    role: String,
    posture: String,
    system_prompt: String,
    messages: Vec<Message>,
    state: PanelState,
    pub voice: VoiceSettings,
    /// Consumed by the orchestrator's Sequential/Cyclic passes
    pub sequential_used: bool,
    next_message_id: u64,
}

impl Panel {
    pub fn new(id: PanelId, index: usize, title: impl Into<String>, voice: VoiceSettings) -> Self {
        let role = persona::DEFAULT_ROLE.to_string();
        let posture = persona::DEFAULT_POSTURE.to_string();
        let system_prompt = persona::compose(&role, &posture);
        Self {
            id,
            index,
            title: title.into(),
            model: None,
            role,
            posture,
            system_prompt,
            messages: Vec::new(),
            state: PanelState::Idle,
            voice,
            sequential_used: false,
            next_message_id: 0,
        }
    }

    /// Bind a model and persona. Recomposes the system prompt; the message
    /// log and voice binding are untouched.
    pub fn bind(&mut self, model: impl Into<String>, role: &str, posture: &str) {
        self.model = Some(model.into());
        self.role = role.to_string();
        self.posture = posture.to_string();
        self.system_prompt = persona::compose(role, posture);
        self.state = PanelState::Idle;
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn posture(&self) -> &str {
        &self.posture
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Remove all messages and return to idle
    pub fn clear(&mut self) {
        self.messages.clear();
        self.state = PanelState::Idle;
    }

    /// Re-insert a stored message when loading a conversation
    pub fn restore_message(&mut self, message: Message) {
        self.next_message_id = self.next_message_id.max(message.id);
        self.messages.push(message);
    }

    fn next_id(&mut self) -> u64 {
        self.next_message_id += 1;
        self.next_message_id
    }

    /// Append a user message and stream the assistant's reply into a new
    /// message. Returns the final assistant text; on cancellation the
    /// partial text assembled so far is retained and returned.
    ///
    /// Each call sends only `[system, user]` to the model; panel history
    /// is not re-sent.
    pub async fn submit(
        &mut self,
        user_text: &str,
        deps: &PanelDeps,
        cancel: CancelToken,
    ) -> Result<String> {
        let model = self
            .model
            .clone()
            .ok_or(CoChatError::NoModelBound(self.index))?;

        // A successful submit clears a prior error state.
        self.state = PanelState::AwaitingStream;

        let user_id = self.next_id();
        self.messages.push(Message::user(user_id, user_text));

        let assistant_id = self.next_id();
        let label = persona::sender_label(&self.role, &self.posture);
        self.messages
            .push(Message::assistant_streaming(assistant_id, label));

        let wire = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(user_text),
        ];

        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = deps.transport.clone();
        let stream_cancel = cancel.clone();
        let stream_params = deps.params;
        let task = tokio::spawn(async move {
            transport
                .stream_chat(&model, wire, stream_params, stream_cancel, tx)
                .await
        });

        let mut segmenter = SentenceSegmenter::new();
        let mut cancelled = false;
        loop {
            tokio::select! {
                maybe_delta = rx.recv() => match maybe_delta {
                    Some(delta) => {
                        self.state = PanelState::Streaming;
                        self.append_delta(assistant_id, &delta);
                        let _ = deps.events.send(WorkbenchEvent::Delta {
                            panel: self.index,
                            text: delta.clone(),
                        });
                        if deps.auto_read {
                            for segment in segmenter.push(&delta) {
                                deps.scheduler.enqueue(self.id, segment, self.voice.clone());
                            }
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep(SEGMENT_IDLE) => {
                    if deps.auto_read {
                        if let Some(segment) = segmenter.flush() {
                            deps.scheduler.enqueue(self.id, segment, self.voice.clone());
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
            }
        }

        if cancelled {
            // Stop within one delta boundary: drop the stream, keep what
            // was assembled, drain this panel's audio queue.
            task.abort();
            deps.scheduler.stop_panel(self.id);
            let partial = self.finish_assistant(assistant_id, MessageStatus::Complete);
            self.state = PanelState::Idle;
            debug!("Panel {} cancelled mid-stream", self.index);
            return Ok(partial);
        }

        match task.await {
            Ok(Ok(full_text)) => {
                if deps.auto_read {
                    if let Some(segment) = segmenter.flush() {
                        deps.scheduler.enqueue(self.id, segment, self.voice.clone());
                    }
                }
                self.finish_assistant(assistant_id, MessageStatus::Complete);
                self.state = PanelState::Idle;
                Ok(full_text)
            }
            Ok(Err(CoChatError::Cancelled)) => {
                deps.scheduler.stop_panel(self.id);
                let partial = self.finish_assistant(assistant_id, MessageStatus::Complete);
                self.state = PanelState::Idle;
                Ok(partial)
            }
            Ok(Err(e)) => {
                warn!("Panel {} stream failed: {}", self.index, e);
                self.finish_assistant(assistant_id, MessageStatus::Error);
                self.state = PanelState::Error;
                Err(e)
            }
            Err(join_err) => {
                self.finish_assistant(assistant_id, MessageStatus::Error);
                self.state = PanelState::Error;
                Err(CoChatError::Transport(format!(
                    "stream task failed: {join_err}"
                )))
            }
        }
    }

    fn append_delta(&mut self, message_id: u64, delta: &str) {
        if let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == message_id) {
            message.content.push_str(delta);
        }
    }

    /// Seal the in-flight assistant message and return its content
    fn finish_assistant(&mut self, message_id: u64, status: MessageStatus) -> String {
        if let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == message_id) {
            message.status = status;
            message.content.clone()
        } else {
            String::new()
        }
    }
}
