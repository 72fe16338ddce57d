//! End-to-end orchestration scenarios against scripted transports
//!
//! Covers the workbench's routing modes, cancellation, TTS ordering and
//! persistence using fakes at the transport, synthesis and playback seams.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;

use cochat::error::CoChatError;
use cochat::llm::{ChatMessage, ChatParams, ChatTransport, ModelInfo};
use cochat::orchestrator::{Mode, Orchestrator, WorkbenchEvent};
use cochat::store::ConversationStore;
use cochat::tts::{AudioScheduler, PanelId, Playback, SpeechSynth, VoiceSettings};
use cochat::types::{CancelToken, MessageStatus, Role};
use cochat::Result;

/// Maps each user input to a canned reply, streamed in small chunks
struct RoutedTransport {
    routes: HashMap<String, String>,
    models: Vec<String>,
}

impl RoutedTransport {
    fn new(routes: &[(&str, &str)], models: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            routes: routes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            models: models.iter().map(|m| m.to_string()).collect(),
        })
    }

    fn reply_for(&self, messages: &[ChatMessage]) -> String {
        let input = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.routes
            .get(&input)
            .cloned()
            .unwrap_or_else(|| format!("echo: {input}"))
    }
}

#[async_trait]
impl ChatTransport for RoutedTransport {
    async fn stream_chat(
        &self,
        _model: &str,
        messages: Vec<ChatMessage>,
        _params: ChatParams,
        cancel: CancelToken,
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let reply = self.reply_for(&messages);
        let chars: Vec<char> = reply.chars().collect();
        for chunk in chars.chunks(3) {
            if cancel.is_cancelled() {
                return Err(CoChatError::Cancelled);
            }
            let _ = deltas.send(chunk.iter().collect());
            tokio::task::yield_now().await;
        }
        Ok(reply)
    }

    async fn complete(
        &self,
        _model: &str,
        messages: Vec<ChatMessage>,
        _params: ChatParams,
    ) -> Result<String> {
        Ok(self.reply_for(&messages))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(self
            .models
            .iter()
            .map(|id| ModelInfo {
                id: id.clone(),
                object: Some("model".to_string()),
                owned_by: Some("organization_owner".to_string()),
                name: None,
            })
            .collect())
    }
}

/// Streams one delta then hangs until cancelled
struct HangingTransport;

#[async_trait]
impl ChatTransport for HangingTransport {
    async fn stream_chat(
        &self,
        _model: &str,
        _messages: Vec<ChatMessage>,
        _params: ChatParams,
        cancel: CancelToken,
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let _ = deltas.send("4".to_string());
        cancel.cancelled().await;
        Err(CoChatError::Cancelled)
    }

    async fn complete(
        &self,
        _model: &str,
        _messages: Vec<ChatMessage>,
        _params: ChatParams,
    ) -> Result<String> {
        Err(CoChatError::Transport("unreachable".to_string()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![])
    }
}

struct EchoSynth;

#[async_trait]
impl SpeechSynth for EchoSynth {
    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Records (panel, start/end, segment text) with a playback delay
#[derive(Default)]
struct RecordingPlayback {
    events: StdMutex<Vec<(PanelId, &'static str, String)>>,
    delay_ms: u64,
}

impl RecordingPlayback {
    fn with_delay(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            events: StdMutex::new(Vec::new()),
            delay_ms,
        })
    }

    fn events(&self) -> Vec<(PanelId, &'static str, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Playback for RecordingPlayback {
    async fn play(&self, panel_id: PanelId, audio: Vec<u8>, _settings: &VoiceSettings) -> Result<()> {
        let text = String::from_utf8_lossy(&audio).to_string();
        self.events.lock().unwrap().push((panel_id, "start", text.clone()));
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.events.lock().unwrap().push((panel_id, "end", text));
        Ok(())
    }

    fn stop_panel(&self, _panel_id: PanelId) {}
    fn stop_all(&self) {}
    fn pause_all(&self) {}
    fn resume_all(&self) {}
}

struct Workbench {
    orchestrator: Orchestrator,
    store: Arc<ConversationStore>,
    events: mpsc::UnboundedReceiver<WorkbenchEvent>,
    playback: Arc<RecordingPlayback>,
}

async fn workbench(transport: Arc<dyn ChatTransport>, auto_read: bool) -> Workbench {
    let playback = RecordingPlayback::with_delay(10);
    let scheduler = AudioScheduler::new(Arc::new(EchoSynth), playback.clone());
    let store = Arc::new(ConversationStore::in_memory().await.unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(
        transport,
        scheduler,
        store.clone(),
        tx,
        ChatParams::default(),
        auto_read,
    );
    Workbench {
        orchestrator,
        store,
        events: rx,
        playback,
    }
}

fn drain_events(rx: &mut mpsc::UnboundedReceiver<WorkbenchEvent>) -> Vec<WorkbenchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn panel_log(orchestrator: &Orchestrator, index: usize) -> Vec<(Role, String)> {
    let panel = orchestrator.panels()[index].lock().await;
    panel
        .messages()
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

// S1: Individual single-turn with auto-save
#[tokio::test]
async fn individual_single_turn_streams_and_saves() {
    let transport = RoutedTransport::new(&[("What is 2+2?", "4")], &["m1"]);
    let mut bench = workbench(transport, false).await;
    bench
        .orchestrator
        .bind_panel(0, "m1", "researcher", "analytical")
        .await
        .unwrap();

    bench
        .orchestrator
        .submit_user_message("What is 2+2?", CancelToken::new())
        .await
        .unwrap();

    let log = panel_log(&bench.orchestrator, 0).await;
    assert_eq!(
        log,
        vec![
            (Role::User, "What is 2+2?".to_string()),
            (Role::Assistant, "4".to_string()),
        ]
    );

    // The persisted conversation equals the in-memory log, titled by the
    // first user message.
    let id = bench.orchestrator.conversation_id().unwrap().to_string();
    let saved = bench.store.load(&id).await.unwrap().unwrap();
    assert_eq!(saved.title, "What is 2+2?");
    assert_eq!(saved.messages.len(), 2);
    assert_eq!(saved.messages[0].message.content, "What is 2+2?");
    assert_eq!(saved.messages[1].message.content, "4");
    assert!(saved
        .messages
        .iter()
        .all(|m| m.message.status == MessageStatus::Complete));
    assert_eq!(saved.messages[0].message.role, Role::User);
}

// S2: Sequential three-panel handoff
#[tokio::test]
async fn sequential_pass_hands_text_down_the_line() {
    let transport = RoutedTransport::new(&[("X", "A"), ("A", "B"), ("B", "C")], &["m1", "m2", "m3"]);
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.add_panel();
    bench.orchestrator.add_panel();
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    bench.orchestrator.bind_panel(1, "m2", "analyst", "professional").await.unwrap();
    bench.orchestrator.bind_panel(2, "m3", "critic", "professional").await.unwrap();
    bench.orchestrator.set_mode(Mode::Sequential).await;

    bench
        .orchestrator
        .submit_user_message("X", CancelToken::new())
        .await
        .unwrap();

    assert_eq!(
        panel_log(&bench.orchestrator, 0).await,
        vec![(Role::User, "X".into()), (Role::Assistant, "A".into())]
    );
    assert_eq!(
        panel_log(&bench.orchestrator, 1).await,
        vec![(Role::User, "A".into()), (Role::Assistant, "B".into())]
    );
    assert_eq!(
        panel_log(&bench.orchestrator, 2).await,
        vec![(Role::User, "B".into()), (Role::Assistant, "C".into())]
    );

    // Flags are consumed and cleared by the pass.
    for arc in bench.orchestrator.panels() {
        assert!(!arc.lock().await.sequential_used);
    }
}

// S3: Parallel fan-out skips the unbound panel with a warning
#[tokio::test]
async fn parallel_fanout_skips_unbound_panels() {
    let transport = RoutedTransport::new(&[("Q", "R")], &["m1", "m3"]);
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.add_panel();
    bench.orchestrator.add_panel();
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    // Panel 1 stays unbound.
    bench.orchestrator.bind_panel(2, "m3", "critic", "professional").await.unwrap();
    bench.orchestrator.set_mode(Mode::Parallel).await;

    bench
        .orchestrator
        .submit_user_message("Q", CancelToken::new())
        .await
        .unwrap();

    assert_eq!(
        panel_log(&bench.orchestrator, 0).await,
        vec![(Role::User, "Q".into()), (Role::Assistant, "R".into())]
    );
    assert!(panel_log(&bench.orchestrator, 1).await.is_empty());
    assert_eq!(
        panel_log(&bench.orchestrator, 2).await,
        vec![(Role::User, "Q".into()), (Role::Assistant, "R".into())]
    );

    let events = drain_events(&mut bench.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkbenchEvent::PanelsSkipped { count: 1 })));
    let completions = events
        .iter()
        .filter(|e| matches!(e, WorkbenchEvent::PanelComplete { .. }))
        .count();
    assert_eq!(completions, 2);
}

// S4: Cyclic, two cycles across two panels
#[tokio::test]
async fn cyclic_runs_the_requested_number_of_rounds() {
    let transport = RoutedTransport::new(
        &[("seed", "r0a"), ("r0a", "r0b"), ("r0b", "r1a"), ("r1a", "r1b")],
        &["m1", "m2"],
    );
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.add_panel();
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    bench.orchestrator.bind_panel(1, "m2", "analyst", "professional").await.unwrap();
    bench.orchestrator.set_mode(Mode::Cyclic).await;
    bench.orchestrator.set_max_cycles(2);

    bench
        .orchestrator
        .submit_user_message("seed", CancelToken::new())
        .await
        .unwrap();

    assert_eq!(
        panel_log(&bench.orchestrator, 0).await,
        vec![
            (Role::User, "seed".into()),
            (Role::Assistant, "r0a".into()),
            (Role::User, "r0b".into()),
            (Role::Assistant, "r1a".into()),
        ]
    );
    assert_eq!(
        panel_log(&bench.orchestrator, 1).await,
        vec![
            (Role::User, "r0a".into()),
            (Role::Assistant, "r0b".into()),
            (Role::User, "r1a".into()),
            (Role::Assistant, "r1b".into()),
        ]
    );
}

// S5: Parallel TTS never overlaps and preserves per-panel segment order
#[tokio::test]
async fn parallel_tts_is_mutually_exclusive_and_ordered() {
    let transport = RoutedTransport::new(
        &[("Q", "One. Two.")],
        &["m1", "m2"],
    );
    let mut bench = workbench(transport, true).await;
    bench.orchestrator.add_panel();
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    bench.orchestrator.bind_panel(1, "m2", "analyst", "professional").await.unwrap();
    bench.orchestrator.set_mode(Mode::Parallel).await;

    let (id0, id1) = {
        let panels = bench.orchestrator.panels();
        let mut p0 = panels[0].lock().await;
        p0.voice = VoiceSettings::with_voice("alpha");
        let mut p1 = panels[1].lock().await;
        p1.voice = VoiceSettings::with_voice("beta");
        (p0.id, p1.id)
    };

    bench
        .orchestrator
        .submit_user_message("Q", CancelToken::new())
        .await
        .unwrap();

    // Let the audio pumps drain.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let events = bench.playback.events();
    let mut playing: Option<PanelId> = None;
    for (panel, kind, _) in &events {
        match *kind {
            "start" => {
                assert!(playing.is_none(), "two playbacks overlapped");
                playing = Some(*panel);
            }
            "end" => {
                assert_eq!(playing, Some(*panel));
                playing = None;
            }
            _ => unreachable!(),
        }
    }

    // Per-panel order equals the emitted segment order; together the
    // played audio is exactly each panel's segment stream.
    for id in [id0, id1] {
        let segments: Vec<String> = events
            .iter()
            .filter(|(panel, kind, _)| *panel == id && *kind == "start")
            .map(|(_, _, text)| text.clone())
            .collect();
        assert_eq!(segments, vec!["One.".to_string(), "Two.".to_string()]);
    }
}

// S6: Cancel mid-stream retains the partial assistant text
#[tokio::test]
async fn cancel_mid_stream_keeps_partial_text() {
    let mut bench = workbench(Arc::new(HangingTransport), false).await;
    bench
        .orchestrator
        .bind_panel(0, "m1", "researcher", "analytical")
        .await
        .unwrap();

    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    bench
        .orchestrator
        .submit_user_message("What is 2+2?", cancel)
        .await
        .unwrap();

    let panel = bench.orchestrator.panels()[0].lock().await;
    let messages = panel.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "4");
    assert_eq!(messages[1].status, MessageStatus::Complete);
}

// Boundary: the 7th panel is a no-op
#[tokio::test]
async fn seventh_panel_is_a_no_op() {
    let transport = RoutedTransport::new(&[], &[]);
    let mut bench = workbench(transport, false).await;
    for _ in 0..5 {
        assert!(bench.orchestrator.add_panel().is_some());
    }
    assert_eq!(bench.orchestrator.panels().len(), 6);
    assert!(bench.orchestrator.add_panel().is_none());
    assert_eq!(bench.orchestrator.panels().len(), 6);
}

// Boundary: submitting with no bound model appends nothing
#[tokio::test]
async fn submit_without_any_model_raises_and_appends_nothing() {
    let transport = RoutedTransport::new(&[], &["m1"]);
    let mut bench = workbench(transport, false).await;

    let err = bench
        .orchestrator
        .submit_user_message("hello", CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoChatError::NoModelBound(_)));
    assert!(panel_log(&bench.orchestrator, 0).await.is_empty());
}

// Boundary: cycle count clamps to [1, 10]
#[tokio::test]
async fn cycle_count_is_clamped() {
    let transport = RoutedTransport::new(&[], &[]);
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.set_max_cycles(0);
    assert_eq!(bench.orchestrator.max_cycles(), 1);
    bench.orchestrator.set_max_cycles(15);
    assert_eq!(bench.orchestrator.max_cycles(), 10);
    bench.orchestrator.set_max_cycles(4);
    assert_eq!(bench.orchestrator.max_cycles(), 4);
}

// Switching to the current mode is a no-op; switching away clears flags
#[tokio::test]
async fn mode_switch_idempotence_and_flag_reset() {
    let transport = RoutedTransport::new(&[("X", "A")], &["m1"]);
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    bench
        .orchestrator
        .submit_user_message("X", CancelToken::new())
        .await
        .unwrap();
    let before = panel_log(&bench.orchestrator, 0).await;

    bench.orchestrator.panels()[0].lock().await.sequential_used = true;
    bench.orchestrator.set_mode(Mode::Individual).await;
    assert!(bench.orchestrator.panels()[0].lock().await.sequential_used);
    assert_eq!(panel_log(&bench.orchestrator, 0).await, before);

    bench.orchestrator.set_mode(Mode::Sequential).await;
    assert!(!bench.orchestrator.panels()[0].lock().await.sequential_used);
    assert_eq!(panel_log(&bench.orchestrator, 0).await, before);
}

// Sequential halts on a transport failure but keeps produced messages
#[tokio::test]
async fn sequential_halts_on_midline_failure() {
    struct FailSecond {
        inner: Arc<RoutedTransport>,
    }

    #[async_trait]
    impl ChatTransport for FailSecond {
        async fn stream_chat(
            &self,
            model: &str,
            messages: Vec<ChatMessage>,
            params: ChatParams,
            cancel: CancelToken,
            deltas: mpsc::UnboundedSender<String>,
        ) -> Result<String> {
            if model == "m2" {
                return Err(CoChatError::Transport("connection reset".to_string()));
            }
            self.inner.stream_chat(model, messages, params, cancel, deltas).await
        }

        async fn complete(
            &self,
            model: &str,
            messages: Vec<ChatMessage>,
            params: ChatParams,
        ) -> Result<String> {
            self.inner.complete(model, messages, params).await
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            self.inner.list_models().await
        }
    }

    let inner = RoutedTransport::new(&[("X", "A")], &["m1", "m2", "m3"]);
    let transport = Arc::new(FailSecond { inner });
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.add_panel();
    bench.orchestrator.add_panel();
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    bench.orchestrator.bind_panel(1, "m2", "analyst", "professional").await.unwrap();
    bench.orchestrator.bind_panel(2, "m3", "critic", "professional").await.unwrap();
    bench.orchestrator.set_mode(Mode::Sequential).await;

    let err = bench
        .orchestrator
        .submit_user_message("X", CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoChatError::Transport(_)));

    // Panel 0's exchange survives; panel 2 was never reached.
    assert_eq!(
        panel_log(&bench.orchestrator, 0).await,
        vec![(Role::User, "X".into()), (Role::Assistant, "A".into())]
    );
    assert!(panel_log(&bench.orchestrator, 2).await.is_empty());
}

// Loading a conversation replaces the panel layout and messages
#[tokio::test]
async fn load_conversation_restores_layout_and_messages() {
    let transport = RoutedTransport::new(&[("X", "A"), ("A", "B")], &["m1", "m2"]);
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.add_panel();
    bench.orchestrator.bind_panel(0, "m1", "researcher", "professional").await.unwrap();
    bench.orchestrator.bind_panel(1, "m2", "analyst", "casual").await.unwrap();
    bench.orchestrator.set_mode(Mode::Sequential).await;
    bench
        .orchestrator
        .submit_user_message("X", CancelToken::new())
        .await
        .unwrap();
    let id = bench.orchestrator.conversation_id().unwrap().to_string();
    let before0 = panel_log(&bench.orchestrator, 0).await;
    let before1 = panel_log(&bench.orchestrator, 1).await;

    // A fresh workbench loads the same snapshot back.
    let transport = RoutedTransport::new(&[], &[]);
    let playback = RecordingPlayback::with_delay(1);
    let scheduler = AudioScheduler::new(Arc::new(EchoSynth), playback);
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut fresh = Orchestrator::new(
        transport,
        scheduler,
        bench.store.clone(),
        tx,
        ChatParams::default(),
        false,
    );
    fresh.load_conversation(&id).await.unwrap();

    assert_eq!(fresh.mode(), Mode::Sequential);
    assert_eq!(fresh.panels().len(), 2);
    assert_eq!(panel_log(&fresh, 0).await, before0);
    assert_eq!(panel_log(&fresh, 1).await, before1);
    assert_eq!(
        fresh.panels()[1].lock().await.model(),
        Some("m2")
    );
}

// The summarizer verifies the model and formats the multi-panel transcript
#[tokio::test]
async fn summarize_checks_model_and_uses_transcript() {
    let transport = RoutedTransport::new(&[("What is 2+2?", "4")], &["m1", "summarizer-model"]);
    let mut bench = workbench(transport, false).await;
    bench.orchestrator.bind_panel(0, "m1", "researcher", "analytical").await.unwrap();
    bench
        .orchestrator
        .submit_user_message("What is 2+2?", CancelToken::new())
        .await
        .unwrap();

    let err = bench
        .orchestrator
        .summarize("missing-model", "concise")
        .await
        .unwrap_err();
    assert!(matches!(err, CoChatError::NoModels(_)));

    // RoutedTransport echoes unrouted prompts, so the summary carries the
    // formatted transcript.
    let summary = bench
        .orchestrator
        .summarize("summarizer-model", "concise")
        .await
        .unwrap();
    assert!(summary.contains("Initial Question/Prompt:"));
    assert!(summary.contains("Panel 1:"));
    assert!(summary.contains("Researcher (analytical): 4"));
}
