//! Audio scheduler
//!
//! Maintains one FIFO queue per panel. Sentence segments are enqueued as
//! text; each panel's pump task synthesizes the segment and plays it, so a
//! synthesis failure only costs that one item. Outside Parallel mode the
//! queues drain independently; in Parallel mode a one-permit gate keeps at
//! most one voice audible across all panels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use super::client::SpeechSynth;
use super::playback::Playback;
use super::voice_settings::VoiceSettings;
use crate::error::CoChatError;

/// Stable identifier of a panel's audio channel
pub type PanelId = u64;

/// Reserved channel for the turn-complete sound
const SOUND_CHANNEL: PanelId = u64::MAX;

struct QueueItem {
    text: String,
    settings: VoiceSettings,
    epoch: u64,
}

struct PanelQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    epoch: Arc<AtomicU64>,
}

struct Inner {
    synth: Arc<dyn SpeechSynth>,
    playback: Arc<dyn Playback>,
    queues: Mutex<HashMap<PanelId, PanelQueue>>,
    /// One-permit gate applied while `exclusive` is set (Parallel mode)
    gate: Arc<Semaphore>,
    exclusive: AtomicBool,
    muted: AtomicBool,
}

/// Per-panel FIFO audio scheduler with a global exclusion gate
#[derive(Clone)]
pub struct AudioScheduler {
    inner: Arc<Inner>,
}

impl AudioScheduler {
    pub fn new(synth: Arc<dyn SpeechSynth>, playback: Arc<dyn Playback>) -> Self {
        Self {
            inner: Arc::new(Inner {
                synth,
                playback,
                queues: Mutex::new(HashMap::new()),
                gate: Arc::new(Semaphore::new(1)),
                exclusive: AtomicBool::new(false),
                muted: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a sentence segment for a panel. Returns immediately; dropped
    /// while muted.
    pub fn enqueue(&self, panel_id: PanelId, text: String, settings: VoiceSettings) {
        if self.inner.muted.load(Ordering::SeqCst) {
            debug!("Muted, dropping segment for panel {}", panel_id);
            return;
        }

        let mut queues = self.inner.queues.lock().expect("queue map poisoned");
        let queue = queues.entry(panel_id).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let epoch = Arc::new(AtomicU64::new(0));
            tokio::spawn(pump(self.inner.clone(), panel_id, epoch.clone(), rx));
            PanelQueue { tx, epoch }
        });

        let item = QueueItem {
            text,
            settings,
            epoch: queue.epoch.load(Ordering::SeqCst),
        };
        let _ = queue.tx.send(item);
    }

    /// Drain one panel's queue and stop its in-flight item
    pub fn stop_panel(&self, panel_id: PanelId) {
        let queues = self.inner.queues.lock().expect("queue map poisoned");
        if let Some(queue) = queues.get(&panel_id) {
            queue.epoch.fetch_add(1, Ordering::SeqCst);
        }
        drop(queues);
        self.inner.playback.stop_panel(panel_id);
    }

    /// Drain every queue and stop all in-flight playback
    pub fn stop_all(&self) {
        let queues = self.inner.queues.lock().expect("queue map poisoned");
        for queue in queues.values() {
            queue.epoch.fetch_add(1, Ordering::SeqCst);
        }
        drop(queues);
        self.inner.playback.stop_all();
    }

    /// Toggle the Parallel-mode global exclusion gate
    pub fn set_exclusive(&self, exclusive: bool) {
        self.inner.exclusive.store(exclusive, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    /// Mute or unmute. Muting stops in-flight audio and drains queues; new
    /// enqueues are dropped while muted.
    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::SeqCst);
        if muted {
            self.stop_all();
        }
    }

    /// Suspend playback; queues are retained
    pub fn pause(&self) {
        self.inner.playback.pause_all();
    }

    /// Resume suspended playback
    pub fn resume(&self) {
        self.inner.playback.resume_all();
    }

    /// Play a one-shot cue (the turn-complete sound) outside the panel
    /// queues. Silently skipped while muted.
    pub async fn play_sound(&self, audio: Vec<u8>) {
        if self.is_muted() {
            return;
        }
        if let Err(e) = self
            .inner
            .playback
            .play(SOUND_CHANNEL, audio, &VoiceSettings::default())
            .await
        {
            warn!("Completion sound playback failed: {}", e);
        }
    }
}

/// One panel's drain loop: synthesize, optionally gate, play. Any item
/// failure advances the queue.
async fn pump(
    inner: Arc<Inner>,
    panel_id: PanelId,
    epoch: Arc<AtomicU64>,
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
) {
    while let Some(item) = rx.recv().await {
        if item.epoch != epoch.load(Ordering::SeqCst) {
            continue;
        }
        if inner.muted.load(Ordering::SeqCst) {
            continue;
        }
        let Some(voice_id) = item.settings.voice_id.clone() else {
            debug!("Panel {} has no voice bound, skipping segment", panel_id);
            continue;
        };

        let audio = match inner.synth.synthesize(&item.text, &voice_id).await {
            Ok(bytes) => bytes,
            Err(CoChatError::EmptyAudio) => {
                debug!("Panel {} got empty audio, skipping", panel_id);
                continue;
            }
            Err(e) => {
                warn!("Panel {} TTS synthesis failed: {}", panel_id, e);
                continue;
            }
        };

        // The queue may have been drained while synthesis was in flight.
        if item.epoch != epoch.load(Ordering::SeqCst) || inner.muted.load(Ordering::SeqCst) {
            continue;
        }

        let _permit = if inner.exclusive.load(Ordering::SeqCst) {
            match inner.gate.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => None,
            }
        } else {
            None
        };

        if item.epoch != epoch.load(Ordering::SeqCst) {
            continue;
        }

        if let Err(e) = inner.playback.play(panel_id, audio, &item.settings).await {
            warn!("Panel {} playback failed: {}", panel_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FakeSynth;

    #[async_trait]
    impl SpeechSynth for FakeSynth {
        async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Vec<u8>> {
            if text == "<empty>" {
                Err(CoChatError::EmptyAudio)
            } else {
                Ok(text.as_bytes().to_vec())
            }
        }
    }

    #[derive(Default)]
    struct RecordingPlayback {
        events: Mutex<Vec<(PanelId, &'static str, String)>>,
        delay: Duration,
    }

    impl RecordingPlayback {
        fn with_delay(ms: u64) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                delay: Duration::from_millis(ms),
            }
        }

        fn events(&self) -> Vec<(PanelId, &'static str, String)> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Playback for RecordingPlayback {
        async fn play(
            &self,
            panel_id: PanelId,
            audio: Vec<u8>,
            _settings: &VoiceSettings,
        ) -> Result<()> {
            let text = String::from_utf8_lossy(&audio).to_string();
            self.events.lock().unwrap().push((panel_id, "start", text.clone()));
            tokio::time::sleep(self.delay).await;
            self.events.lock().unwrap().push((panel_id, "end", text));
            Ok(())
        }

        fn stop_panel(&self, _panel_id: PanelId) {}
        fn stop_all(&self) {}
        fn pause_all(&self) {}
        fn resume_all(&self) {}
    }

    fn settings() -> VoiceSettings {
        VoiceSettings::with_voice("test-voice")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_panel_queue_plays_in_enqueue_order() {
        let playback = Arc::new(RecordingPlayback::with_delay(5));
        let scheduler = AudioScheduler::new(Arc::new(FakeSynth), playback.clone());

        scheduler.enqueue(1, "One.".into(), settings());
        scheduler.enqueue(1, "Two.".into(), settings());
        scheduler.enqueue(1, "Three.".into(), settings());
        settle().await;

        let texts: Vec<String> = playback
            .events()
            .into_iter()
            .filter(|(_, kind, _)| *kind == "start")
            .map(|(_, _, text)| text)
            .collect();
        assert_eq!(texts, vec!["One.", "Two.", "Three."]);
    }

    #[tokio::test]
    async fn test_exclusive_gate_prevents_overlap() {
        let playback = Arc::new(RecordingPlayback::with_delay(20));
        let scheduler = AudioScheduler::new(Arc::new(FakeSynth), playback.clone());
        scheduler.set_exclusive(true);

        for panel in 0..3u64 {
            scheduler.enqueue(panel, format!("Panel {panel}."), settings());
            scheduler.enqueue(panel, format!("Panel {panel} again."), settings());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut playing: Option<PanelId> = None;
        for (panel, kind, _) in playback.events() {
            match kind {
                "start" => {
                    assert!(playing.is_none(), "panel {panel} started while another was playing");
                    playing = Some(panel);
                }
                "end" => {
                    assert_eq!(playing, Some(panel));
                    playing = None;
                }
                _ => unreachable!(),
            }
        }
        assert_eq!(
            playback.events().len(),
            12,
            "all six items should have played"
        );
    }

    #[tokio::test]
    async fn test_mute_drops_new_enqueues() {
        let playback = Arc::new(RecordingPlayback::with_delay(1));
        let scheduler = AudioScheduler::new(Arc::new(FakeSynth), playback.clone());

        scheduler.set_muted(true);
        scheduler.enqueue(1, "Dropped.".into(), settings());
        settle().await;
        assert!(playback.events().is_empty());

        scheduler.set_muted(false);
        scheduler.enqueue(1, "Heard.".into(), settings());
        settle().await;
        assert_eq!(playback.events().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_audio_advances_queue() {
        let playback = Arc::new(RecordingPlayback::with_delay(1));
        let scheduler = AudioScheduler::new(Arc::new(FakeSynth), playback.clone());

        scheduler.enqueue(1, "<empty>".into(), settings());
        scheduler.enqueue(1, "Next.".into(), settings());
        settle().await;

        let texts: Vec<String> = playback
            .events()
            .into_iter()
            .filter(|(_, kind, _)| *kind == "start")
            .map(|(_, _, text)| text)
            .collect();
        assert_eq!(texts, vec!["Next."]);
    }

    #[tokio::test]
    async fn test_stop_panel_drains_pending_items() {
        let playback = Arc::new(RecordingPlayback::with_delay(50));
        let scheduler = AudioScheduler::new(Arc::new(FakeSynth), playback.clone());

        scheduler.enqueue(1, "First.".into(), settings());
        scheduler.enqueue(1, "Queued.".into(), settings());
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.stop_panel(1);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started: Vec<String> = playback
            .events()
            .into_iter()
            .filter(|(_, kind, _)| *kind == "start")
            .map(|(_, _, text)| text)
            .collect();
        assert_eq!(started, vec!["First."], "queued item should have been drained");
    }

    #[tokio::test]
    async fn test_missing_voice_skips_segment() {
        let playback = Arc::new(RecordingPlayback::with_delay(1));
        let scheduler = AudioScheduler::new(Arc::new(FakeSynth), playback.clone());

        scheduler.enqueue(1, "No voice.".into(), VoiceSettings::default());
        scheduler.enqueue(1, "Voiced.".into(), settings());
        settle().await;

        let started: Vec<String> = playback
            .events()
            .into_iter()
            .filter(|(_, kind, _)| *kind == "start")
            .map(|(_, _, text)| text)
            .collect();
        assert_eq!(started, vec!["Voiced."]);
    }
}
