//! Audio playback backend
//!
//! The scheduler talks to playback through the [`Playback`] trait so the
//! pipeline is testable without a sound device. The production
//! implementation decodes the opaque audio bytes with rodio and keeps one
//! sink per panel so panels can play independently outside Parallel mode.

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::scheduler::PanelId;
use super::voice_settings::VoiceSettings;
use crate::error::{CoChatError, Result};

/// Playback backend seam
#[async_trait]
pub trait Playback: Send + Sync {
    /// Play one audio item on a panel's channel; resolves when the item
    /// finishes or is stopped
    async fn play(&self, panel_id: PanelId, audio: Vec<u8>, settings: &VoiceSettings) -> Result<()>;

    /// Stop the in-flight item on one panel's channel
    fn stop_panel(&self, panel_id: PanelId);

    /// Stop all in-flight items
    fn stop_all(&self);

    /// Suspend playback on every channel; queued items are retained
    fn pause_all(&self);

    /// Resume suspended playback
    fn resume_all(&self);
}

/// Discards audio. Used when no output device is available so the
/// workbench keeps working headless.
pub struct SilentPlayback;

#[async_trait]
impl Playback for SilentPlayback {
    async fn play(
        &self,
        _panel_id: PanelId,
        _audio: Vec<u8>,
        _settings: &VoiceSettings,
    ) -> Result<()> {
        Ok(())
    }

    fn stop_panel(&self, _panel_id: PanelId) {}
    fn stop_all(&self) {}
    fn pause_all(&self) {}
    fn resume_all(&self) {}
}

/// rodio-backed playback with one sink per panel
pub struct RodioPlayback {
    handle: OutputStreamHandle,
    sinks: Mutex<HashMap<PanelId, Arc<Sink>>>,
}

impl RodioPlayback {
    /// Open the default output device. The output stream is parked on a
    /// dedicated thread because it is not `Send`; the handle it produces is.
    pub fn new() -> Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || match OutputStream::try_default() {
            Ok((stream, handle)) => {
                let _ = tx.send(Ok(handle));
                // Keep `stream` alive for the process lifetime.
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = tx.send(Err(CoChatError::Transport(format!(
                    "failed to open audio output: {e}"
                ))));
            }
        });

        let handle = rx
            .recv()
            .map_err(|_| CoChatError::Transport("audio output thread died".to_string()))??;
        info!("Audio output initialized");
        Ok(Self {
            handle,
            sinks: Mutex::new(HashMap::new()),
        })
    }

    fn sink_for(&self, panel_id: PanelId) -> Result<Arc<Sink>> {
        let mut sinks = self.sinks.lock().expect("sink map poisoned");
        if let Some(sink) = sinks.get(&panel_id) {
            return Ok(sink.clone());
        }
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| CoChatError::Transport(format!("failed to create audio sink: {e}")))?;
        let sink = Arc::new(sink);
        sinks.insert(panel_id, sink.clone());
        Ok(sink)
    }
}

#[async_trait]
impl Playback for RodioPlayback {
    async fn play(&self, panel_id: PanelId, audio: Vec<u8>, settings: &VoiceSettings) -> Result<()> {
        let source = Decoder::new(Cursor::new(audio))
            .map_err(|e| CoChatError::Transport(format!("audio decode failed: {e}")))?;

        let sink = self.sink_for(panel_id)?;
        sink.set_volume(settings.volume);
        sink.set_speed(settings.rate);
        sink.append(source);
        debug!("Panel {} playing audio item", panel_id);

        let wait = sink.clone();
        tokio::task::spawn_blocking(move || wait.sleep_until_end())
            .await
            .map_err(|e| CoChatError::Transport(format!("playback task failed: {e}")))?;
        Ok(())
    }

    fn stop_panel(&self, panel_id: PanelId) {
        let mut sinks = self.sinks.lock().expect("sink map poisoned");
        // Drop the sink after stopping; the next play creates a fresh one.
        if let Some(sink) = sinks.remove(&panel_id) {
            sink.stop();
        }
    }

    fn stop_all(&self) {
        let mut sinks = self.sinks.lock().expect("sink map poisoned");
        for (_, sink) in sinks.drain() {
            sink.stop();
        }
    }

    fn pause_all(&self) {
        let sinks = self.sinks.lock().expect("sink map poisoned");
        for sink in sinks.values() {
            sink.pause();
        }
    }

    fn resume_all(&self) {
        let sinks = self.sinks.lock().expect("sink map poisoned");
        for sink in sinks.values() {
            sink.play();
        }
    }
}
