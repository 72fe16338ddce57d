//! Text-to-speech pipeline
//!
//! The TTS side of the workbench: an HTTP client for the synthesis service,
//! per-panel voice preferences, the audio scheduler that drains sentence
//! segments in order, and the playback backend behind a trait seam.

pub mod client;
pub mod playback;
pub mod scheduler;
pub mod voice_settings;

pub use client::{SpeechSynth, TtsClient, Voice};
pub use playback::{Playback, RodioPlayback};
pub use scheduler::{AudioScheduler, PanelId};
pub use voice_settings::VoiceSettings;
