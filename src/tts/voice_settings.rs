//! Per-panel voice preferences
//!
//! Each panel carries its own voice binding. New panels clone the binding
//! of the most recently created panel so a configured voice follows the
//! user as the workbench grows.

use serde::{Deserialize, Serialize};

/// Voice preference for one panel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSettings {
    /// Voice identifier understood by the TTS service; `None` disables
    /// audio for the panel
    pub voice_id: Option<String>,
    /// Playback rate multiplier
    pub rate: f32,
    /// Pitch multiplier (applied at synthesis time; playback cannot shift pitch)
    pub pitch: f32,
    /// Playback volume in [0.0, 1.0]
    pub volume: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceSettings {
    pub fn with_voice(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: Some(voice_id.into()),
            ..Self::default()
        }
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(0.5, 2.0);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(0.5, 2.0);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}
