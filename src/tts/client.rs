//! HTTP client for the external TTS service
//!
//! Non-streaming request/response: one POST per sentence segment, returning
//! opaque playable audio bytes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoChatError, Result};

/// A voice offered by the TTS service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default, rename = "isDefault")]
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
    voice: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
}

/// Seam between the audio scheduler and the synthesis backend
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Synthesize `text` with the given voice, returning playable audio
    /// bytes. An empty response body is reported as [`CoChatError::EmptyAudio`],
    /// which callers treat as success-with-silence.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

/// HTTP client for the TTS endpoints
#[derive(Clone)]
pub struct TtsClient {
    client: reqwest::Client,
    base_url: String,
}

impl TtsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// List available voices
    pub async fn voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(format!("{}/tts/voices", self.base_url))
            .send()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoChatError::Http(response.status().as_u16()));
        }

        let voices: Vec<Voice> = response
            .json()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;
        debug!("TTS service reported {} voices", voices.len());
        Ok(voices)
    }
}

#[async_trait]
impl SpeechSynth for TtsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let request = SpeakRequest {
            text,
            voice: voice_id,
            service: None,
        };

        let response = self
            .client
            .post(format!("{}/tts/speak", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 400 {
            return Err(CoChatError::VoiceUnavailable(voice_id.to_string()));
        }
        if !status.is_success() {
            return Err(CoChatError::Http(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;

        if bytes.is_empty() {
            return Err(CoChatError::EmptyAudio);
        }

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_deserializes_service_fields() {
        let json = r#"{"id":"v1","name":"Hazel","description":"UK English","service":"windows","isDefault":true}"#;
        let voice: Voice = serde_json::from_str(json).unwrap();
        assert_eq!(voice.id, "v1");
        assert_eq!(voice.service.as_deref(), Some("windows"));
        assert!(voice.is_default);
    }

    #[test]
    fn test_voice_optional_fields_default() {
        let json = r#"{"id":"v2","name":"Plain"}"#;
        let voice: Voice = serde_json::from_str(json).unwrap();
        assert!(voice.description.is_empty());
        assert!(voice.service.is_none());
        assert!(!voice.is_default);
    }

    #[test]
    fn test_speak_request_shape() {
        let request = SpeakRequest { text: "Hello.", voice: "v1", service: Some("windows") };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["text"], "Hello.");
        assert_eq!(value["voice"], "v1");
        assert_eq!(value["service"], "windows");
    }
}
