//! CoChat - Multi-Panel Conversational Workbench Library
//!
//! A workbench core that orchestrates concurrent dialogues with a fleet of
//! OpenAI-compatible LLM endpoints:
//! - Panel orchestrator with Individual / Sequential / Parallel / Cyclic modes
//! - Streaming response assembly with sentence segmentation for TTS
//! - Per-panel audio queues with a global gate in Parallel mode
//! - Persistent conversation capture with export to markdown/text/JSON/PDF
//!
//! # Example
//!
//! ```ignore
//! use cochat::llm::LlmClient;
//! use cochat::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let client = LlmClient::new(&config.endpoints.llm_base_url);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod config;
pub mod persona;
pub mod llm;
pub mod tts;
pub mod panel;
pub mod orchestrator;
pub mod store;
pub mod export;
pub mod cli;

// Re-export commonly used types for convenience
pub use error::{CoChatError, Result};

pub use llm::{ChatMessage, ChatParams, ChatTransport, LlmClient};

pub use orchestrator::{Mode, Orchestrator, WorkbenchEvent};

pub use panel::{Panel, PanelState, SentenceSegmenter};

pub use store::{ConversationRecord, ConversationStore};

pub use tts::{AudioScheduler, TtsClient, VoiceSettings};

pub use types::{CancelToken, Message, MessageStatus, Role};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Multi-Panel Conversational Workbench", NAME, VERSION)
}
