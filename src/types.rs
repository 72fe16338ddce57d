//! Shared types used across modules
//!
//! This module contains the conversational data model that is used by
//! multiple modules to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A single message in a panel's conversation log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Monotonic id, unique within a panel
    pub id: u64,
    pub role: Role,
    /// Message text; accumulates while an assistant message is streaming
    pub content: String,
    /// Display label for assistant messages, e.g. "Researcher (analytical)"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_label: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            sender_label: None,
            timestamp: Utc::now(),
            status: MessageStatus::Complete,
        }
    }

    /// An empty assistant message ready to receive stream deltas
    pub fn assistant_streaming(id: u64, sender_label: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            sender_label: Some(sender_label.into()),
            timestamp: Utc::now(),
            status: MessageStatus::Streaming,
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Convert to OpenAI-style role string
    pub fn to_openai_string(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Parse from OpenAI-style role string
    pub fn from_openai_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
            Role::System => write!(f, "System"),
        }
    }
}

/// Lifecycle status of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Complete,
    Error,
}

/// Cooperative cancellation handle shared between a stream driver and its
/// caller. Cancelling fires at the next delta boundary; the underlying
/// HTTP read is dropped by the stream task when it observes the flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the token has been cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
