//! Conversation export
//!
//! Formats a stored conversation as markdown, plain text or JSON, and
//! renders PDFs through the external export endpoint. JSON export is the
//! record verbatim, so an exported conversation can be imported back
//! unchanged.

use serde::Serialize;
use std::str::FromStr;

use crate::error::{CoChatError, Result};
use crate::store::ConversationRecord;
use crate::types::Role;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Text,
    Json,
    Pdf,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Markdown => write!(f, "markdown"),
            ExportFormat::Text => write!(f, "text"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Pdf => write!(f, "pdf"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "text" | "txt" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            "pdf" => Ok(ExportFormat::Pdf),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

fn speaker_label(record: &ConversationRecord, index: usize) -> String {
    let stored = &record.messages[index];
    match stored.message.role {
        Role::User => "User".to_string(),
        _ => stored
            .message
            .sender_label
            .clone()
            .unwrap_or_else(|| "Assistant".to_string()),
    }
}

/// Render the record as markdown: title and timestamp header, one block
/// per message with sender label and formatted timestamp.
pub fn to_markdown(record: &ConversationRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", record.title));
    out.push_str(&format!(
        "_Saved {} ({} mode)_\n\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        record.mode
    ));

    for (index, stored) in record.messages.iter().enumerate() {
        out.push_str(&format!(
            "**{}** · Panel {} · {}\n\n{}\n\n---\n\n",
            speaker_label(record, index),
            stored.panel_index + 1,
            stored.message.timestamp.format("%H:%M:%S"),
            stored.message.content
        ));
    }
    out
}

/// Render the record as plain text: same content, no markdown decorations
pub fn to_text(record: &ConversationRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", record.title));
    out.push_str(&format!(
        "Saved {} ({} mode)\n\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        record.mode
    ));

    for (index, stored) in record.messages.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} (Panel {}): {}\n\n",
            stored.message.timestamp.format("%H:%M:%S"),
            speaker_label(record, index),
            stored.panel_index + 1,
            stored.message.content
        ));
    }
    out
}

/// Serialize the record verbatim
pub fn to_json(record: &ConversationRecord) -> Result<String> {
    serde_json::to_string_pretty(record).map_err(|e| CoChatError::Export(e.to_string()))
}

/// Parse a previously exported record
pub fn from_json(json: &str) -> Result<ConversationRecord> {
    serde_json::from_str(json).map_err(|e| CoChatError::Export(e.to_string()))
}

#[derive(Debug, Serialize)]
struct PdfRequest<'a> {
    content: &'a str,
}

/// Client for the external PDF rendering endpoint
#[derive(Clone)]
pub struct PdfExporter {
    client: reqwest::Client,
    base_url: String,
}

impl PdfExporter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Render formatted content to PDF bytes
    pub async fn render(&self, content: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/export/pdf", self.base_url))
            .json(&PdfRequest { content })
            .send()
            .await
            .map_err(|e| CoChatError::Export(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoChatError::Export(format!(
                "PDF endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoChatError::Export(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Export a record in the requested format. PDF delegates the plain-text
/// rendering to the external endpoint.
pub async fn export(
    record: &ConversationRecord,
    format: ExportFormat,
    pdf: &PdfExporter,
) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Markdown => Ok(to_markdown(record).into_bytes()),
        ExportFormat::Text => Ok(to_text(record).into_bytes()),
        ExportFormat::Json => Ok(to_json(record)?.into_bytes()),
        ExportFormat::Pdf => pdf.render(&to_text(record)).await,
    }
}
