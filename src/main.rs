//! cochat: multi-panel conversational workbench
//!
//! Orchestrates concurrent dialogues with a fleet of LLM endpoints, each
//! panel independently parameterized by model, role and posture, with
//! per-panel text-to-speech playback and persistent conversation capture.

use cochat::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (WARN level by default, use RUST_LOG=info for debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    cli::run().await
}
