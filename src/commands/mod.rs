mod config;
mod ingest;
mod script;
mod sources;
mod testcases;

use crate::state::Context;

/// QA assistant: test cases and Selenium scripts grounded in your documents
#[poise::command(
    slash_command,
    subcommands(
        "ingest::ingest",
        "ingest::markup",
        "ingest::ingest_url",
        "testcases::testcases",
        "testcases::last",
        "script::script",
        "sources::sources",
        "config::config"
    )
)]
pub async fn qa(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Send a message in Discord-safe chunks (max 1990 chars).
/// Follow-ups go through the interaction webhook, so no Send Messages
/// channel permission is needed.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_chunks(text, 1990) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Split on line or word boundaries where possible, never inside a char.
fn split_chunks(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max {
            chunks.push(remaining);
            break;
        }
        let mut end = max;
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        let split_at = remaining[..end]
            .rfind('\n')
            .or_else(|| remaining[..end].rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(end);
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}
