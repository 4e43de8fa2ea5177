use crate::state::Context;
use poise::serenity_prelude as serenity;
use tracing::info;

/// Uploads above this are refused before download.
const MAX_UPLOAD_BYTES: u32 = 8 * 1024 * 1024;

async fn download(attachment: &serenity::Attachment) -> Result<Vec<u8>, anyhow::Error> {
    anyhow::ensure!(
        attachment.size <= MAX_UPLOAD_BYTES,
        "`{}` is {} KB; the limit is {} KB",
        attachment.filename,
        attachment.size / 1024,
        MAX_UPLOAD_BYTES / 1024
    );
    Ok(attachment.download().await?)
}

/// Ingest a requirements document (text, markdown, ...)
#[poise::command(slash_command, guild_only)]
pub async fn ingest(
    ctx: Context<'_>,
    #[description = "Document to add to the knowledge base"] file: serenity::Attachment,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    info!(user = ctx.author().name, file = %file.filename, "Document upload");

    let raw = download(&file).await?;
    let receipt = ctx
        .data()
        .ingestion
        .ingest_document(raw, &file.filename)
        .await?;

    let mut reply = format!(
        "Ingested **{}** ({} bytes)\nDoc ID: `{}`",
        receipt.source,
        receipt.size,
        &receipt.doc_id[..12]
    );
    if receipt.lossy {
        reply.push_str("\nNote: the file was not valid UTF-8; unreadable bytes were replaced.");
    }
    ctx.say(reply).await?;
    Ok(())
}

/// Ingest the HTML page that generated scripts will run against
#[poise::command(slash_command, guild_only)]
pub async fn markup(
    ctx: Context<'_>,
    #[description = "HTML file of the page under test"] file: serenity::Attachment,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    info!(user = ctx.author().name, file = %file.filename, "Markup upload");

    let raw = download(&file).await?;
    let doc = ctx.data().ingestion.ingest_markup(raw, &file.filename).await?;

    let mut reply = format!(
        "Reference markup set to **{}** (version {}, {} bytes)\nDoc ID: `{}`",
        doc.filename,
        doc.version,
        doc.content.len(),
        &doc.doc_id[..12]
    );
    if doc.lossy {
        reply.push_str("\nNote: the file was not valid UTF-8; unreadable bytes were replaced.");
    }
    ctx.say(reply).await?;
    Ok(())
}

/// Ingest a web page as a requirements document
#[poise::command(slash_command, guild_only)]
pub async fn ingest_url(
    ctx: Context<'_>,
    #[description = "URL of the page"] url: String,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;
    info!(user = ctx.author().name, url, "URL ingestion started");

    let receipt = ctx.data().ingestion.ingest_url(&url).await?;

    ctx.say(format!(
        "Ingested **{}** ({} bytes)\nDoc ID: `{}`",
        receipt.source,
        receipt.size,
        &receipt.doc_id[..12]
    ))
    .await?;
    Ok(())
}
