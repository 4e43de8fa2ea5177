use crate::commands::send_chunked;
use crate::docs::types::DocKind;
use crate::state::Context;

/// List ingested documents and the current reference markup
#[poise::command(slash_command, guild_only)]
pub async fn sources(
    ctx: Context<'_>,
    #[description = "Max documents to show"] limit: Option<u32>,
) -> Result<(), anyhow::Error> {
    let limit = limit.unwrap_or(20) as usize;
    let docs = ctx.data().index.list(limit).await;

    if docs.is_empty() {
        ctx.say("No documents ingested yet. Use `/qa ingest` or `/qa markup` to add some.")
            .await?;
        return Ok(());
    }

    let mut output = String::from("**Ingested Documents**\n\n");
    match ctx.data().tracker.get().await {
        Some(reference) => output.push_str(&format!(
            "Reference markup: **{}** (version {})\n\n",
            reference.filename, reference.version
        )),
        None => output.push_str("Reference markup: none yet\n\n"),
    }

    for (kind, title) in [(DocKind::Document, "Documents"), (DocKind::Markup, "Markup")] {
        let group: Vec<_> = docs.iter().filter(|d| d.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        output.push_str(&format!("**{}**\n", title));
        for doc in group {
            let when = chrono::DateTime::from_timestamp(doc.ingested_at, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            output.push_str(&format!(
                "  - {} ({} KB) `{}` {}{}\n",
                doc.source,
                doc.size / 1024,
                &doc.id[..12],
                when,
                if doc.lossy { " (lossy)" } else { "" }
            ));
        }
        output.push('\n');
    }
    output.push_str(&format!(
        "{} document(s) indexed with `{}`",
        ctx.data().index.len().await,
        ctx.data().index.profile()
    ));

    send_chunked(&ctx, &output).await
}
