use crate::qa::selectors::GroundingReport;
use crate::qa::ScriptArtifact;
use crate::state::Context;
use poise::serenity_prelude as serenity;
use tracing::info;

/// Generate a Selenium script for one test case against the current markup
#[poise::command(slash_command, guild_only)]
pub async fn script(
    ctx: Context<'_>,
    #[description = "Test_ID from your last /qa testcases run"]
    #[autocomplete = "autocomplete_test_id"]
    test_id: Option<String>,
    #[description = "Test case as a JSON object (overrides test_id)"] test_case: Option<String>,
) -> Result<(), anyhow::Error> {
    let input = match (test_case, test_id) {
        (Some(json), _) => json,
        (None, Some(id)) => {
            let found = ctx
                .data()
                .testcases
                .read()
                .await
                .get(&ctx.author().id.get())
                .and_then(|cases| cases.iter().find(|c| c.test_id == id))
                .map(serde_json::to_string)
                .transpose()?;
            match found {
                Some(json) => json,
                None => {
                    ctx.say(format!(
                        "No test case `{}` in your last `/qa testcases` run.",
                        id
                    ))
                    .await?;
                    return Ok(());
                }
            }
        }
        (None, None) => {
            ctx.say("Provide a `test_id` from `/qa testcases` or a `test_case` JSON object.")
                .await?;
            return Ok(());
        }
    };

    ctx.defer().await?;
    let max_tokens = ctx.data().qa_config.read().await.script_max_tokens;
    info!(user = ctx.author().name, input_len = input.len(), "Script generation started");

    let artifact = match ctx
        .data()
        .orchestrator
        .generate_script(&input, max_tokens)
        .await
    {
        Ok(artifact) => artifact,
        Err(e) => {
            ctx.say(format!("Script generation failed: {}", e)).await?;
            return Ok(());
        }
    };

    let file_name = artifact.file_name();
    ctx.send(
        poise::CreateReply::default()
            .content(describe(&artifact))
            .attachment(serenity::CreateAttachment::bytes(
                artifact.script.into_bytes(),
                file_name,
            )),
    )
    .await?;
    Ok(())
}

fn describe(artifact: &ScriptArtifact) -> String {
    let mut out = format!(
        "**Selenium script** for `{}`\nReference markup: **{}**\n",
        artifact.test_id.as_deref().unwrap_or("test case"),
        artifact.reference_used
    );
    out.push_str(&grounding_notes(&artifact.grounding));
    out
}

fn grounding_notes(report: &GroundingReport) -> String {
    let mut notes = String::new();
    if !report.reference_literal_present {
        notes.push_str("Warning: the script does not set `html_file_path` to the reference file.\n");
    }
    if !report.unknown_selectors.is_empty() {
        let listed: Vec<String> = report
            .unknown_selectors
            .iter()
            .take(10)
            .map(|s| format!("`{}`", s))
            .collect();
        notes.push_str(&format!(
            "Warning: selectors not found in the markup: {}\n",
            listed.join(", ")
        ));
    }
    if !report.selectors_checked {
        notes.push_str("Selectors could not be checked against the markup.\n");
    }
    notes
}

/// Autocomplete Test_IDs from the caller's last generated test cases.
async fn autocomplete_test_id(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    ctx.data()
        .testcases
        .read()
        .await
        .get(&ctx.author().id.get())
        .map(|cases| {
            cases
                .iter()
                .map(|c| c.test_id.clone())
                .filter(|id| id.to_lowercase().contains(&partial))
                .take(25)
                .collect()
        })
        .unwrap_or_default()
}
