use crate::commands::send_chunked;
use crate::qa::extract::{StructuredResult, TestCase};
use crate::state::Context;
use poise::serenity_prelude as serenity;
use tracing::info;

/// Summary lines kept in the message body; the attachment has everything.
const SUMMARY_LINES: usize = 15;

/// Generate test cases from the ingested documents
#[poise::command(slash_command, guild_only)]
pub async fn testcases(
    ctx: Context<'_>,
    #[description = "What to test, e.g. \"discount code at checkout\""] request: String,
    #[description = "Context documents to retrieve"] top_k: Option<u32>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let config = *ctx.data().qa_config.read().await;
    let top_k = top_k.map(|k| k as usize).unwrap_or(config.top_k);
    info!(user = ctx.author().name, request, top_k, "Test case generation started");

    let result = match ctx
        .data()
        .orchestrator
        .generate_test_cases(&request, top_k, config.testcase_max_tokens)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            ctx.say(format!("Test case generation failed: {}", e)).await?;
            return Ok(());
        }
    };

    match result {
        StructuredResult::Parsed(cases) => {
            if cases.is_empty() {
                ctx.say("The model returned an empty list of test cases.").await?;
                return Ok(());
            }
            let json = serde_json::to_string_pretty(&cases)?;
            let content = summarize(&cases);
            ctx.data()
                .testcases
                .write()
                .await
                .insert(ctx.author().id.get(), cases);

            ctx.send(
                poise::CreateReply::default()
                    .content(content)
                    .attachment(serenity::CreateAttachment::bytes(
                        json.into_bytes(),
                        "testcases.json",
                    )),
            )
            .await?;
        }
        StructuredResult::Unparsed { raw, error } => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!(
                        "The model output could not be parsed as test cases: {}",
                        error
                    ))
                    .attachment(serenity::CreateAttachment::bytes(
                        raw.into_bytes(),
                        "raw_output.txt",
                    )),
            )
            .await?;
        }
    }
    Ok(())
}

fn summarize(cases: &[TestCase]) -> String {
    let mut out = format!("**Generated {} test case(s)**\n", cases.len());
    for case in cases.iter().take(SUMMARY_LINES) {
        let scenario: String = case.scenario.chars().take(90).collect();
        out.push_str(&format!("- `{}` {}: {}\n", case.test_id, case.feature, scenario));
    }
    if cases.len() > SUMMARY_LINES {
        out.push_str(&format!("...and {} more\n", cases.len() - SUMMARY_LINES));
    }
    out.push_str("\nUse `/qa script test_id:<Test_ID>` to generate a Selenium script.");
    out
}

/// Show the test cases last generated for you.
#[poise::command(slash_command, guild_only)]
pub async fn last(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let text = ctx
        .data()
        .testcases
        .read()
        .await
        .get(&ctx.author().id.get())
        .map(|cases| summarize(cases));
    match text {
        Some(text) => send_chunked(&ctx, &text).await,
        None => {
            ctx.say("No test cases generated yet. Use `/qa testcases` first.")
                .await?;
            Ok(())
        }
    }
}
