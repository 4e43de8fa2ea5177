use crate::state::{Context, QaConfig};

/// Configure generation parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "top_k | testcase_max_tokens | script_max_tokens"] param: Option<String>,
    #[description = "New value"] value: Option<u32>,
) -> Result<(), anyhow::Error> {
    if !ctx.data().is_admin(ctx.author().id.get()) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        (None, _) => {
            let config = *ctx.data().qa_config.read().await;
            ctx.say(format!(
                "**QA Configuration:**\n\
                 `top_k`: {}\n\
                 `testcase_max_tokens`: {}\n\
                 `script_max_tokens`: {}",
                config.top_k, config.testcase_max_tokens, config.script_max_tokens
            ))
            .await?;
        }
        (Some(key), Some(val)) => {
            let outcome = ctx.data().qa_config.write().await.set(key, val);
            match outcome {
                Ok(()) => {
                    tracing::info!(user = ctx.author().name, key, val, "Config updated");
                    ctx.say(format!("`{}` set to {}", key, val)).await?;
                }
                Err(msg) => {
                    ctx.say(msg).await?;
                }
            }
        }
        (Some(_), None) => {
            ctx.say(format!(
                "Provide both `param` and `value`. Example: `/qa config {} 4`",
                QaConfig::PARAMS[0]
            ))
            .await?;
        }
    }

    Ok(())
}
