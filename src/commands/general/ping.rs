use ::serenity::all::CreateEmbed;
use poise::CreateReply;

use crate::{CommandResult, Context};

/// Ping the bot to check its latency
#[poise::command(slash_command, prefix_command, category = "General")]
pub async fn ping(ctx: Context<'_>) -> CommandResult {
    let latency = ctx.ping().await;

    let embed = CreateEmbed::new().title("Pong!").field(
        "Gateway latency",
        format!("{} ms", latency.as_millis()),
        false,
    );

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}
