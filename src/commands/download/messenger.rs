//! Transport seam for the song command.
//!
//! The request pipeline talks to the chat through [`SongMessenger`] so the
//! flow can be exercised against a recording fake, with [`DiscordMessenger`]
//! as the real implementation over the poise context.

use ::serenity::all::{
    CreateAttachment, CreateEmbed, CreateEmbedFooter, ReactionType, Timestamp,
};
use poise::CreateReply;
use serenity::async_trait;
use tracing::debug;

use super::{AudioPayload, SongInfo};

/// Emoji acknowledgments attached to the invoking message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Searching,
    Success,
    Failure,
}

impl Reaction {
    pub fn emoji(self) -> char {
        match self {
            Reaction::Searching => '🎵',
            Reaction::Success => '✅',
            Reaction::Failure => '❌',
        }
    }
}

pub type SendResult = Result<(), crate::Error>;

/// The chat capabilities the song pipeline consumes.
#[async_trait]
pub trait SongMessenger: Send + Sync {
    /// Attaches an emoji acknowledgment to the triggering message.
    async fn react(&self, reaction: Reaction) -> SendResult;

    /// Sends a quoted text reply.
    async fn reply(&self, text: &str) -> SendResult;

    /// Sends the rich preview for a song that carries a thumbnail.
    async fn send_preview(&self, song: &SongInfo, details: &str) -> SendResult;

    /// Sends the downloaded audio as an attachment with link metadata.
    async fn send_audio(&self, song: &SongInfo, audio: AudioPayload) -> SendResult;
}

/// Discord-backed messenger over the command context.
pub struct DiscordMessenger<'a> {
    ctx: crate::Context<'a>,
}

impl<'a> DiscordMessenger<'a> {
    pub fn new(ctx: crate::Context<'a>) -> Self {
        Self { ctx }
    }

    /// Link-preview style embed shared by the preview and audio messages.
    fn link_embed(&self, song: &SongInfo, body: String) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(song.title.clone())
            .description(body)
            .color(0x00ff00)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new("via YouTube"));

        if let Some(url) = &song.url {
            embed = embed.url(url.clone());
        }

        embed
    }
}

#[async_trait]
impl SongMessenger for DiscordMessenger<'_> {
    async fn react(&self, reaction: Reaction) -> SendResult {
        // Only prefix invocations have a user message to attach emoji to.
        if let poise::Context::Prefix(prefix) = self.ctx {
            prefix
                .msg
                .react(
                    self.ctx.serenity_context(),
                    ReactionType::Unicode(reaction.emoji().to_string()),
                )
                .await?;
        } else {
            debug!("skipping {:?} reaction outside prefix context", reaction);
        }
        Ok(())
    }

    async fn reply(&self, text: &str) -> SendResult {
        self.ctx.reply(text).await?;
        Ok(())
    }

    async fn send_preview(&self, song: &SongInfo, details: &str) -> SendResult {
        let body = format!(
            "Duration: {} | Channel: {}",
            song.duration.as_deref().unwrap_or("Unknown"),
            song.channel.as_deref().unwrap_or("Unknown"),
        );

        let mut embed = self.link_embed(song, body);
        if let Some(thumbnail) = &song.thumbnail {
            embed = embed.image(thumbnail.clone());
        }

        let reply = CreateReply::default()
            .content(details.to_string())
            .embed(embed)
            .reply(true);
        self.ctx.send(reply).await?;
        Ok(())
    }

    async fn send_audio(&self, song: &SongInfo, audio: AudioPayload) -> SendResult {
        debug!(
            "sending {} ({}, {} bytes)",
            audio.filename,
            audio.mime,
            audio.bytes.len()
        );
        let attachment = CreateAttachment::bytes(audio.bytes, audio.filename);

        let body = song.channel.clone().unwrap_or_else(|| "Music".to_string());
        let mut embed = self.link_embed(song, body);
        if let Some(thumbnail) = &song.thumbnail {
            embed = embed.thumbnail(thumbnail.clone());
        }

        let reply = CreateReply::default()
            .attachment(attachment)
            .embed(embed)
            .reply(true);
        self.ctx.send(reply).await?;
        Ok(())
    }
}
