//! This module aggregates all the command modules for the bot.

/// Commands that fetch media through the song download API.
pub(crate) mod download;
/// General purpose commands (e.g., ping, help).
pub(crate) mod general;
