//! Module backing the `/song` download command.
//! Contains the typed client for the song search/download API, the data model
//! for a search hit, and the error classification shared by the command.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::HTTP_CLIENT;

/// Transport seam used by the command: reactions, replies, previews, audio sends.
pub(crate) mod messenger;
/// The `/song` command and its request pipeline.
pub(crate) mod song;

/// Base URL of the song search API.
const API: &str = "https://api-site-chi.vercel.app/api/";

/// Timeout for the metadata search call.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for fetching the audio itself, which can be large.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
/// Ceiling on the size of a downloaded audio file.
const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// MIME type of every delivered audio file.
pub const AUDIO_MIME: &str = "audio/mpeg";

/// Errors that can occur while resolving and downloading a song.
///
/// The discriminant is decided at the call site from the transport error or
/// HTTP status, so the user-facing mapping in [`failure_message`] never has
/// to sniff error strings.
#[derive(Error, Debug)]
pub enum SongError {
    /// Either HTTP call exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// The upstream answered 404.
    #[error("song not found")]
    NotFound,

    /// The upstream answered with a 5xx status.
    #[error("upstream server error")]
    Server,

    /// The search payload is missing `title` or `downloadUrl`.
    #[error("invalid response from API - missing required fields")]
    MissingFields,

    /// The search payload carried an `error` field; its text is surfaced as-is.
    #[error("{0}")]
    Upstream(String),

    /// The audio file exceeds the download ceiling.
    #[error("download of {0} bytes exceeds the 100 MB limit")]
    TooLarge(u64),

    /// Error during HTTP request communication.
    #[error("API communication failure: {0}")]
    Api(#[from] reqwest::Error),

    /// Error parsing the JSON response from the API.
    #[error("unable to parse response: {0}")]
    Json(#[from] serde_json::Error),

    /// A message send to the chat failed mid-pipeline.
    #[error("message delivery failed: {0}")]
    Delivery(#[source] crate::Error),
}

/// Raw wire shape of the search response. Every field is optional; validation
/// into [`SongInfo`] happens exactly once, at the API boundary.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    error: Option<String>,
    title: Option<String>,
    duration: Option<String>,
    channel: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
}

impl SearchResponse {
    /// Promotes the raw payload to a validated [`SongInfo`].
    /// A missing or empty `title`/`downloadUrl` is an invalid response.
    fn validate(self) -> Result<SongInfo, SongError> {
        match (self.title, self.download_url) {
            (Some(title), Some(download_url))
                if !title.is_empty() && !download_url.is_empty() =>
            {
                Ok(SongInfo {
                    title,
                    duration: self.duration,
                    channel: self.channel,
                    url: self.url,
                    thumbnail: self.thumbnail,
                    download_url,
                })
            }
            _ => Err(SongError::MissingFields),
        }
    }
}

/// A validated search hit. Lives for a single command invocation.
#[derive(Debug, Clone)]
pub struct SongInfo {
    pub title: String,
    pub duration: Option<String>,
    pub channel: Option<String>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub download_url: String,
}

/// Downloaded audio plus the send metadata derived from the song title.
#[derive(Debug)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: &'static str,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>, title: &str) -> Self {
        Self {
            bytes,
            filename: audio_filename(title),
            mime: AUDIO_MIME,
        }
    }
}

/// Characters that are unsafe in attachment filenames.
static FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]+"#).unwrap());

/// Derives an `.mp3` filename from a song title.
pub fn audio_filename(title: &str) -> String {
    let cleaned = FILENAME_CHARS.replace_all(title.trim(), "_");
    let cleaned = cleaned.trim_matches(['_', ' ', '.']);
    if cleaned.is_empty() {
        "song.mp3".to_string()
    } else {
        format!("{cleaned}.mp3")
    }
}

/// Renders the details block shown to the requester once a song is found.
pub fn format_details(song: &SongInfo) -> String {
    format!(
        "🎵 **SONG FOUND**\n\n\
         📌 **Title:** {}\n\
         ⏱️ **Duration:** {}\n\
         👤 **Channel:** {}\n\
         🔗 **Source:** {}\n\n\
         ⏳ Downloading audio file...",
        song.title,
        song.duration.as_deref().unwrap_or("Unknown"),
        song.channel.as_deref().unwrap_or("Unknown"),
        song.url.as_deref().unwrap_or("YouTube"),
    )
}

/// Maps a [`SongError`] to the single user-facing failure reply.
pub fn failure_message(err: &SongError) -> String {
    let detail = match err {
        SongError::Timeout => {
            "⏱️ Request timed out. The song might be too large or the server is slow. \
             Please try again."
                .to_string()
        }
        SongError::NotFound => {
            "🔍 Song not found. Please try a different search query.".to_string()
        }
        SongError::Server => "🔧 Server error. Please try again later.".to_string(),
        SongError::MissingFields => {
            "📭 No results found for your search. Try different keywords.".to_string()
        }
        other => format!("💭 Error: {other}"),
    };

    format!("❌ Failed to download the song.\n\n{detail}")
}

/// Client for the song search/download API.
///
/// `Default` carries the production endpoint and limits; tests point
/// `base_url` at a mock server and tighten the timeouts.
#[derive(Debug, Clone)]
pub struct SongApi {
    base_url: String,
    search_timeout: Duration,
    download_timeout: Duration,
    max_download_bytes: u64,
}

impl Default for SongApi {
    fn default() -> Self {
        Self {
            base_url: API.to_string(),
            search_timeout: SEARCH_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
            max_download_bytes: MAX_DOWNLOAD_BYTES,
        }
    }
}

impl SongApi {
    /// Looks up a song by free-text query and returns the validated hit.
    pub async fn search(&self, query: &str) -> Result<SongInfo, SongError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| SongError::Upstream(format!("invalid API URL '{}': {e}", self.base_url)))?;
        let endpoint = base
            .join("ytmp3")
            .map_err(|e| SongError::Upstream(format!("invalid API endpoint: {e}")))?;

        let response = HTTP_CLIENT
            .get(endpoint)
            .query(&[("query", query)])
            .timeout(self.search_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response)?;

        let body = response.text().await.map_err(transport_error)?;
        let payload: SearchResponse = serde_json::from_str(&body)?;

        // An `error` field trumps whatever else the payload carries.
        if let Some(message) = payload.error {
            return Err(SongError::Upstream(message));
        }

        payload.validate()
    }

    /// Fetches the audio behind `url`, enforcing the size ceiling against the
    /// declared length and again while the body accumulates.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, SongError> {
        let response = HTTP_CLIENT
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let mut response = check_status(response)?;

        if let Some(length) = response.content_length() {
            if length > self.max_download_bytes {
                return Err(SongError::TooLarge(length));
            }
        }

        let mut audio: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            let total = (audio.len() + chunk.len()) as u64;
            if total > self.max_download_bytes {
                return Err(SongError::TooLarge(total));
            }
            audio.extend_from_slice(&chunk);
        }

        debug!("downloaded {} bytes of audio", audio.len());
        Ok(audio)
    }
}

/// Classifies a reqwest transport failure.
fn transport_error(err: reqwest::Error) -> SongError {
    if err.is_timeout() {
        SongError::Timeout
    } else {
        SongError::Api(err)
    }
}

/// Classifies a non-success HTTP status.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SongError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(SongError::NotFound);
    }
    if status.is_server_error() {
        return Err(SongError::Server);
    }
    response.error_for_status().map_err(SongError::Api)
}
