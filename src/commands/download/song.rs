use tracing::{error, info};

use super::messenger::{DiscordMessenger, Reaction, SongMessenger};
use super::{AudioPayload, SongApi, SongError, failure_message, format_details};
use crate::{CommandResult, Context};

const USAGE: &str = "❌ Please provide a song name!\n\n\
                     Usage: !song <song name>\n\
                     Example: !song Despacito";

/// Search for a song and receive it as an MP3 file
#[poise::command(slash_command, prefix_command, category = "Download")]
pub async fn song(
    ctx: Context<'_>,
    #[description = "Song name to search for"]
    #[rest]
    query: Option<String>,
) -> CommandResult {
    info!("Received song command with query: {:?}", query);
    ctx.defer().await?;

    let messenger = DiscordMessenger::new(ctx);
    let api = SongApi::default();
    handle_song_request(&messenger, &api, query.as_deref().unwrap_or_default()).await
}

/// Runs one song request end to end: validate, acknowledge, search, preview,
/// download, deliver. Every failure past validation funnels into a single
/// failure reaction plus one explanatory reply; nothing is retried.
pub async fn handle_song_request<M: SongMessenger>(
    messenger: &M,
    api: &SongApi,
    query: &str,
) -> CommandResult {
    if query.trim().is_empty() {
        messenger.react(Reaction::Failure).await?;
        messenger.reply(USAGE).await?;
        return Ok(());
    }

    if let Err(err) = deliver_song(messenger, api, query).await {
        error!("song request failed: {err}");
        messenger.react(Reaction::Failure).await?;
        messenger.reply(&failure_message(&err)).await?;
    }

    Ok(())
}

async fn deliver_song<M: SongMessenger>(
    messenger: &M,
    api: &SongApi,
    query: &str,
) -> Result<(), SongError> {
    messenger
        .react(Reaction::Searching)
        .await
        .map_err(SongError::Delivery)?;
    messenger
        .reply("🔍 Searching for your song...")
        .await
        .map_err(SongError::Delivery)?;

    let song = api.search(query).await?;
    info!("found \"{}\", fetching audio", song.title);

    let details = format_details(&song);
    if song.thumbnail.is_some() {
        messenger
            .send_preview(&song, &details)
            .await
            .map_err(SongError::Delivery)?;
    } else {
        messenger
            .reply(&details)
            .await
            .map_err(SongError::Delivery)?;
    }

    let bytes = api.download(&song.download_url).await?;
    let payload = AudioPayload::new(bytes, &song.title);
    messenger
        .send_audio(&song, payload)
        .await
        .map_err(SongError::Delivery)?;

    messenger
        .react(Reaction::Success)
        .await
        .map_err(SongError::Delivery)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use serenity::async_trait;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::commands::download::SongInfo;
    use crate::commands::download::messenger::SendResult;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        React(Reaction),
        Reply(String),
        Preview(String),
        Audio(String),
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingMessenger {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn failure_reactions(&self) -> usize {
            self.sent()
                .iter()
                .filter(|s| **s == Sent::React(Reaction::Failure))
                .count()
        }
    }

    #[async_trait]
    impl SongMessenger for RecordingMessenger {
        async fn react(&self, reaction: Reaction) -> SendResult {
            self.sent.lock().unwrap().push(Sent::React(reaction));
            Ok(())
        }

        async fn reply(&self, text: &str) -> SendResult {
            self.sent.lock().unwrap().push(Sent::Reply(text.to_string()));
            Ok(())
        }

        async fn send_preview(&self, song: &SongInfo, _details: &str) -> SendResult {
            self.sent.lock().unwrap().push(Sent::Preview(song.title.clone()));
            Ok(())
        }

        async fn send_audio(&self, _song: &SongInfo, audio: AudioPayload) -> SendResult {
            self.sent.lock().unwrap().push(Sent::Audio(audio.filename));
            Ok(())
        }
    }

    fn test_api(server: &MockServer) -> SongApi {
        SongApi {
            base_url: server.uri(),
            ..Default::default()
        }
    }

    async fn mount_search(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/ytmp3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn found_song(server: &MockServer, thumbnail: bool) -> serde_json::Value {
        let mut body = json!({
            "title": "Despacito",
            "duration": "4:41",
            "channel": "Luis Fonsi",
            "url": "https://youtube.com/watch?v=kJQP7kiw5Fk",
            "downloadUrl": format!("{}/files/song.mp3", server.uri()),
        });
        if thumbnail {
            body["thumbnail"] = json!("https://i.ytimg.com/vi/kJQP7kiw5Fk/hq720.jpg");
        }
        body
    }

    #[tokio::test]
    async fn empty_query_short_circuits_without_api_calls() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &test_api(&server), "   ")
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], Sent::React(Reaction::Failure));
        assert_matches!(&sent[1], Sent::Reply(text) if text.contains("Please provide a song name"));
        server.verify().await;
    }

    #[tokio::test]
    async fn full_flow_with_thumbnail_delivers_audio() {
        let server = MockServer::start().await;
        mount_search(&server, found_song(&server, true)).await;
        Mock::given(method("GET"))
            .and(path("/files/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &test_api(&server), "despacito")
            .await
            .unwrap();

        assert_eq!(
            messenger.sent(),
            vec![
                Sent::React(Reaction::Searching),
                Sent::Reply("🔍 Searching for your song...".to_string()),
                Sent::Preview("Despacito".to_string()),
                Sent::Audio("Despacito.mp3".to_string()),
                Sent::React(Reaction::Success),
            ]
        );
    }

    #[tokio::test]
    async fn missing_thumbnail_falls_back_to_text_preview() {
        let server = MockServer::start().await;
        mount_search(&server, found_song(&server, false)).await;
        Mock::given(method("GET"))
            .and(path("/files/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &test_api(&server), "despacito")
            .await
            .unwrap();

        let sent = messenger.sent();
        assert!(!sent.iter().any(|s| matches!(s, Sent::Preview(_))));
        assert_matches!(&sent[2], Sent::Reply(text) if text.contains("SONG FOUND"));
        assert_eq!(sent[4], Sent::React(Reaction::Success));
    }

    #[tokio::test]
    async fn missing_fields_skips_download_and_reports_no_results() {
        let server = MockServer::start().await;
        mount_search(&server, json!({ "title": "Despacito" })).await;
        Mock::given(method("GET"))
            .and(path("/files/song.mp3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &test_api(&server), "despacito")
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(messenger.failure_reactions(), 1);
        assert_matches!(sent.last().unwrap(), Sent::Reply(text) if text.contains("No results found"));
        server.verify().await;
    }

    #[tokio::test]
    async fn upstream_error_field_is_echoed_in_generic_reply() {
        let server = MockServer::start().await;
        mount_search(&server, json!({ "error": "quota exceeded" })).await;

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &test_api(&server), "despacito")
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(messenger.failure_reactions(), 1);
        assert_matches!(sent.last().unwrap(), Sent::Reply(text) if text.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn download_timeout_reports_timeout_once() {
        let server = MockServer::start().await;
        mount_search(&server, found_song(&server, true)).await;
        Mock::given(method("GET"))
            .and(path("/files/song.mp3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 64])
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let api = SongApi {
            base_url: server.uri(),
            download_timeout: Duration::from_millis(50),
            ..Default::default()
        };

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &api, "despacito")
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(messenger.failure_reactions(), 1);
        assert!(!sent.iter().any(|s| matches!(s, Sent::Audio(_))));
        assert_matches!(sent.last().unwrap(), Sent::Reply(text) if text.contains("Request timed out"));
    }

    #[tokio::test]
    async fn oversized_download_aborts_before_delivery() {
        let server = MockServer::start().await;
        mount_search(&server, found_song(&server, true)).await;
        Mock::given(method("GET"))
            .and(path("/files/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let api = SongApi {
            base_url: server.uri(),
            max_download_bytes: 16,
            ..Default::default()
        };

        let messenger = RecordingMessenger::default();
        handle_song_request(&messenger, &api, "despacito")
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(messenger.failure_reactions(), 1);
        assert!(!sent.iter().any(|s| matches!(s, Sent::Audio(_))));
        assert_matches!(sent.last().unwrap(), Sent::Reply(text) if text.contains("💭 Error:"));
    }
}
