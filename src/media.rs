use serde::Deserialize;
use serenity::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::MediaError;
use crate::models::Song;

const UNKNOWN_TRACK_TITLE: &str = "UNKNOWN TRACK";

/// Looks up a media reference and describes the song behind it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Song, MediaError>;
}

#[derive(Deserialize)]
struct VideoInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
}

impl VideoInfo {
    fn into_song(self) -> Result<Song, MediaError> {
        let url = self
            .webpage_url
            .or(self.original_url)
            .ok_or(MediaError::MissingUrl)?;

        let title = self.title.unwrap_or_else(|| UNKNOWN_TRACK_TITLE.to_string());

        Ok(Song::new(title, url))
    }
}

/// Resolves queries by asking `yt-dlp` for the video's metadata.
pub struct YtDlpResolver {
    program: String,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
        }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Song, MediaError> {
        info!("Resolving {query}");

        let output = Command::new(&self.program)
            .arg("-j")
            .arg("--no-playlist")
            .arg("--skip-download")
            .arg(query)
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MediaError::Failed(error));
        }

        let song = parse_video_info(&output.stdout)?;
        debug!("Resolved {query} to {} - {}", song.title, song.url);

        Ok(song)
    }
}

fn parse_video_info(stdout: &[u8]) -> Result<Song, MediaError> {
    let info: VideoInfo = serde_json::from_slice(stdout)?;
    info.into_song()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reads_title_and_canonical_url() {
        let stdout = br#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","webpage_url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","original_url":"https://youtu.be/dQw4w9WgXcQ","duration":212}"#;

        let song = parse_video_info(stdout).unwrap();

        assert_eq!(
            song,
            Song::new(
                "Never Gonna Give You Up",
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
            )
        );
    }

    #[test]
    fn falls_back_to_original_url_and_unknown_title() {
        let stdout = br#"{"original_url":"https://youtu.be/abc"}"#;

        let song = parse_video_info(stdout).unwrap();

        assert_eq!(song, Song::new(UNKNOWN_TRACK_TITLE, "https://youtu.be/abc"));
    }

    #[test]
    fn rejects_metadata_without_url() {
        let result = parse_video_info(br#"{"title":"nothing"}"#);

        assert!(matches!(result, Err(MediaError::MissingUrl)));
    }

    #[test]
    fn rejects_garbage() {
        let result = parse_video_info(b"ERROR: not json");

        assert!(matches!(result, Err(MediaError::Parse(_))));
    }
}
