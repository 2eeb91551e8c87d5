use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Config file {path} is malformed: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("Expected a bot token (DISCORD_TOKEN or \"token\" in the config file)")]
    MissingToken,
    #[error("Expected a command prefix (COMMAND_PREFIX or \"prefix\" in the config file)")]
    MissingPrefix,
    #[error("Volume must be between 0 and 10, got {0}")]
    InvalidVolume(String),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("yt-dlp could not be started: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("yt-dlp failed: {0}")]
    Failed(String),
    #[error("yt-dlp returned unreadable metadata: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no playable URL in the metadata")]
    MissingUrl,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("join failed: {0}")]
    Join(#[from] songbird::error::JoinError),
    #[error("not connected to a voice channel in this guild")]
    NotConnected,
    #[error("could not open the audio stream: {0}")]
    Source(#[from] songbird::input::error::Error),
    #[error("could not control the track: {0}")]
    Track(#[from] songbird::error::TrackError),
}

/// User-facing failures. The display text is the message reported back to the
/// channel the command came from.
#[derive(Debug, Error)]
pub enum JukeboxError {
    #[error("You need to be in a voice channel to {0}!")]
    NotInVoiceChannel(&'static str),
    #[error("I need the permissions to connect and speak in your voice channel!")]
    MissingPermissions,
    #[error("Tell me what to play: `{0}play <url>`")]
    MissingQuery(String),
    #[error("Could not load a song for {query}")]
    Lookup { query: String, source: MediaError },
    #[error("Something went wrong while connecting to your voice channel ({0})")]
    JoinFailed(VoiceError),
    #[error("There is no song that I could skip!")]
    NothingToSkip,
    #[error("There is nothing playing that I could stop!")]
    NothingToStop,
    #[error("I'm stopping the music right now, request your song again in a moment!")]
    Stopping,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Err creating client: {0}")]
    Client(#[from] serenity::Error),
}
