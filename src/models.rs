use std::collections::VecDeque;
use std::fmt;

use serenity::model::id::ChannelId;

use crate::voice::Dispatcher;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Song {
    pub title: String,
    pub url: String,
}

impl Song {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Identifies one opened audio stream. Every stream the playback driver
/// starts gets a fresh id, so end events can be matched to the stream that
/// is still current for the guild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Voice join requested, connection not established yet.
    Joining,
    Playing,
    /// Queue was cleared by a stop; the session tears down once the current stream ends.
    Draining,
}

pub struct ActiveStream {
    pub id: StreamId,
    pub dispatcher: Option<Box<dyn Dispatcher>>,
}

pub struct VoiceConnection {
    pub channel_id: ChannelId,
}

pub struct GuildQueue {
    pub text_channel: ChannelId,
    pub voice_channel: ChannelId,
    pub connection: Option<VoiceConnection>,
    /// Front is the song currently playing, or the next one to play.
    pub songs: VecDeque<Song>,
    pub volume: u8,
    pub state: SessionState,
    pub stream: Option<ActiveStream>,
}

impl GuildQueue {
    pub fn new(text_channel: ChannelId, voice_channel: ChannelId, volume: u8) -> Self {
        Self {
            text_channel,
            voice_channel,
            connection: None,
            songs: VecDeque::new(),
            volume,
            state: SessionState::Joining,
            stream: None,
        }
    }

    pub fn current_stream(&self) -> Option<StreamId> {
        self.stream.as_ref().map(|stream| stream.id)
    }

    /// Ends the attached stream, if any. Returns whether there was one to end.
    /// The stream stays current until its end event arrives, but it cannot be
    /// ended a second time.
    pub fn end_stream(&mut self) -> bool {
        match self.stream.as_mut().and_then(|stream| stream.dispatcher.take()) {
            Some(dispatcher) => {
                dispatcher.end();
                true
            }
            None => false,
        }
    }

    /// Gain applied to the stream for the configured volume, on a logarithmic
    /// curve where the default volume of 5 maps to unity gain.
    pub fn gain(&self) -> f32 {
        logarithmic_gain(self.volume)
    }
}

pub fn logarithmic_gain(volume: u8) -> f32 {
    (f32::from(volume) / 5.0).powf(1.660964)
}
