use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::driver::Bitrate;
use songbird::tracks::TrackHandle;
use songbird::{ytdl, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::error::VoiceError;
use crate::models::{Song, StreamId};

const STREAM_BITRATE: i32 = 192_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEvent {
    pub guild_id: GuildId,
    pub stream: StreamId,
    pub outcome: StreamOutcome,
}

/// Handed to the gateway with every stream it opens; fired once that stream
/// stops producing audio, whether it ran out or was ended early.
#[derive(Clone, Debug)]
pub struct StreamSignal {
    guild_id: GuildId,
    stream: StreamId,
    events: UnboundedSender<StreamEvent>,
}

impl StreamSignal {
    pub fn new(guild_id: GuildId, stream: StreamId, events: UnboundedSender<StreamEvent>) -> Self {
        Self {
            guild_id,
            stream,
            events,
        }
    }

    pub fn finished(&self) {
        let event = StreamEvent {
            guild_id: self.guild_id,
            stream: self.stream,
            outcome: StreamOutcome::Finished,
        };

        if self.events.send(event).is_err() {
            warn!("Stream {} ended after the event loop shut down", self.stream);
        }
    }
}

/// Controls an in-progress stream.
pub trait Dispatcher: Send + Sync {
    /// Ends the stream early. The stream's signal still fires afterwards.
    fn end(&self);
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn stream(
        &self,
        guild_id: GuildId,
        song: &Song,
        gain: f32,
        signal: StreamSignal,
    ) -> Result<Box<dyn Dispatcher>, VoiceError>;
}

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        let (handler_lock, result) = self.manager.join(guild_id, channel_id).await;
        result?;

        let mut handler = handler_lock.lock().await;

        if handler.is_deaf() {
            info!("Already deafen!")
        } else if let Err(e) = handler.deafen(true).await {
            info!("Deafen failed due to {e:?}")
        }

        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        if self.manager.get(guild_id).is_some() {
            self.manager.remove(guild_id).await?;
            info!("Left voice channel in guild {}", guild_id.0);
        }

        Ok(())
    }

    async fn stream(
        &self,
        guild_id: GuildId,
        song: &Song,
        gain: f32,
        signal: StreamSignal,
    ) -> Result<Box<dyn Dispatcher>, VoiceError> {
        let handler_lock = self.manager.get(guild_id).ok_or(VoiceError::NotConnected)?;

        // yt-dlp picks the best audio-only format available.
        let source = ytdl(&song.url).await?;

        let mut handler = handler_lock.lock().await;
        handler.set_bitrate(Bitrate::BitsPerSecond(STREAM_BITRATE));

        let track_handle = handler.play_source(source);

        let attached = track_handle
            .add_event(Event::Track(TrackEvent::End), StreamEndNotifier { signal })
            .and_then(|_| track_handle.set_volume(gain));

        if let Err(why) = attached {
            let _ = track_handle.stop();
            return Err(why.into());
        }

        Ok(Box::new(TrackDispatcher(track_handle)))
    }
}

struct TrackDispatcher(TrackHandle);

impl Dispatcher for TrackDispatcher {
    fn end(&self) {
        if let Err(why) = self.0.stop() {
            warn!("Could not stop track {}: {why:?}", self.0.uuid());
        }
    }
}

struct StreamEndNotifier {
    signal: StreamSignal,
}

#[async_trait]
impl VoiceEventHandler for StreamEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        info!("End notifier triggered");

        self.signal.finished();

        None
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn signal_reports_its_own_stream() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signal = StreamSignal::new(GuildId(3), StreamId(9), tx);

        signal.finished();

        assert_eq!(
            rx.try_recv().ok(),
            Some(StreamEvent {
                guild_id: GuildId(3),
                stream: StreamId(9),
                outcome: StreamOutcome::Finished,
            })
        );
    }

    #[test]
    fn signal_tolerates_closed_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        StreamSignal::new(GuildId(3), StreamId(1), tx).finished();
    }
}
