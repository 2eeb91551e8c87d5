use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serenity::model::id::{ChannelId, GuildId};
use serenity::model::permissions::Permissions;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chat::Announcer;
use crate::error::JukeboxError;
use crate::media::MediaResolver;
use crate::models::{ActiveStream, GuildQueue, SessionState, Song, StreamId, VoiceConnection};
use crate::registry::QueueRegistry;
use crate::voice::{Dispatcher, StreamEvent, StreamOutcome, StreamSignal, VoiceGateway};

/// Where a command came from, as seen by the queue.
#[derive(Clone, Copy, Debug)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    /// The voice channel the author currently sits in.
    pub voice_channel: Option<VoiceChannel>,
}

#[derive(Clone, Copy, Debug)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub bot_permissions: Permissions,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Started,
    Queued { song: Song, position: usize },
    /// The session was stopped before the voice join completed.
    Cancelled,
    Skipped,
    Stopped,
}

enum Step {
    Play(Song, StreamId, f32),
    TearDown,
    Gone,
}

/// Owns every guild's queue and drives playback through the voice gateway.
pub struct Jukebox {
    registry: Mutex<QueueRegistry>,
    media: Arc<dyn MediaResolver>,
    voice: Arc<dyn VoiceGateway>,
    chat: Arc<dyn Announcer>,
    events: UnboundedSender<StreamEvent>,
    next_stream: AtomicU64,
    prefix: String,
    default_volume: u8,
}

impl Jukebox {
    /// Builds the jukebox along with the receiving end of its stream events,
    /// which must be handed to [`Jukebox::run`].
    pub fn new(
        media: Arc<dyn MediaResolver>,
        voice: Arc<dyn VoiceGateway>,
        chat: Arc<dyn Announcer>,
        prefix: String,
        default_volume: u8,
    ) -> (Self, UnboundedReceiver<StreamEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let jukebox = Self {
            registry: Mutex::new(QueueRegistry::new()),
            media,
            voice,
            chat,
            events,
            next_stream: AtomicU64::new(1),
            prefix,
            default_volume,
        };

        (jukebox, receiver)
    }

    /// Consumes stream events, each on its own task.
    pub async fn run(self: Arc<Self>, mut events: UnboundedReceiver<StreamEvent>) {
        while let Some(event) = events.recv().await {
            let jukebox = self.clone();
            tokio::spawn(async move { jukebox.advance(event).await });
        }

        info!("Stream event loop closed");
    }

    pub async fn request(
        &self,
        invocation: &Invocation,
        query: Option<&str>,
    ) -> Result<Outcome, JukeboxError> {
        let voice_channel = invocation
            .voice_channel
            .ok_or(JukeboxError::NotInVoiceChannel("play music"))?;

        if !voice_channel
            .bot_permissions
            .contains(Permissions::CONNECT | Permissions::SPEAK)
        {
            return Err(JukeboxError::MissingPermissions);
        }

        let query = query.ok_or_else(|| JukeboxError::MissingQuery(self.prefix.clone()))?;

        let song = self
            .media
            .resolve(query)
            .await
            .map_err(|source| JukeboxError::Lookup {
                query: query.to_string(),
                source,
            })?;

        let guild_id = invocation.guild_id;

        {
            let mut registry = self.registry.lock().await;

            if let Some(record) = registry.get_mut(guild_id) {
                // A draining session is about to leave; its queue is never played again.
                if record.state == SessionState::Draining {
                    return Err(JukeboxError::Stopping);
                }

                record.songs.push_back(song.clone());
                let position = record.songs.len();

                info!("QUEUE - Added {} to guild {} at position {position}", song.title, guild_id.0);

                return Ok(Outcome::Queued { song, position });
            }

            let mut record = GuildQueue::new(invocation.text_channel, voice_channel.id, self.default_volume);
            record.songs.push_back(song.clone());
            registry.set(guild_id, record);
        }

        if let Err(why) = self.voice.join(guild_id, voice_channel.id).await {
            warn!("Something went wrong while trying to connect to the voice channel: {why}");
            self.registry.lock().await.delete(guild_id);

            // A failed join can leave a half-open call behind in the voice manager.
            if let Err(leave) = self.voice.leave(guild_id).await {
                warn!("Leaving guild {} after a failed join failed: {leave}", guild_id.0);
            }

            return Err(JukeboxError::JoinFailed(why));
        }

        if self.complete_join(guild_id, voice_channel.id).await {
            Ok(Outcome::Started)
        } else {
            Ok(Outcome::Cancelled)
        }
    }

    /// Moves a joining session to playing and starts its front song. Returns
    /// false when the session was stopped or dropped while the join was in flight.
    async fn complete_join(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let state = {
            let mut registry = self.registry.lock().await;

            registry.get_mut(guild_id).map(|record| {
                record.connection = Some(VoiceConnection { channel_id });

                if record.state == SessionState::Joining {
                    record.state = SessionState::Playing;
                }

                record.state
            })
        };

        match state {
            Some(SessionState::Playing) => {
                self.play_front(guild_id).await;
                true
            }
            Some(_) => {
                info!("JOIN - Guild {} was stopped while joining", guild_id.0);
                self.teardown(guild_id).await;
                false
            }
            None => {
                warn!("JOIN - Queue for guild {} vanished while joining", guild_id.0);

                if let Err(why) = self.voice.leave(guild_id).await {
                    warn!("Leaving guild {} failed: {why}", guild_id.0);
                }

                false
            }
        }
    }

    pub async fn skip(&self, invocation: &Invocation) -> Result<Outcome, JukeboxError> {
        if invocation.voice_channel.is_none() {
            return Err(JukeboxError::NotInVoiceChannel("skip the music"));
        }

        let mut registry = self.registry.lock().await;
        let record = registry
            .get_mut(invocation.guild_id)
            .ok_or(JukeboxError::NothingToSkip)?;

        // The stream's end signal advances the queue, same as a natural end.
        if !record.end_stream() {
            return Err(JukeboxError::NothingToSkip);
        }

        info!("SKIP - Ending current stream in guild {}", invocation.guild_id.0);

        Ok(Outcome::Skipped)
    }

    pub async fn stop(&self, invocation: &Invocation) -> Result<Outcome, JukeboxError> {
        if invocation.voice_channel.is_none() {
            return Err(JukeboxError::NotInVoiceChannel("stop the music"));
        }

        let mut registry = self.registry.lock().await;
        let record = registry
            .get_mut(invocation.guild_id)
            .ok_or(JukeboxError::NothingToStop)?;

        record.songs.clear();
        record.state = SessionState::Draining;
        record.end_stream();

        info!("STOP - Cleared queue of guild {}", invocation.guild_id.0);

        Ok(Outcome::Stopped)
    }

    /// Called when the bot was removed from voice by someone else.
    pub async fn disconnected(&self, guild_id: GuildId) {
        let removed = {
            let mut registry = self.registry.lock().await;

            // A session still joining has not seen its own voice state yet.
            let connected = registry
                .get(guild_id)
                .map_or(false, |record| record.connection.is_some());

            if connected {
                registry.delete(guild_id)
            } else {
                None
            }
        };

        if let Some(mut record) = removed {
            info!("Bot was disconnected from voice in guild {}, dropping its queue", guild_id.0);
            record.end_stream();

            if let Err(why) = self.voice.leave(guild_id).await {
                warn!("Leaving guild {} failed: {why}", guild_id.0);
            }
        }
    }

    /// Handles the end of a stream: drops the finished song and plays the new
    /// front of the queue, or leaves voice when nothing is left.
    pub async fn advance(&self, event: StreamEvent) {
        if self.finish_stream(&event).await {
            self.play_front(event.guild_id).await;
        }
    }

    async fn finish_stream(&self, event: &StreamEvent) -> bool {
        let mut registry = self.registry.lock().await;

        let record = match registry.get_mut(event.guild_id) {
            Some(record) if record.current_stream() == Some(event.stream) => record,
            _ => {
                debug!("ADVANCE - Ignoring stale event for stream {} in guild {}", event.stream, event.guild_id.0);
                return false;
            }
        };

        record.stream = None;

        if let StreamOutcome::Failed(reason) = &event.outcome {
            error!("Something has gone wrong while streaming in guild {}: {reason}", event.guild_id.0);
        }

        // A stop already discarded the song that belonged to this stream.
        if record.state == SessionState::Draining {
            debug!("ADVANCE - Queue was already cleared");
            return true;
        }

        if let Some(song) = record.songs.pop_front() {
            debug!("ADVANCE - Finished {} - {}", song.title, song.url);
        }

        true
    }

    async fn play_front(&self, guild_id: GuildId) {
        loop {
            let (song, stream, gain) = match self.next_step(guild_id).await {
                Step::Play(song, stream, gain) => (song, stream, gain),
                Step::TearDown => {
                    self.teardown(guild_id).await;
                    return;
                }
                Step::Gone => return,
            };

            info!("PLAY - Next song is {} - {}", song.title, song.url);

            let signal = StreamSignal::new(guild_id, stream, self.events.clone());

            match self.voice.stream(guild_id, &song, gain, signal).await {
                Ok(dispatcher) => {
                    self.attach(guild_id, stream, dispatcher, &song).await;
                    return;
                }
                Err(why) => {
                    let event = StreamEvent {
                        guild_id,
                        stream,
                        outcome: StreamOutcome::Failed(why.to_string()),
                    };

                    if !self.finish_stream(&event).await {
                        return;
                    }
                }
            }
        }
    }

    async fn next_step(&self, guild_id: GuildId) -> Step {
        let mut registry = self.registry.lock().await;

        let record = match registry.get_mut(guild_id) {
            Some(record) => record,
            None => return Step::Gone,
        };

        if record.state == SessionState::Draining {
            return Step::TearDown;
        }

        match record.songs.front().cloned() {
            Some(song) => {
                let stream = StreamId(self.next_stream.fetch_add(1, Ordering::Relaxed));
                record.stream = Some(ActiveStream {
                    id: stream,
                    dispatcher: None,
                });

                Step::Play(song, stream, record.gain())
            }
            None => Step::TearDown,
        }
    }

    async fn attach(&self, guild_id: GuildId, stream: StreamId, dispatcher: Box<dyn Dispatcher>, song: &Song) {
        let text_channel = {
            let mut registry = self.registry.lock().await;

            match registry.get_mut(guild_id) {
                Some(record) if record.current_stream() == Some(stream) => {
                    record.stream = Some(ActiveStream {
                        id: stream,
                        dispatcher: Some(dispatcher),
                    });

                    if record.state == SessionState::Draining {
                        record.end_stream();
                        None
                    } else {
                        Some(record.text_channel)
                    }
                }
                _ => {
                    debug!("PLAY - Stream {stream} opened for a finished session, ending it");
                    dispatcher.end();
                    None
                }
            }
        };

        if let Some(channel_id) = text_channel {
            self.chat
                .say(channel_id, &format!("Playing song [{}]({})", song.title, song.url))
                .await;
        }
    }

    async fn teardown(&self, guild_id: GuildId) {
        let removed = self.registry.lock().await.delete(guild_id);

        if let Some(mut record) = removed {
            record.end_stream();

            let channel_id = record
                .connection
                .as_ref()
                .map_or(record.voice_channel, |connection| connection.channel_id);
            info!("Queue of guild {} is done, leaving voice channel {}", guild_id.0, channel_id.0);

            if let Err(why) = self.voice.leave(guild_id).await {
                warn!("Leaving guild {} failed: {why}", guild_id.0);
            }
        }
    }
}
