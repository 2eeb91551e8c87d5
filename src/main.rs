use std::sync::Arc;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    model::{channel::Message, event::ResumedEvent, gateway::Ready, prelude::VoiceState},
    prelude::{GatewayIntents, TypeMapKey},
};
use songbird::{SerenityInit, Songbird};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::chat::HttpAnnouncer;
use crate::config::Config;
use crate::error::StartupError;
use crate::jukebox::Jukebox;
use crate::media::YtDlpResolver;
use crate::voice::SongbirdGateway;

mod chat;
mod commands;
mod config;
mod error;
mod jukebox;
mod media;
mod models;
mod registry;
mod voice;

const DEFAULT_LOG_FILTER: &str = "queue_bot=info,serenity=warn,songbird=warn";

struct Handler {
    prefix: String,
}

pub struct JukeboxKey;

impl TypeMapKey for JukeboxKey {
    type Value = Arc<Jukebox>;
}

async fn get_jukebox(ctx: &Context) -> Option<Arc<Jukebox>> {
    let data = ctx.data.read().await;
    data.get::<JukeboxKey>().cloned()
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        match get_jukebox(&ctx).await {
            Some(jukebox) => commands::dispatch(&ctx, &msg, &self.prefix, &jukebox).await,
            None => info!("Message received before the jukebox was ready"),
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }

    async fn resume(&self, _: Context, _: ResumedEvent) {
        info!("Gateway session resumed");
    }

    async fn voice_state_update(&self, ctx: Context, _: Option<VoiceState>, new: VoiceState) {
        if new.channel_id.is_some() || new.user_id != ctx.cache.current_user_id() {
            return;
        }

        if let (Some(guild_id), Some(jukebox)) = (new.guild_id, get_jukebox(&ctx).await) {
            info!("Bot left voice in guild {}", guild_id.0);
            jukebox.disconnected(guild_id).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::load()?;
    info!("Loaded {config:?}");

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();

    let mut client = Client::builder(&config.token, intents)
        .event_handler(Handler {
            prefix: config.prefix.clone(),
        })
        .register_songbird_with(songbird.clone())
        .await?;

    let (jukebox, events) = Jukebox::new(
        Arc::new(YtDlpResolver::default()),
        Arc::new(SongbirdGateway::new(songbird)),
        Arc::new(HttpAnnouncer::new(client.cache_and_http.http.clone())),
        config.prefix.clone(),
        config.volume,
    );
    let jukebox = Arc::new(jukebox);

    {
        let mut data = client.data.write().await;
        data.insert::<JukeboxKey>(jukebox.clone());
    }

    tokio::spawn(jukebox.run(events));

    let shard_manager = client.shard_manager.clone();

    tokio::spawn(async move {
        let _ = client.start().await.map_err(|why| error!("Client ended: {why:?}"));
    });

    if let Err(why) = tokio::signal::ctrl_c().await {
        error!("Control-C interruption failed: {why:?}");
    }

    info!("Received Ctrl-C, shutting down.");
    shard_manager.lock().await.shutdown_all().await;

    Ok(())
}
