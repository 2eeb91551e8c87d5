use serenity::client::Context;
use serenity::model::channel::ReactionType::Unicode;
use serenity::model::channel::{Channel, Message};
use serenity::model::guild::Guild;
use serenity::model::id::ChannelId;
use serenity::model::permissions::Permissions;
use tracing::info;

use crate::chat::check_msg;
use crate::jukebox::{Invocation, Jukebox, Outcome, VoiceChannel};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Play(Option<String>),
    Skip,
    Stop,
    Unknown,
}

impl Command {
    /// Reads a command off a message. Returns `None` for anything that does
    /// not start with the prefix.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.strip_prefix(prefix)?;

        let command = if rest.starts_with("play") {
            Command::Play(content.split_whitespace().nth(1).map(str::to_string))
        } else if rest.starts_with("skip") {
            Command::Skip
        } else if rest.starts_with("stop") {
            Command::Stop
        } else {
            Command::Unknown
        };

        Some(command)
    }
}

/// Decides whether a message is a command the bot should act on. Messages
/// from bots, messages outside a guild and unprefixed chatter are ignored.
pub fn route(author_is_bot: bool, in_guild: bool, content: &str, prefix: &str) -> Option<Command> {
    if author_is_bot || !in_guild {
        return None;
    }

    Command::parse(content, prefix)
}

pub fn invalid_command_notice(prefix: &str) -> String {
    format!("You need to enter a valid command: `{prefix}play <url>`, `{prefix}skip` or `{prefix}stop`")
}

pub fn queued_notice(title: &str, position: usize) -> String {
    format!("Added {title} to the queue (position {position})!")
}

pub async fn dispatch(ctx: &Context, msg: &Message, prefix: &str, jukebox: &Jukebox) {
    let guild = msg.guild(&ctx.cache);

    let command = match route(msg.author.bot, guild.is_some(), &msg.content, prefix) {
        Some(command) => command,
        None => return,
    };

    let guild = match guild {
        Some(guild) => guild,
        None => return,
    };

    if command == Command::Unknown {
        check_msg(msg.channel_id.say(&ctx.http, invalid_command_notice(prefix)).await);
        return;
    }

    info!("Command {command:?} from {} in guild {}", msg.author.name, guild.id.0);

    let invocation = invocation_for(ctx, msg, &guild);

    let result = match command {
        Command::Play(query) => jukebox.request(&invocation, query.as_deref()).await,
        Command::Skip => jukebox.skip(&invocation).await,
        Command::Stop => jukebox.stop(&invocation).await,
        Command::Unknown => return,
    };

    match result {
        Ok(Outcome::Queued { song, position }) => {
            check_msg(msg.channel_id.say(&ctx.http, queued_notice(&song.title, position)).await);
        }
        Ok(Outcome::Skipped | Outcome::Stopped) => {
            if let Err(why) = msg.react(&ctx.http, Unicode("👍".to_string())).await {
                info!("Error reacting to message: {why:?}");
            }
        }
        Ok(Outcome::Started | Outcome::Cancelled) => {}
        Err(why) => {
            info!("Command failed in guild {}: {why:?}", guild.id.0);
            check_msg(msg.channel_id.say(&ctx.http, why.to_string()).await);
        }
    }
}

fn invocation_for(ctx: &Context, msg: &Message, guild: &Guild) -> Invocation {
    let voice_channel = guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|voice_state| voice_state.channel_id)
        .map(|id| VoiceChannel {
            id,
            bot_permissions: bot_permissions(ctx, guild, id),
        });

    Invocation {
        guild_id: guild.id,
        text_channel: msg.channel_id,
        voice_channel,
    }
}

fn bot_permissions(ctx: &Context, guild: &Guild, channel_id: ChannelId) -> Permissions {
    guild
        .channels
        .get(&channel_id)
        .cloned()
        .and_then(Channel::guild)
        .and_then(|channel| {
            channel
                .permissions_for_user(&ctx.cache, ctx.cache.current_user_id())
                .ok()
        })
        .unwrap_or_else(Permissions::empty)
}
