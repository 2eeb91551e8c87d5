use std::collections::HashMap;

use serenity::model::id::GuildId;
use tracing::debug;

use crate::models::GuildQueue;

/// Maps each guild to its queue record. A record is present only while the
/// bot holds, or is acquiring, a voice connection for that guild.
#[derive(Default)]
pub struct QueueRegistry {
    servers: HashMap<GuildId, GuildQueue>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<&GuildQueue> {
        self.servers.get(&guild_id)
    }

    pub fn get_mut(&mut self, guild_id: GuildId) -> Option<&mut GuildQueue> {
        self.servers.get_mut(&guild_id)
    }

    pub fn set(&mut self, guild_id: GuildId, record: GuildQueue) {
        debug!("REGISTRY - Registering queue for guild {}", guild_id.0);
        self.servers.insert(guild_id, record);
    }

    pub fn delete(&mut self, guild_id: GuildId) -> Option<GuildQueue> {
        let removed = self.servers.remove(&guild_id);

        if removed.is_some() {
            debug!("REGISTRY - Removed queue for guild {}", guild_id.0);
        }

        removed
    }
}
