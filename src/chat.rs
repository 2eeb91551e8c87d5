use std::sync::Arc;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::ChannelId;
use serenity::Result as SerenityResult;
use tracing::info;

/// Sends text to guild channels.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn say(&self, channel_id: ChannelId, text: &str);
}

pub struct HttpAnnouncer {
    http: Arc<Http>,
}

impl HttpAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn say(&self, channel_id: ChannelId, text: &str) {
        check_msg(channel_id.say(&self.http, text).await);
    }
}

/// Checks that a message successfully sent; if not, then logs why.
pub fn check_msg(result: SerenityResult<Message>) {
    if let Err(why) = result {
        info!("Error sending message: {why:?}");
    }
}
