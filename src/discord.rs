use serde::{Deserialize, Serialize};
use snafu::{ensure, Location, ResultExt, Snafu};
use tracing::instrument;
use url::Url;

use crate::error::{ApplicationError, WebhookClientSnafu};

/// Colors for report embeds, straight from the usual chat-client palette.
pub mod color {
    pub const GREEN: u32 = 0x2ECC71;
    pub const ORANGE: u32 = 0xE67E22;
    pub const RED: u32 = 0xE74C3C;
    pub const GOLD: u32 = 0xF1C40F;
    pub const PURPLE: u32 = 0x9B59B6;
    pub const BLUE: u32 = 0x3498DB;
    pub const DARK_GREY: u32 = 0x607D8B;
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub discord_webhook_url: Url,
}

pub fn connect(config: &DiscordConfig) -> Result<Channel, ApplicationError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context(WebhookClientSnafu)?;

    Ok(Channel {
        client,
        webhook: config.discord_webhook_url.clone(),
    })
}

/// The channel the bot reports into, reached through an incoming webhook.
#[derive(Clone)]
pub struct Channel {
    client: reqwest::Client,
    webhook: Url,
}

impl Channel {
    /// Deliver one message. The webhook answers 204 on success.
    #[instrument(skip(self, message))]
    pub async fn post(&self, message: &Message) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(self.webhook.clone())
            .json(message)
            .send()
            .await
            .context(DeliverSnafu)?;

        let status = response.status();
        ensure!(status.is_success(), RejectedSnafu { status });
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(Thumbnail { url: url.into() });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(Footer { text: text.into() });
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Footer {
    pub text: String,
}

#[derive(Debug, Snafu)]
pub enum ChannelError {
    /// could not reach the webhook
    Deliver {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// the webhook refused the message
    #[snafu(display("the webhook refused the message with {status}"))]
    Rejected {
        status: reqwest::StatusCode,
        #[snafu(implicit)]
        location: Location,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> DiscordConfig {
        DiscordConfig {
            discord_webhook_url: Url::parse(base).unwrap(),
        }
    }

    #[test]
    fn message_serializes_without_empty_parts() {
        let message = Message::text("hello");

        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value, serde_json::json!({ "content": "hello" }));
    }

    #[test]
    fn embed_builder_collects_fields() {
        let embed = Embed::titled("Weekly Report")
            .color(color::GOLD)
            .field("Progress", "1/1", true);

        assert_eq!(embed.title.as_deref(), Some("Weekly Report"));
        assert_eq!(embed.fields.len(), 1);
        assert!(embed.fields[0].inline);
    }

    #[tokio::test]
    async fn post_accepts_a_no_content_answer() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(204)
            .create_async()
            .await;

        let channel = connect(&config(&server.url())).unwrap();

        channel.post(&Message::text("ping")).await.unwrap();
    }

    #[tokio::test]
    async fn post_surfaces_a_webhook_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(429)
            .create_async()
            .await;

        let channel = connect(&config(&server.url())).unwrap();
        let error = channel.post(&Message::text("ping")).await.unwrap_err();

        assert!(matches!(error, ChannelError::Rejected { .. }));
    }
}
