//! Slack Web API and Socket Mode client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use slack_morphism::prelude::{
    SlackApiChatGetPermalinkRequest, SlackApiChatPostMessageRequest, SlackApiToken,
    SlackApiTokenType, SlackApiTokenValue, SlackChannelId, SlackClient,
    SlackClientEventsListenerEnvironment, SlackClientHyperHttpsConnector, SlackClientSession,
    SlackClientSocketModeConfig, SlackClientSocketModeListener, SlackMessageContent,
    SlackSocketModeListenerCallbacks, SlackTs,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{events, ChatPoster, OutgoingMessage};
use crate::relay::producer::MentionProducer;
use crate::{config::SlackConfig, AppError, Result};

fn token(value: &str, token_type: SlackApiTokenType) -> SlackApiToken {
    SlackApiToken::new(SlackApiTokenValue(value.to_owned())).with_token_type(token_type)
}

fn into_request(message: OutgoingMessage) -> SlackApiChatPostMessageRequest {
    SlackApiChatPostMessageRequest::new(
        SlackChannelId(message.channel),
        SlackMessageContent::new().with_text(message.text),
    )
    .with_link_names(true)
    .opt_thread_ts(message.thread_ts.map(SlackTs))
}

/// Slack client bound to the bot token.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    app_token: SlackApiToken,
}

impl SlackService {
    /// Create the HTTPS client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        Ok(Self {
            client: Arc::new(SlackClient::new(connector)),
            bot_token: token(&config.bot_token, SlackApiTokenType::Bot),
            app_token: token(&config.app_token, SlackApiTokenType::App),
        })
    }

    /// Open an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Start the Socket Mode listener, routing `app_mention` events to
    /// `producer`. The listener stops when `cancel` fires.
    #[must_use]
    pub fn spawn_socket_mode(
        &self,
        producer: Arc<MentionProducer>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(producer),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_push_events(events::handle_push_event);
        let config = SlackClientSocketModeConfig::new();

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        let app_token = self.app_token.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }
            info!("socket mode listener connected");

            tokio::select! {
                code = listener.serve() => {
                    info!(code, "socket mode listener stopped");
                }
                () = cancel.cancelled() => {
                    listener.shutdown().await;
                }
            }
            info!("socket mode listener exited");
        })
    }
}

impl ChatPoster for SlackService {
    fn post_message(
        &self,
        message: OutgoingMessage,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let request = into_request(message);
            let response = self
                .http_session()
                .chat_post_message(&request)
                .await
                .map_err(|err| AppError::Slack(format!("failed to post message: {err}")))?;
            Ok(response.ts.0)
        })
    }

    fn permalink(
        &self,
        channel: &str,
        ts: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        let request = SlackApiChatGetPermalinkRequest::new(
            SlackChannelId(channel.to_owned()),
            SlackTs(ts.to_owned()),
        );
        Box::pin(async move {
            let response = self
                .http_session()
                .chat_get_permalink(&request)
                .await
                .map_err(|err| AppError::Slack(format!("failed to get permalink: {err}")))?;
            Ok(Some(response.permalink.to_string()))
        })
    }
}
