//! Socket Mode push event handling.
//!
//! Only `app_mention` events are relayed; every other event type is
//! logged and acknowledged.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackAppMentionEvent, SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackPushEventCallback,
};
use tracing::{debug, warn};

use crate::models::envelope::MentionEvent;
use crate::relay::producer::MentionProducer;

/// Map a Slack `app_mention` payload into the transport-neutral event.
#[must_use]
pub fn mention_from_slack(event: &SlackAppMentionEvent) -> MentionEvent {
    MentionEvent {
        channel: event.channel.to_string(),
        user: event.user.to_string(),
        text: event.content.text.clone().unwrap_or_default(),
        ts: event.origin.ts.to_string(),
        thread_ts: event.origin.thread_ts.as_ref().map(ToString::to_string),
    }
}

/// Handle push events delivered via Socket Mode.
///
/// Errors from the producer are logged, never surfaced to Slack; the
/// producer has already told the user when enqueueing failed.
///
/// # Errors
///
/// Never returns an error; the signature is dictated by the listener.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackEventCallbackBody::AppMention(mention) = &event.event else {
        debug!(event_id = ?event.event_id, "push event ignored");
        return Ok(());
    };

    let producer: Option<Arc<MentionProducer>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<MentionProducer>>().cloned()
    };
    let Some(producer) = producer else {
        warn!("mention producer not registered; dropping app_mention");
        return Ok(());
    };

    if let Err(err) = producer.handle_mention_event(&mention_from_slack(mention)).await {
        warn!(%err, channel = %mention.channel, "app_mention not relayed");
    }
    Ok(())
}
