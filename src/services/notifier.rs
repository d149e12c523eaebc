use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::GraphApi;
use crate::models::negotiation::{CandidateSlot, MeetingNegotiation};

/// Outcome of one proposal card delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub email: String,
    pub message_id: Option<String>,
    pub delivered: bool,
    /// True when the attendee has no resolved chat to deliver to
    pub skipped: bool,
}

/// Sends proposal cards to attendees over their one-on-one chats
///
/// Delivery is best-effort per attendee: an attendee without a chat, or a
/// send that fails, never blocks the other deliveries. The negotiation
/// keeps waiting either way; undelivered attendees simply stay pending.
pub struct NotificationDispatcher {
    webhook_base_url: String,
}

impl NotificationDispatcher {
    pub fn new(webhook_base_url: String) -> Self {
        Self {
            webhook_base_url: webhook_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn response_url(&self, tenant_id: &str, negotiation_id: &str, response: &str) -> String {
        format!(
            "{}/webhook/response?tenantId={}&uuid={}&response={}",
            self.webhook_base_url, tenant_id, negotiation_id, response
        )
    }

    /// Build the adaptive card proposing one slot to one attendee
    pub fn build_card_payload(
        &self,
        negotiation: &MeetingNegotiation,
        slot: &CandidateSlot,
        tenant_id: &str,
    ) -> Value {
        let negotiation_id = negotiation.id.to_string();

        let card = json!({
            "type": "AdaptiveCard",
            "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
            "version": "1.4",
            "body": [
                {
                    "type": "TextBlock",
                    "size": "Medium",
                    "weight": "Bolder",
                    "text": format!("Meeting proposal: {}", negotiation.title)
                },
                {
                    "type": "TextBlock",
                    "text": format!("Organized by {}", negotiation.host_email),
                    "isSubtle": true,
                    "wrap": true
                },
                {
                    "type": "TextBlock",
                    "text": format!(
                        "Proposed time: {} - {} UTC",
                        slot.start.format("%Y-%m-%d %H:%M"),
                        slot.end.format("%H:%M")
                    ),
                    "wrap": true
                },
                {
                    "type": "TextBlock",
                    "text": negotiation.description,
                    "wrap": true
                }
            ],
            "actions": [
                {
                    "type": "Action.OpenUrl",
                    "title": "Accept",
                    "url": self.response_url(tenant_id, &negotiation_id, "accepted")
                },
                {
                    "type": "Action.OpenUrl",
                    "title": "Tentative",
                    "url": self.response_url(tenant_id, &negotiation_id, "tentative")
                },
                {
                    "type": "Action.OpenUrl",
                    "title": "Decline",
                    "url": self.response_url(tenant_id, &negotiation_id, "declined")
                }
            ]
        });

        // Chat message wrapping the card as an attachment
        json!({
            "body": {
                "contentType": "html",
                "content": "<attachment id=\"1\"></attachment>"
            },
            "attachments": [
                {
                    "id": "1",
                    "contentType": "application/vnd.microsoft.card.adaptive",
                    "content": card.to_string()
                }
            ]
        })
    }

    /// Send the current proposal to every attendee of a negotiation
    pub async fn dispatch(
        &self,
        graph: &dyn GraphApi,
        negotiation: &MeetingNegotiation,
        slot: &CandidateSlot,
    ) -> Vec<DeliveryResult> {
        let mut results = Vec::with_capacity(negotiation.responses.len());

        for (email, record) in &negotiation.responses {
            let chat_id = match &record.chat_id {
                Some(chat_id) => chat_id,
                None => {
                    warn!(
                        "No chat resolved for {}, skipping proposal delivery",
                        email
                    );
                    results.push(DeliveryResult {
                        email: email.clone(),
                        message_id: None,
                        delivered: false,
                        skipped: true,
                    });
                    continue;
                }
            };

            let payload = self.build_card_payload(negotiation, slot, &record.tenant_id);

            match graph.send_message(chat_id, &payload).await {
                Ok(message_id) => {
                    info!(
                        "Delivered proposal for negotiation {} to {}",
                        negotiation.id, email
                    );
                    results.push(DeliveryResult {
                        email: email.clone(),
                        message_id: Some(message_id),
                        delivered: true,
                        skipped: false,
                    });
                }
                Err(e) => {
                    warn!("Failed to deliver proposal to {}: {}", email, e);
                    results.push(DeliveryResult {
                        email: email.clone(),
                        message_id: None,
                        delivered: false,
                        skipped: false,
                    });
                }
            }
        }

        results
    }
}
