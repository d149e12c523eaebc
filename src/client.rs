use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dotenv::dotenv;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use tracing::{debug, info};

use crate::error::GraphError;

/// A user profile as returned by the Graph directory
///
/// The directory `id` doubles as the routing tenant identifier embedded in
/// proposal cards: it is the only stable value a webhook callback can carry
/// to disambiguate which attendee answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl GraphUser {
    /// Preferred email address, falling back to the principal name
    pub fn email(&self) -> &str {
        self.mail
            .as_deref()
            .or(self.user_principal_name.as_deref())
            .unwrap_or_default()
    }
}

// Wire types for the findMeetingTimes response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingTimeSuggestion {
    pub confidence: f64,
    #[serde(default)]
    pub attendee_availability: Vec<SuggestionAvailability>,
    pub meeting_time_slot: MeetingTimeSlot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionAvailability {
    pub attendee: SuggestionAttendee,
    pub availability: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionAttendee {
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingTimeSlot {
    pub start: DateTimeTimeZone,
    pub end: DateTimeTimeZone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Deserialize)]
struct FindMeetingTimesResponse {
    #[serde(rename = "meetingTimeSuggestions", default)]
    meeting_time_suggestions: Vec<MeetingTimeSuggestion>,
}

#[derive(Debug, Deserialize)]
struct ChatPage {
    #[serde(default)]
    value: Vec<Chat>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chat {
    id: String,
    #[serde(default)]
    chat_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatMembersPage {
    #[serde(default)]
    value: Vec<ChatMember>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMember {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// The Graph capability the scheduler depends on
///
/// Kept as a trait so the negotiation engine composes with any Graph-shaped
/// backend: the production `GraphClient` below, or test doubles.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Profile of the signed-in host
    async fn get_user(&self) -> Result<GraphUser, GraphError>;

    /// Directory lookup for an attendee by email
    async fn find_user(&self, email: &str) -> Result<GraphUser, GraphError>;

    /// Query ranked meeting time suggestions for the given attendees
    ///
    /// All times exchanged with Graph are pinned to UTC; `time_zone` carries
    /// the caller's requested zone for logging and display.
    async fn find_meeting_times(
        &self,
        attendee_emails: &[String],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        duration_minutes: i64,
        time_zone: &str,
    ) -> Result<Vec<MeetingTimeSuggestion>, GraphError>;

    /// Find the one-on-one chat with the given user, if any exists
    async fn resolve_channel(&self, user_id: &str) -> Result<Option<String>, GraphError>;

    /// Post a message payload to a chat, returning the message id
    async fn send_message(&self, chat_id: &str, payload: &Value) -> Result<String, GraphError>;

    /// Create the real calendar event once a negotiation completes
    async fn create_event(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: &[String],
        body: &str,
        time_zone: &str,
    ) -> Result<(), GraphError>;
}

/// Client for the Microsoft Graph API
pub struct GraphClient {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl GraphClient {
    /// Create a new Graph client from environment variables
    pub fn new() -> Self {
        dotenv().ok();

        Self {
            client: Client::new(),
            endpoint: env::var("GRAPH_API_ENDPOINT")
                .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0".to_string()),
            access_token: env::var("GRAPH_ACCESS_TOKEN")
                .expect("GRAPH_ACCESS_TOKEN must be set in environment"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response, GraphError> {
        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(res)
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn get_user(&self) -> Result<GraphUser, GraphError> {
        let res = self
            .client
            .get(self.url("/me"))
            .bearer_auth(&self.access_token)
            .query(&[("$select", "id,displayName,mail,userPrincipalName")])
            .send()
            .await?;

        let user = Self::check(res).await?.json::<GraphUser>().await?;
        Ok(user)
    }

    async fn find_user(&self, email: &str) -> Result<GraphUser, GraphError> {
        debug!("Looking up directory profile for {}", email);

        let res = self
            .client
            .get(self.url(&format!("/users/{}", email)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let user = Self::check(res).await?.json::<GraphUser>().await?;
        Ok(user)
    }

    async fn find_meeting_times(
        &self,
        attendee_emails: &[String],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        duration_minutes: i64,
        time_zone: &str,
    ) -> Result<Vec<MeetingTimeSuggestion>, GraphError> {
        let body = json!({
            "attendees": attendee_emails
                .iter()
                .map(|email| json!({
                    "emailAddress": { "address": email },
                    "type": "Required"
                }))
                .collect::<Vec<_>>(),
            "timeConstraint": {
                "timeslots": [{
                    "start": {
                        "dateTime": window_start.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
                        "timeZone": "UTC"
                    },
                    "end": {
                        "dateTime": window_end.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
                        "timeZone": "UTC"
                    }
                }]
            },
            "meetingDuration": format!("PT{}M", duration_minutes),
        });

        info!(
            "Requesting meeting time suggestions for {} attendees",
            attendee_emails.len()
        );
        debug!(
            "findMeetingTimes window: {} - {} ({})",
            window_start, window_end, time_zone
        );

        let res = self
            .client
            .post(self.url("/me/findMeetingTimes"))
            .bearer_auth(&self.access_token)
            // Keep suggestion times in UTC regardless of mailbox settings
            .header("Prefer", "outlook.timezone=\"UTC\"")
            .json(&body)
            .send()
            .await?;

        let parsed = Self::check(res)
            .await?
            .json::<FindMeetingTimesResponse>()
            .await?;

        info!(
            "Received {} meeting time suggestions",
            parsed.meeting_time_suggestions.len()
        );
        Ok(parsed.meeting_time_suggestions)
    }

    async fn resolve_channel(&self, user_id: &str) -> Result<Option<String>, GraphError> {
        // Walk the signed-in user's chats and find the one-on-one chat whose
        // other member is the requested user.
        let mut url = Some(self.url("/me/chats"));

        while let Some(page_url) = url {
            let res = self
                .client
                .get(&page_url)
                .bearer_auth(&self.access_token)
                .send()
                .await?;

            let page = Self::check(res).await?.json::<ChatPage>().await?;

            for chat in &page.value {
                if chat.chat_type != "oneOnOne" {
                    continue;
                }

                let res = self
                    .client
                    .get(self.url(&format!("/chats/{}/members", chat.id)))
                    .bearer_auth(&self.access_token)
                    .send()
                    .await?;

                // A membership lookup failure for one chat is not fatal
                let members = match Self::check(res).await {
                    Ok(res) => res.json::<ChatMembersPage>().await?,
                    Err(_) => continue,
                };

                if members
                    .value
                    .iter()
                    .any(|m| m.user_id.as_deref() == Some(user_id))
                {
                    return Ok(Some(chat.id.clone()));
                }
            }

            url = page.next_link;
        }

        Ok(None)
    }

    async fn send_message(&self, chat_id: &str, payload: &Value) -> Result<String, GraphError> {
        debug!("Posting message to chat {}", chat_id);

        let res = self
            .client
            .post(self.url(&format!("/chats/{}/messages", chat_id)))
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await?;

        let sent = Self::check(res).await?.json::<SentMessage>().await?;
        Ok(sent.id)
    }

    async fn create_event(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: &[String],
        body: &str,
        time_zone: &str,
    ) -> Result<(), GraphError> {
        let event = json!({
            "subject": subject,
            "start": {
                "dateTime": start.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": "UTC"
            },
            "end": {
                "dateTime": end.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": "UTC"
            },
            "attendees": attendees
                .iter()
                .map(|email| json!({
                    "type": "required",
                    "emailAddress": { "address": email }
                }))
                .collect::<Vec<_>>(),
            "body": {
                "contentType": "text",
                "content": body
            },
            "location": { "displayName": "Teams online meeting" },
            "isOnlineMeeting": true,
            "onlineMeetingProvider": "teamsForBusiness",
        });

        info!("Creating calendar event: {} ({})", subject, time_zone);

        let res = self
            .client
            .post(self.url("/me/events"))
            .bearer_auth(&self.access_token)
            .json(&event)
            .send()
            .await?;

        Self::check(res).await?;
        Ok(())
    }
}
