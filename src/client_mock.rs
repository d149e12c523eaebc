//! Test doubles for the Graph API
//!
//! `MockGraph` is a mockall mock for expectation-style tests.
//! `FakeGraphClient` is a stateful in-memory Graph backend used by the
//! workflow tests: it records sent messages and created events so tests
//! can assert on side effects across a whole negotiation lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::client::{
    DateTimeTimeZone, EmailAddress, GraphApi, GraphUser, MeetingTimeSlot, MeetingTimeSuggestion,
    SuggestionAttendee, SuggestionAvailability,
};
use crate::error::GraphError;

mock! {
    pub Graph {}

    #[async_trait]
    impl GraphApi for Graph {
        async fn get_user(&self) -> Result<GraphUser, GraphError>;

        async fn find_user(&self, email: &str) -> Result<GraphUser, GraphError>;

        async fn find_meeting_times(
            &self,
            attendee_emails: &[String],
            window_start: DateTime<Utc>,
            window_end: DateTime<Utc>,
            duration_minutes: i64,
            time_zone: &str,
        ) -> Result<Vec<MeetingTimeSuggestion>, GraphError>;

        async fn resolve_channel(&self, user_id: &str) -> Result<Option<String>, GraphError>;

        async fn send_message(&self, chat_id: &str, payload: &Value) -> Result<String, GraphError>;

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
}

#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
}

pub struct FakeGraphClient {
    host: GraphUser,
    users: HashMap<String, GraphUser>,
    channels: HashMap<String, String>,
    suggestions: Vec<MeetingTimeSuggestion>,
    fail_chats: HashSet<String>,
    pub sent_messages: Mutex<Vec<(String, Value)>>,
    pub created_events: Mutex<Vec<CreatedEvent>>,
}

impl FakeGraphClient {
    pub fn new(host_email: &str) -> Self {
        Self {
            host: GraphUser {
                id: "host-id".to_string(),
                display_name: "Host".to_string(),
                mail: Some(host_email.to_string()),
                user_principal_name: None,
            },
            users: HashMap::new(),
            channels: HashMap::new(),
            suggestions: Vec::new(),
            fail_chats: HashSet::new(),
            sent_messages: Mutex::new(Vec::new()),
            created_events: Mutex::new(Vec::new()),
        }
    }

    /// Register an attendee with a resolvable one-on-one chat
    pub fn with_attendee(mut self, email: &str, user_id: &str) -> Self {
        self.users.insert(
            email.to_string(),
            GraphUser {
                id: user_id.to_string(),
                display_name: email.to_string(),
                mail: Some(email.to_string()),
                user_principal_name: None,
            },
        );
        self.channels
            .insert(user_id.to_string(), format!("chat-{}", user_id));
        self
    }

    /// Register an attendee whose chat resolution returns nothing
    pub fn with_attendee_no_chat(mut self, email: &str, user_id: &str) -> Self {
        self.users.insert(
            email.to_string(),
            GraphUser {
                id: user_id.to_string(),
                display_name: email.to_string(),
                mail: Some(email.to_string()),
                user_principal_name: None,
            },
        );
        self
    }

    /// Seed `count` hourly suggestions starting at a fixed base time
    pub fn with_suggestions(mut self, count: usize) -> Self {
        let base = DateTime::parse_from_rfc3339("2030-01-15T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        self.suggestions = (0..count)
            .map(|i| {
                let start = base + Duration::hours(i as i64);
                let end = start + Duration::minutes(30);
                MeetingTimeSuggestion {
                    confidence: 100.0 - i as f64,
                    attendee_availability: self
                        .users
                        .keys()
                        .map(|email| SuggestionAvailability {
                            attendee: SuggestionAttendee {
                                email_address: EmailAddress {
                                    address: email.clone(),
                                },
                            },
                            availability: "free".to_string(),
                        })
                        .collect(),
                    meeting_time_slot: MeetingTimeSlot {
                        start: DateTimeTimeZone {
                            date_time: start.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
                            time_zone: "UTC".to_string(),
                        },
                        end: DateTimeTimeZone {
                            date_time: end.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
                            time_zone: "UTC".to_string(),
                        },
                    },
                }
            })
            .collect();
        self
    }

    /// Make message delivery to the given chat fail
    pub fn set_fail_chat(mut self, chat_id: &str) -> Self {
        self.fail_chats.insert(chat_id.to_string());
        self
    }

    pub fn sent_count(&self) -> usize {
        self.sent_messages.lock().unwrap().len()
    }

    pub fn event_count(&self) -> usize {
        self.created_events.lock().unwrap().len()
    }
}

#[async_trait]
impl GraphApi for FakeGraphClient {
    async fn get_user(&self) -> Result<GraphUser, GraphError> {
        Ok(self.host.clone())
    }

    async fn find_user(&self, email: &str) -> Result<GraphUser, GraphError> {
        self.users.get(email).cloned().ok_or(GraphError::Api {
            status: 404,
            message: format!("user {} not found", email),
        })
    }

    async fn find_meeting_times(
        &self,
        _attendee_emails: &[String],
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
        _duration_minutes: i64,
        _time_zone: &str,
    ) -> Result<Vec<MeetingTimeSuggestion>, GraphError> {
        Ok(self.suggestions.clone())
    }

    async fn resolve_channel(&self, user_id: &str) -> Result<Option<String>, GraphError> {
        Ok(self.channels.get(user_id).cloned())
    }

    async fn send_message(&self, chat_id: &str, payload: &Value) -> Result<String, GraphError> {
        if self.fail_chats.contains(chat_id) {
            return Err(GraphError::Api {
                status: 500,
                message: "delivery failed".to_string(),
            });
        }

        let mut sent = self.sent_messages.lock().unwrap();
        sent.push((chat_id.to_string(), payload.clone()));
        Ok(format!("msg-{}", sent.len()))
    }

    async fn create_event(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: &[String],
        _body: &str,
        _time_zone: &str,
    ) -> Result<(), GraphError> {
        self.created_events.lock().unwrap().push(CreatedEvent {
            subject: subject.to_string(),
            start,
            end,
            attendees: attendees.to_vec(),
        });
        Ok(())
    }
}
