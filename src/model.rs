use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The only intent the fulfillment worker currently handles.
pub const DINING_SUGGESTIONS_INTENT: &str = "DiningSuggestionsIntent";

/// A fulfillment request as carried in the queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    #[serde(rename = "intentName")]
    pub intent_name: String,
    pub slots: HashMap<String, String>,
}

impl FulfillmentRequest {
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }
}

/// A message claimed from the request queue. `attempt` counts deliveries,
/// including the one that produced this value.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub id: i64,
    pub request_id: String,
    pub body: String,
    pub attempt: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantRecord {
    pub business_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub number_of_reviews: i64,
    pub rating: f64,
    pub zip_code: String,
    pub inserted_at: DateTime<Utc>,
}

/// An outbound recommendation email, built just before dispatch and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Per-message result of the fulfillment worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Duplicate,
    UnsupportedIntent,
    NoMatchFound,
    MalformedRequest,
    MissingSlot,
    DispatchFailure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Sent => "sent",
            Outcome::Duplicate => "duplicate",
            Outcome::UnsupportedIntent => "unsupported-intent",
            Outcome::NoMatchFound => "no-match-found",
            Outcome::MalformedRequest => "malformed-request",
            Outcome::MissingSlot => "missing-slot",
            Outcome::DispatchFailure => "dispatch-failure",
        }
    }

    /// Failures are subject to the configured failure policy. Empty results
    /// (no match, unsupported intent) are valid outcomes, not failures.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::MalformedRequest | Outcome::MissingSlot | Outcome::DispatchFailure
        )
    }
}

/// Tally of outcomes for one batch. One bad message never aborts the batch,
/// so failures surface here instead of as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: u32,
    pub duplicates: u32,
    pub unsupported_intents: u32,
    pub no_matches: u32,
    pub malformed: u32,
    pub missing_slots: u32,
    pub dispatch_failures: u32,
    pub dead_lettered: u32,
}

impl BatchReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Sent => self.sent += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::UnsupportedIntent => self.unsupported_intents += 1,
            Outcome::NoMatchFound => self.no_matches += 1,
            Outcome::MalformedRequest => self.malformed += 1,
            Outcome::MissingSlot => self.missing_slots += 1,
            Outcome::DispatchFailure => self.dispatch_failures += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.sent
            + self.duplicates
            + self.unsupported_intents
            + self.no_matches
            + self.malformed
            + self.missing_slots
            + self.dispatch_failures
    }
}
