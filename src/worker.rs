//! The fulfillment worker: drains the request queue, resolves one random
//! restaurant per request, and dispatches the recommendation by email.
use crate::config::FailurePolicy;
use crate::db;
use crate::db::Pool;
use crate::mailer::Mailer;
use crate::model::{
    BatchReport, FulfillmentRequest, Notification, Outcome, QueuedRequest, RestaurantRecord,
    DINING_SUGGESTIONS_INTENT,
};
use anyhow::Result;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub batch_size: i64,
    pub visibility_timeout_secs: i64,
    pub max_attempts: i64,
    pub failure_policy: FailurePolicy,
}

/// Claim one batch of pending requests and process them sequentially.
///
/// Per-message failures never abort the batch; they are tallied in the
/// returned report and disposed of according to the failure policy. Only
/// storage errors (pool, queue bookkeeping) propagate.
#[instrument(skip_all)]
pub async fn process_batch(
    pool: &Pool,
    mailer: &dyn Mailer,
    opts: &WorkerOptions,
) -> Result<BatchReport> {
    let messages = db::receive_batch(pool, opts.batch_size, opts.visibility_timeout_secs).await?;
    let mut report = BatchReport::default();

    for msg in messages {
        let outcome = process_one(pool, mailer, &msg).await?;
        report.record(outcome);

        if !outcome.is_failure() || opts.failure_policy == FailurePolicy::Acknowledge {
            db::ack_request(pool, msg.id).await?;
            continue;
        }

        if msg.attempt >= opts.max_attempts {
            warn!(
                request_id = %msg.request_id,
                outcome = outcome.as_str(),
                attempt = msg.attempt,
                "attempt budget spent; dead-lettering request"
            );
            db::dead_letter_request(pool, msg.id, outcome.as_str()).await?;
            report.dead_lettered += 1;
        }
        // Otherwise leave the message claimed; it becomes visible again
        // once the visibility timeout lapses.
    }

    Ok(report)
}

#[instrument(skip_all, fields(request_id = %msg.request_id))]
async fn process_one(pool: &Pool, mailer: &dyn Mailer, msg: &QueuedRequest) -> Result<Outcome> {
    let request: FulfillmentRequest = match serde_json::from_str(&msg.body) {
        Ok(request) => request,
        Err(err) => {
            warn!(?err, "malformed request body");
            return Ok(Outcome::MalformedRequest);
        }
    };

    if request.intent_name != DINING_SUGGESTIONS_INTENT {
        info!(intent = %request.intent_name, "intent not supported");
        return Ok(Outcome::UnsupportedIntent);
    }

    let (Some(cuisine), Some(email)) = (request.slot("cuisine"), request.slot("email")) else {
        warn!("request is missing the cuisine or email slot");
        return Ok(Outcome::MissingSlot);
    };

    let Some(business_id) = db::random_business_for_cuisine(pool, cuisine).await? else {
        info!(cuisine, "no restaurant found");
        return Ok(Outcome::NoMatchFound);
    };

    // The index may reference a record the catalog does not have yet.
    let Some(restaurant) = db::get_restaurant(pool, &business_id).await? else {
        info!(cuisine, %business_id, "indexed restaurant missing from catalog");
        return Ok(Outcome::NoMatchFound);
    };

    let notification = build_notification(email, cuisine, &restaurant);

    // At-most-once dispatch: claim the request id before sending, so a
    // redelivered message cannot produce a second email.
    if !db::try_mark_processed(pool, &msg.request_id).await? {
        info!("request already fulfilled; skipping dispatch");
        return Ok(Outcome::Duplicate);
    }

    match mailer
        .send(
            &notification.recipient,
            &notification.subject,
            &notification.body,
        )
        .await
    {
        Ok(message_id) => {
            info!(
                %message_id,
                restaurant = %restaurant.name,
                recipient = %notification.recipient,
                "recommendation sent"
            );
            Ok(Outcome::Sent)
        }
        Err(err) => {
            warn!(?err, "failed to dispatch recommendation");
            db::clear_processed(pool, &msg.request_id).await?;
            Ok(Outcome::DispatchFailure)
        }
    }
}

/// Deterministic subject/body templates for a resolved recommendation.
pub fn build_notification(
    recipient: &str,
    cuisine: &str,
    restaurant: &RestaurantRecord,
) -> Notification {
    Notification {
        recipient: recipient.to_string(),
        subject: format!("Your {} Restaurant Recommendation!", capitalize(cuisine)),
        body: format!(
            "Here is your recommended restaurant:\n\n\
             Name: {}\n\
             Address: {}\n\
             Rating: {}\n\
             Number of Reviews: {}\n",
            restaurant.name, restaurant.address, restaurant.rating, restaurant.number_of_reviews
        ),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
