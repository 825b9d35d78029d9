use crate::model::{QueuedRequest, RestaurantRecord};
use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs and other schemes untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{}?{}", expanded_path, q),
        None => format!("sqlite://{}", expanded_path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// --- restaurant catalog ---

/// Insert a restaurant record. `business_id` is the immutable primary key;
/// re-inserting an existing id is an error, the fulfillment path never
/// mutates the catalog.
#[instrument(skip_all)]
pub async fn insert_restaurant(pool: &Pool, record: &RestaurantRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO restaurants (business_id, name, address, latitude, longitude, number_of_reviews, rating, zip_code, inserted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.business_id)
    .bind(&record.name)
    .bind(&record.address)
    .bind(record.latitude)
    .bind(record.longitude)
    .bind(record.number_of_reviews)
    .bind(record.rating)
    .bind(&record.zip_code)
    .bind(record.inserted_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_restaurant(pool: &Pool, business_id: &str) -> Result<Option<RestaurantRecord>> {
    let row = sqlx::query(
        "SELECT business_id, name, address, latitude, longitude, number_of_reviews, rating, zip_code, inserted_at \
         FROM restaurants WHERE business_id = ?",
    )
    .bind(business_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| RestaurantRecord {
        business_id: row.get("business_id"),
        name: row.get("name"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        number_of_reviews: row.get("number_of_reviews"),
        rating: row.get("rating"),
        zip_code: row.get("zip_code"),
        inserted_at: row.get("inserted_at"),
    }))
}

// --- cuisine index ---

/// Index one restaurant under a cuisine. Cuisines are stored lowercase so
/// lookups are case-insensitive.
#[instrument(skip_all)]
pub async fn add_cuisine_entry(pool: &Pool, cuisine: &str, business_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO cuisine_index (cuisine, business_id) VALUES (?, ?)")
        .bind(cuisine.to_lowercase())
        .bind(business_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Pick one business id uniformly at random among the cuisine's current
/// matches, or None when the match set is empty.
#[instrument(skip_all)]
pub async fn random_business_for_cuisine(pool: &Pool, cuisine: &str) -> Result<Option<String>> {
    let id = sqlx::query_scalar::<_, String>(
        "SELECT business_id FROM cuisine_index WHERE cuisine = ? ORDER BY RANDOM() LIMIT 1",
    )
    .bind(cuisine.to_lowercase())
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

// --- request queue ---

/// Enqueue a fulfillment request body, visible immediately. Returns the
/// request id assigned to the message.
#[instrument(skip_all)]
pub async fn enqueue_request(pool: &Pool, body: &str) -> Result<String> {
    let request_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO request_queue (request_id, body, attempt, visible_at) \
         VALUES (?, ?, 0, CURRENT_TIMESTAMP)",
    )
    .bind(&request_id)
    .bind(body)
    .execute(pool)
    .await?;
    Ok(request_id)
}

/// Claim up to `limit` currently-visible messages. Each claimed message has
/// its attempt counter bumped and its visibility pushed forward, so an
/// unacknowledged message reappears after the timeout (at-least-once).
#[instrument(skip_all)]
pub async fn receive_batch(
    pool: &Pool,
    limit: i64,
    visibility_secs: i64,
) -> Result<Vec<QueuedRequest>> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query(
        "SELECT id, request_id, body, attempt FROM request_queue \
         WHERE datetime(visible_at) <= CURRENT_TIMESTAMP \
         ORDER BY datetime(visible_at) ASC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    let mut claimed = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let attempt: i64 = row.get("attempt");
        sqlx::query(
            "UPDATE request_queue SET attempt = ?, visible_at = datetime('now', ? || ' seconds') WHERE id = ?",
        )
        .bind(attempt + 1)
        .bind(visibility_secs)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        claimed.push(QueuedRequest {
            id,
            request_id: row.get("request_id"),
            body: row.get("body"),
            attempt: attempt + 1,
        });
    }
    tx.commit().await?;
    Ok(claimed)
}

/// Acknowledge (remove) a message. Acknowledging an already-removed message
/// is a no-op, so duplicate deliveries ack cleanly.
#[instrument(skip_all)]
pub async fn ack_request(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM request_queue WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Move a message to the dead-letter table for manual inspection.
#[instrument(skip_all)]
pub async fn dead_letter_request(pool: &Pool, id: i64, reason: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO dead_letter (request_id, body, attempt, reason) \
         SELECT request_id, body, attempt, ? FROM request_queue WHERE id = ?",
    )
    .bind(reason)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM request_queue WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

// --- processed-request set ---

/// Atomic check-and-insert of a request id into the processed set. Returns
/// true when this call claimed the id, false when it was already present
/// (a duplicate delivery must skip dispatch).
#[instrument(skip_all)]
pub async fn try_mark_processed(pool: &Pool, request_id: &str) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO processed_requests (request_id) VALUES (?)")
        .bind(request_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Release a processed marker after a failed dispatch so a redelivered
/// message is not skipped as a duplicate.
#[instrument(skip_all)]
pub async fn clear_processed(pool: &Pool, request_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM processed_requests WHERE request_id = ?")
        .bind(request_id)
        .execute(pool)
        .await?;
    Ok(())
}
