use std::collections::HashMap;

use dining_concierge::db;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn visibility_timeout_hides_claimed_messages() {
    let pool = setup_pool().await;
    db::enqueue_request(&pool, "{}").await.unwrap();

    let first = db::receive_batch(&pool, 10, 3600).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].attempt, 1);

    // claimed message is invisible until the timeout lapses
    let second = db::receive_batch(&pool, 10, 3600).await.unwrap();
    assert!(second.is_empty());

    sqlx::query("UPDATE request_queue SET visible_at = datetime('now', '-1 seconds')")
        .execute(&pool)
        .await
        .unwrap();

    let redelivered = db::receive_batch(&pool, 10, 3600).await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].id, first[0].id);
    assert_eq!(redelivered[0].request_id, first[0].request_id);
    assert_eq!(redelivered[0].attempt, 2);
}

#[tokio::test]
async fn receive_batch_respects_batch_size() {
    let pool = setup_pool().await;
    for _ in 0..5 {
        db::enqueue_request(&pool, "{}").await.unwrap();
    }

    let batch = db::receive_batch(&pool, 3, 3600).await.unwrap();
    assert_eq!(batch.len(), 3);

    let rest = db::receive_batch(&pool, 10, 3600).await.unwrap();
    assert_eq!(rest.len(), 2);
}

#[tokio::test]
async fn enqueue_assigns_unique_request_ids() {
    let pool = setup_pool().await;
    let a = db::enqueue_request(&pool, "{}").await.unwrap();
    let b = db::enqueue_request(&pool, "{}").await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn random_selection_is_roughly_uniform() {
    let pool = setup_pool().await;
    let ids = ["biz-1", "biz-2", "biz-3", "biz-4"];
    for id in ids {
        db::add_cuisine_entry(&pool, "thai", id).await.unwrap();
    }

    let trials = 400;
    let mut counts: HashMap<String, u32> = HashMap::new();
    for _ in 0..trials {
        let picked = db::random_business_for_cuisine(&pool, "thai")
            .await
            .unwrap()
            .unwrap();
        *counts.entry(picked).or_insert(0) += 1;
    }

    // Expected ~100 per id; loose bounds keep the test stable while still
    // catching "always first match" selection.
    assert_eq!(counts.len(), ids.len());
    for id in ids {
        let n = counts[id];
        assert!((40..=180).contains(&n), "{} picked {} times", id, n);
    }
}
