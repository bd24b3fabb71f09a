//! Integration tests for database connection, pooling and migrations
//!
//! Run with: cargo test --package siaip-storage --test integration_database

use siaip_storage::connection::{Database, DatabaseConfig};
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    assert_eq!(db.pool().size(), 1);
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_writers_on_file_database() {
    const WRITERS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig::new(dir.path().join("events.db").display().to_string())
        .max_connections(4);
    let db = Database::new(config).await.unwrap();
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let db = db.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                sqlx::query("INSERT INTO systems (account_code) VALUES (?)")
                    .bind(format!("{:04}", 1000 + i))
                    .execute(db.pool())
                    .await
                    .unwrap();
            })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM systems")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count.0, WRITERS as i64);
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    for table in ["event_receptions", "signal_types", "systems", "zones"] {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(result.0, 1, "missing table {table}");
    }

    db.close().await;
}

#[tokio::test]
async fn test_file_database_created_in_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("events.db");

    let db = Database::new(DatabaseConfig::new(path.display().to_string()))
        .await
        .unwrap();
    db.health_check().await.unwrap();
    db.close().await;

    assert!(path.exists());
}

#[tokio::test]
async fn test_file_database_persists_between_pools() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("events.db").display());

    let db = Database::new(DatabaseConfig::new(url.clone())).await.unwrap();
    sqlx::query("INSERT INTO systems (account_code) VALUES ('1234')")
        .execute(db.pool())
        .await
        .unwrap();
    db.close().await;

    let db = Database::new(DatabaseConfig::new(url)).await.unwrap();
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM systems")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count.0, 1);
    db.close().await;
}
