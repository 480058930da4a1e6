//! Ledger scenarios on a throwaway SQLite file

use tempfile::TempDir;

use librarium_server::{
    config::{BackendKind, DatabaseConfig},
    repository::{self, Repository},
};

use crate::common;

/// Fresh migrated database; keep the directory alive for the whole test
pub async fn sqlite_store() -> (TempDir, Repository) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("ledger.db");
    let config = DatabaseConfig {
        backend: BackendKind::Sqlite,
        url: format!("sqlite://{}", path.display()),
        max_connections: 8,
        min_connections: 1,
        busy_timeout_ms: 5_000,
    };
    let store = repository::connect(&config).await.expect("sqlite ledger");
    (dir, store)
}

#[tokio::test]
async fn test_backend_reported() {
    let (_dir, store) = sqlite_store().await;
    assert_eq!(store.backend(), BackendKind::Sqlite);
    store.ping().await.expect("ping");
}

#[tokio::test]
async fn test_checkout_and_return() {
    let (_dir, store) = sqlite_store().await;
    common::checkout_and_return(store).await;
}

#[tokio::test]
async fn test_double_return_is_rejected() {
    let (_dir, store) = sqlite_store().await;
    common::double_return_is_rejected(store).await;
}

#[tokio::test]
async fn test_return_before_loan_date_is_rejected() {
    let (_dir, store) = sqlite_store().await;
    common::return_before_loan_date_is_rejected(store).await;
}

#[tokio::test]
async fn test_checkout_of_missing_records() {
    let (_dir, store) = sqlite_store().await;
    common::checkout_of_missing_records(store).await;
}

#[tokio::test]
async fn test_zero_copy_book_is_unavailable() {
    let (_dir, store) = sqlite_store().await;
    common::zero_copy_book_is_unavailable(store).await;
}

#[tokio::test]
async fn test_failed_insert_rolls_back() {
    let (_dir, store) = sqlite_store().await;
    common::failed_insert_rolls_back(store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_of_last_copy() {
    let (_dir, store) = sqlite_store().await;
    common::concurrent_checkouts_of_last_copy(store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_respect_stock() {
    let (_dir, store) = sqlite_store().await;
    common::concurrent_checkouts_respect_stock(store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_returns_of_one_loan() {
    let (_dir, store) = sqlite_store().await;
    common::concurrent_returns_of_one_loan(store).await;
}

#[tokio::test]
async fn test_delete_restores_only_open_loans() {
    let (_dir, store) = sqlite_store().await;
    common::delete_restores_only_open_loans(store).await;
}

#[tokio::test]
async fn test_update_changes_dates_of_open_loans() {
    let (_dir, store) = sqlite_store().await;
    common::update_changes_dates_of_open_loans(store).await;
}

#[tokio::test]
async fn test_overdue_classification() {
    let (_dir, store) = sqlite_store().await;
    common::overdue_classification(store).await;
}

#[tokio::test]
async fn test_details_join_book_and_user() {
    let (_dir, store) = sqlite_store().await;
    common::details_join_book_and_user(store).await;
}
