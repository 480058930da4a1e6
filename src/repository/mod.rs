//! Storage port for the lending ledger and its backend adapters
//!
//! Both adapters honor the same contract: a checkout, return, update or
//! delete runs as one transaction that first takes an exclusive hold on the
//! rows it is about to change, and rolls back completely on any error.

pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Encode, QueryBuilder, Transaction, Type};

use crate::{
    config::{BackendKind, DatabaseConfig},
    error::AppResult,
    models::{
        book::{Book, CreateBook},
        loan::{Loan, LoanDetails, LoanFilter, LoanStatus, NewLoan, UpdateLoan},
        user::{CreateUser, User},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Which engine this adapter talks to
    fn backend(&self) -> BackendKind;

    /// Round-trip to the database
    async fn ping(&self) -> AppResult<()>;

    // Catalog and borrower records owned by collaborators

    async fn create_book(&self, book: &CreateBook) -> AppResult<Book>;
    async fn get_book(&self, id: i64) -> AppResult<Book>;
    async fn list_books(&self) -> AppResult<Vec<Book>>;
    async fn create_user(&self, user: &CreateUser) -> AppResult<User>;
    async fn get_user(&self, id: i64) -> AppResult<User>;

    // Ledger mutations, each one atomic

    /// Take one copy of the book and record the loan
    async fn checkout(&self, loan: &NewLoan) -> AppResult<Loan>;
    /// Close the loan at `at` and put the copy back
    async fn return_loan(&self, loan_id: i64, at: DateTime<Utc>) -> AppResult<Loan>;
    /// Remove the loan; an open loan gives its copy back
    async fn delete(&self, loan_id: i64) -> AppResult<()>;
    /// Change the dates of an open loan
    async fn update(&self, loan_id: i64, changes: &UpdateLoan) -> AppResult<Loan>;

    // Reads

    async fn get_all(&self) -> AppResult<Vec<Loan>>;
    async fn get_by_id(&self, loan_id: i64) -> AppResult<Loan>;
    async fn find_by(&self, filter: &LoanFilter, now: DateTime<Utc>) -> AppResult<Vec<Loan>>;
    async fn get_all_with_details(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>>;
    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>>;
}

/// Shared handle to whichever adapter was configured
pub type Repository = Arc<dyn LedgerStore>;

/// Build the configured adapter, run its migrations and hand it out
pub async fn connect(config: &DatabaseConfig) -> AppResult<Repository> {
    let store: Repository = match config.backend {
        BackendKind::Postgres => {
            let store = postgres::PgLedger::connect(config).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        BackendKind::Sqlite => {
            let store = sqlite::SqliteLedger::connect(config).await?;
            store.migrate().await?;
            Arc::new(store)
        }
    };

    tracing::info!("Lending ledger ready on {} backend", config.backend);
    Ok(store)
}

/// Loan columns, selected through the `l` alias
pub(crate) const LOAN_COLUMNS: &str =
    "l.id, l.book_id, l.user_id, l.loan_date, l.return_date, l.actual_return_date";

pub(crate) const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.book_id, b.title AS book_title, l.user_id, u.username,
           l.loan_date, l.return_date, l.actual_return_date
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

/// Append a WHERE clause matching `filter` against the `l` alias
pub(crate) fn push_loan_filter<'a, DB>(
    query: &mut QueryBuilder<'a, DB>,
    filter: &LoanFilter,
    now: DateTime<Utc>,
) where
    DB: Database,
    i64: 'a + Encode<'a, DB> + Type<DB>,
    DateTime<Utc>: 'a + Encode<'a, DB> + Type<DB>,
{
    query.push(" WHERE 1 = 1");

    if let Some(book_id) = filter.book_id {
        query.push(" AND l.book_id = ").push_bind(book_id);
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND l.user_id = ").push_bind(user_id);
    }

    match filter.status {
        Some(LoanStatus::Returned) => {
            query.push(" AND l.actual_return_date IS NOT NULL");
        }
        Some(LoanStatus::Overdue) => {
            query
                .push(" AND l.actual_return_date IS NULL AND l.return_date < ")
                .push_bind(now);
        }
        Some(LoanStatus::Active) => {
            query
                .push(" AND l.actual_return_date IS NULL AND (l.return_date IS NULL OR l.return_date >= ")
                .push_bind(now)
                .push(")");
        }
        None => {}
    }
}

/// Roll back a failed unit of work, logging (not masking) rollback failures
pub(crate) async fn rollback<DB: Database>(tx: Transaction<'_, DB>, operation: &str) {
    match tx.rollback().await {
        Ok(()) => tracing::debug!("Rolled back {}", operation),
        Err(e) => tracing::warn!("Rollback of {} failed: {}", operation, e),
    }
}
