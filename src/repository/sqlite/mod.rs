//! SQLite adapter: database-level write lock plus guarded compare-and-swap.
//!
//! Every mutating transaction opens with a write so the lock is taken before
//! anything is read. A writer that cannot get the lock within the busy
//! timeout fails with `SQLITE_BUSY`, which surfaces as a retryable
//! `ConcurrencyConflict`.

mod catalog;
mod loans;

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Sqlite, SqliteConnection,
};

use super::{push_loan_filter, rollback, LedgerStore, LOAN_COLUMNS, LOAN_DETAILS_SELECT};
use crate::{
    config::{BackendKind, DatabaseConfig},
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook},
        loan::{Loan, LoanDetails, LoanDetailsRow, LoanFilter, LoanStatus, NewLoan, UpdateLoan},
        user::{CreateUser, User},
    },
};

#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Wrap an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool on the configured database file
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_with(options)
            .await?;

        tracing::info!("Opened SQLite database {}", config.url);
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("SQLite migrations failed: {}", e)))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn checkout_in(conn: &mut SqliteConnection, loan: &NewLoan) -> AppResult<Loan> {
        let book = catalog::get_for_update(conn, loan.book_id).await?;
        book.ensure_available()?;
        let remaining = catalog::decrement(conn, book.id, book.available_copies).await?;
        let created = loans::insert(conn, loan).await?;
        tracing::debug!("Book {} down to {} copies", book.id, remaining);
        Ok(created)
    }

    async fn return_in(conn: &mut SqliteConnection, loan_id: i64, at: DateTime<Utc>) -> AppResult<Loan> {
        let loan = loans::get_for_update(conn, loan_id).await?;
        loan.ensure_returnable(at)?;
        let returned = loans::mark_returned(conn, loan_id, at).await?;
        let available = catalog::increment(conn, loan.book_id).await?;
        tracing::debug!("Book {} back to {} copies", loan.book_id, available);
        Ok(returned)
    }

    async fn delete_in(conn: &mut SqliteConnection, loan_id: i64) -> AppResult<()> {
        let loan = loans::get_for_update(conn, loan_id).await?;
        if loan.is_open() {
            catalog::increment(conn, loan.book_id).await?;
        }
        loans::remove(conn, loan_id).await
    }

    async fn update_in(conn: &mut SqliteConnection, loan_id: i64, changes: &UpdateLoan) -> AppResult<Loan> {
        let loan = loans::get_for_update(conn, loan_id).await?;
        let (loan_date, return_date) = changes.apply(&loan)?;
        loans::set_dates(conn, loan_id, loan_date, return_date).await
    }

    async fn details(&self, filter: &LoanFilter, now: DateTime<Utc>, order: &str) -> AppResult<Vec<LoanDetails>> {
        let mut query = QueryBuilder::<Sqlite>::new(LOAN_DETAILS_SELECT);
        push_loan_filter(&mut query, filter, now);
        query.push(order);

        let rows = query
            .build_query_as::<LoanDetailsRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.into_details(now)).collect())
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_book(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, total_copies, available_copies, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, title, total_copies, available_copies, created_at
            "#,
        )
        .bind(&book.title)
        .bind(book.total_copies)
        .bind(book.total_copies)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_book(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            "SELECT id, title, total_copies, available_copies, created_at FROM books WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::ResourceNotFound(format!("Book with id {} not found", id)))
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT id, title, total_copies, available_copies, created_at FROM books ORDER BY title, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn create_user(&self, user: &CreateUser) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, display_name, created_at)
            VALUES (?, ?, ?)
            RETURNING id, username, display_name, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, display_name, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn checkout(&self, loan: &NewLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;
        let result = Self::checkout_in(&mut tx, loan).await;
        match result {
            Ok(created) => {
                tx.commit().await?;
                Ok(created)
            }
            Err(e) => {
                rollback(tx, "checkout").await;
                Err(e)
            }
        }
    }

    async fn return_loan(&self, loan_id: i64, at: DateTime<Utc>) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;
        let result = Self::return_in(&mut tx, loan_id, at).await;
        match result {
            Ok(returned) => {
                tx.commit().await?;
                Ok(returned)
            }
            Err(e) => {
                rollback(tx, "return").await;
                Err(e)
            }
        }
    }

    async fn delete(&self, loan_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = Self::delete_in(&mut tx, loan_id).await;
        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                rollback(tx, "delete").await;
                Err(e)
            }
        }
    }

    async fn update(&self, loan_id: i64, changes: &UpdateLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;
        let result = Self::update_in(&mut tx, loan_id, changes).await;
        match result {
            Ok(updated) => {
                tx.commit().await?;
                Ok(updated)
            }
            Err(e) => {
                rollback(tx, "update").await;
                Err(e)
            }
        }
    }

    async fn get_all(&self) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans l ORDER BY l.id", LOAN_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    async fn get_by_id(&self, loan_id: i64) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans l WHERE l.id = ?", LOAN_COLUMNS))
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::LoanNotFound(format!("Loan with id {} not found", loan_id)))
    }

    async fn find_by(&self, filter: &LoanFilter, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM loans l", LOAN_COLUMNS));
        push_loan_filter(&mut query, filter, now);
        query.push(" ORDER BY l.id");

        let loans = query.build_query_as::<Loan>().fetch_all(&self.pool).await?;
        Ok(loans)
    }

    async fn get_all_with_details(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        self.details(&LoanFilter::default(), now, " ORDER BY l.loan_date DESC, l.id DESC")
            .await
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        let filter = LoanFilter {
            status: Some(LoanStatus::Overdue),
            ..LoanFilter::default()
        };
        self.details(&filter, now, " ORDER BY l.return_date, l.id").await
    }
}
