//! Book availability on SQLite.
//!
//! SQLite has no row locks. The first write in a transaction takes the
//! database write lock, so `get_for_update` opens with a no-op UPDATE and the
//! counter changes are guarded compare-and-swap statements.

use sqlx::SqliteConnection;

use crate::{
    error::{AppError, AppResult},
    models::book::Book,
};

/// Read the book after taking the write lock for the rest of the transaction
pub async fn get_for_update(conn: &mut SqliteConnection, book_id: i64) -> AppResult<Book> {
    sqlx::query_as::<_, Book>(
        r#"
        UPDATE books SET available_copies = available_copies
        WHERE id = ?
        RETURNING id, title, total_copies, available_copies, created_at
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::ResourceNotFound(format!("Book with id {} not found", book_id)))
}

/// Swap `expected` for `expected - 1`; fails if the count moved underneath us
pub async fn decrement(conn: &mut SqliteConnection, book_id: i64, expected: i32) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available_copies = available_copies - 1
        WHERE id = ? AND available_copies = ? AND available_copies > 0
        RETURNING available_copies
        "#,
    )
    .bind(book_id)
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        AppError::ConcurrencyConflict(format!(
            "Availability of book {} changed during checkout",
            book_id
        ))
    })
}

/// Put one copy back; returns the new count
pub async fn increment(conn: &mut SqliteConnection, book_id: i64) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available_copies = available_copies + 1
        WHERE id = ? AND available_copies < total_copies
        RETURNING available_copies
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        AppError::Internal(format!(
            "Book {} is missing or already has every copy on the shelf",
            book_id
        ))
    })
}
