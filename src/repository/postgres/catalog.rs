//! Book availability under PostgreSQL row locks

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::book::Book,
};

/// Read the book and hold its row lock until the transaction ends
pub async fn get_for_update(conn: &mut PgConnection, book_id: i64) -> AppResult<Book> {
    sqlx::query_as::<_, Book>(
        r#"
        SELECT id, title, total_copies, available_copies, created_at
        FROM books
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::ResourceNotFound(format!("Book with id {} not found", book_id)))
}

/// Take one copy off the shelf; returns the remaining count
pub async fn decrement(conn: &mut PgConnection, book_id: i64) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available_copies = available_copies - 1
        WHERE id = $1 AND available_copies > 0
        RETURNING available_copies
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        AppError::ResourceUnavailable(format!("No copies of book {} are available", book_id))
    })
}

/// Put one copy back; returns the new count
pub async fn increment(conn: &mut PgConnection, book_id: i64) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available_copies = available_copies + 1
        WHERE id = $1 AND available_copies < total_copies
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
