//! Loan row statements for PostgreSQL

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, NewLoan},
};

fn not_found(loan_id: i64) -> AppError {
    AppError::LoanNotFound(format!("Loan with id {} not found", loan_id))
}

/// Read the loan and hold its row lock until the transaction ends
pub async fn get_for_update(conn: &mut PgConnection, loan_id: i64) -> AppResult<Loan> {
    sqlx::query_as::<_, Loan>(
        r#"
        SELECT id, book_id, user_id, loan_date, return_date, actual_return_date
        FROM loans
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(loan_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| not_found(loan_id))
}

pub async fn insert(conn: &mut PgConnection, loan: &NewLoan) -> AppResult<Loan> {
    let created = sqlx::query_as::<_, Loan>(
        r#"
        INSERT INTO loans (book_id, user_id, loan_date, return_date)
        VALUES ($1, $2, $3, $4)
        RETURNING id, book_id, user_id, loan_date, return_date, actual_return_date
        "#,
    )
    .bind(loan.book_id)
    .bind(loan.user_id)
    .bind(loan.loan_date)
    .bind(loan.return_date)
    .fetch_one(&mut *conn)
    .await?;
    Ok(created)
}

pub async fn mark_returned(
    conn: &mut PgConnection,
    loan_id: i64,
    at: DateTime<Utc>,
) -> AppResult<Loan> {
    sqlx::query_as::<_, Loan>(
        r#"
        UPDATE loans SET actual_return_date = $2
        WHERE id = $1 AND actual_return_date IS NULL
        RETURNING id, book_id, user_id, loan_date, return_date, actual_return_date
        "#,
    )
    .bind(loan_id)
    .bind(at)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::AlreadyReturned(format!("Loan {} was already returned", loan_id)))
}

pub async fn set_dates(
    conn: &mut PgConnection,
    loan_id: i64,
    loan_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
) -> AppResult<Loan> {
    sqlx::query_as::<_, Loan>(
        r#"
        UPDATE loans SET loan_date = $2, return_date = $3
        WHERE id = $1 AND actual_return_date IS NULL
        RETURNING id, book_id, user_id, loan_date, return_date, actual_return_date
        "#,
    )
    .bind(loan_id)
    .bind(loan_date)
    .bind(return_date)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::AlreadyReturned(format!("Loan {} was already returned", loan_id)))
}

pub async fn remove(conn: &mut PgConnection, loan_id: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM loans WHERE id = $1")
        .bind(loan_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(not_found(loan_id));
    }
    Ok(())
}
