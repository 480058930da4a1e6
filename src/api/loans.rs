//! Loan management endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{CreateLoan, LoanDetails, LoanFilter, LoanView, ReturnLoan, UpdateLoan},
    AppState,
};

use super::AuthenticatedUser;

/// Checkout request
#[derive(Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Book to lend
    pub book_id: i64,
    /// Borrower; defaults to the caller, only librarians may name someone else
    pub user_id: Option<i64>,
    /// Defaults to now
    pub loan_date: Option<DateTime<Utc>>,
    /// Due date; defaults to the configured loan period
    pub return_date: Option<DateTime<Utc>>,
}

/// Return response with loan details
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub returned: bool,
    pub loan: LoanView,
}

/// List every loan with book and borrower
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All loans", body = Vec<LoanDetails>),
        (status = 403, description = "Librarian rights required")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_librarian()?;
    let loans = state.services.loans.list_all_with_details().await?;
    Ok(Json(loans))
}

/// List open loans past their due date
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans, oldest due date first", body = Vec<LoanDetails>)
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_librarian()?;
    let loans = state.services.loans.list_overdue().await?;
    Ok(Json(loans))
}

/// Find loans by book, borrower or status
#[utoipa::path(
    get,
    path = "/loans/search",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanFilter),
    responses(
        (status = 200, description = "Matching loans", body = Vec<LoanView>)
    )
)]
pub async fn find_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(filter): Query<LoanFilter>,
) -> AppResult<Json<Vec<LoanView>>> {
    claims.require_librarian()?;
    let loans = state.services.loans.find_loans(&filter).await?;
    Ok(Json(loans))
}

/// Get loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's loans", body = Vec<LoanView>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<LoanView>>> {
    claims.require_self_or_librarian(user_id)?;
    let loans = state.services.loans.get_user_loans(user_id).await?;
    Ok(Json(loans))
}

/// Check a book out (borrow an item)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanView),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "No copy available, or a retryable conflict")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<LoanView>)> {
    let user_id = request.user_id.unwrap_or(claims.user_id);
    claims.require_self_or_librarian(user_id)?;

    let loan = state
        .services
        .loans
        .checkout(CreateLoan {
            book_id: request.book_id,
            user_id,
            loan_date: request.loan_date,
            return_date: request.return_date,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(LoanView::at(loan, Utc::now()))))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan", body = LoanView),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanView>> {
    let view = state.services.loans.get_loan(loan_id).await?;
    claims.require_self_or_librarian(view.loan.user_id)?;
    Ok(Json(view))
}

/// Return a borrowed item
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    request_body(content = ReturnLoan, description = "Optional return timestamp; empty body returns now"),
    responses(
        (status = 200, description = "Item returned", body = ReturnResponse),
        (status = 400, description = "Malformed return request"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
    body: Bytes,
) -> AppResult<Json<ReturnResponse>> {
    let request = ReturnLoan::from_body(&body)?;

    if !claims.is_librarian() {
        let current = state.services.loans.get_loan(loan_id).await?;
        claims.require_self_or_librarian(current.loan.user_id)?;
    }

    let loan = state.services.loans.return_loan(loan_id, request).await?;

    Ok(Json(ReturnResponse {
        returned: true,
        loan: LoanView::at(loan, Utc::now()),
    }))
}

/// Change the dates of an open loan
#[utoipa::path(
    put,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Loan ID")),
    request_body = UpdateLoan,
    responses(
        (status = 200, description = "Loan updated", body = LoanView),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already returned")
    )
)]
pub async fn update_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
    Json(changes): Json<UpdateLoan>,
) -> AppResult<Json<LoanView>> {
    claims.require_librarian()?;
    let loan = state.services.loans.update_loan(loan_id, changes).await?;
    Ok(Json(LoanView::at(loan, Utc::now())))
}

/// Delete a loan; an open loan gives its copy back
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Loan ID")),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<StatusCode> {
    claims.require_librarian()?;
    state.services.loans.delete_loan(loan_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
