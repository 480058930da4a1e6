//! Loan (borrow) model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};

/// Loan lifecycle status, derived at read time and never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl LoanStatus {
    /// Classify a loan from its two dates.
    ///
    /// A returned loan is `Returned` even if it came back late; an open loan
    /// is `Overdue` only once its due date is strictly in the past.
    pub fn derive(
        actual_return_date: Option<DateTime<Utc>>,
        return_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match (actual_return_date, return_date) {
            (Some(_), _) => LoanStatus::Returned,
            (None, Some(due)) if due < now => LoanStatus::Overdue,
            (None, _) => LoanStatus::Active,
        }
    }
}

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub loan_date: DateTime<Utc>,
    /// Expected due date
    pub return_date: Option<DateTime<Utc>>,
    /// Set once, when the copy comes back
    pub actual_return_date: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn status(&self, now: DateTime<Utc>) -> LoanStatus {
        LoanStatus::derive(self.actual_return_date, self.return_date, now)
    }

    pub fn is_open(&self) -> bool {
        self.actual_return_date.is_none()
    }

    /// Fails with `AlreadyReturned` once the loan is closed
    pub fn ensure_open(&self) -> AppResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AppError::AlreadyReturned(format!(
                "Loan {} was already returned",
                self.id
            )))
        }
    }

    /// Check that the loan can be closed at `at`
    pub fn ensure_returnable(&self, at: DateTime<Utc>) -> AppResult<()> {
        self.ensure_open()?;
        if at < self.loan_date {
            return Err(AppError::Validation(format!(
                "Return date {} precedes loan date {}",
                at, self.loan_date
            )));
        }
        Ok(())
    }
}

/// Fully resolved checkout handed to the storage layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub book_id: i64,
    pub user_id: i64,
    pub loan_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

/// Create loan request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create_loan_dates"))]
pub struct CreateLoan {
    #[validate(range(min = 1, message = "Invalid book id"))]
    pub book_id: i64,
    #[validate(range(min = 1, message = "Invalid user id"))]
    pub user_id: i64,
    /// Defaults to now
    pub loan_date: Option<DateTime<Utc>>,
    /// Defaults to the configured loan period
    pub return_date: Option<DateTime<Utc>>,
}

fn validate_create_loan_dates(loan: &CreateLoan) -> Result<(), ValidationError> {
    match (loan.loan_date, loan.return_date) {
        (Some(start), Some(due)) if due < start => {
            Err(ValidationError::new("due_before_loan_date"))
        }
        _ => Ok(()),
    }
}

impl CreateLoan {
    /// Fill in missing dates. `default_loan_days == 0` leaves the due date unset.
    pub fn resolve(&self, now: DateTime<Utc>, default_loan_days: u32) -> AppResult<NewLoan> {
        let loan_date = self.loan_date.unwrap_or(now);
        let return_date = match self.return_date {
            Some(due) => Some(due),
            None if default_loan_days > 0 => {
                Some(loan_date + Duration::days(i64::from(default_loan_days)))
            }
            None => None,
        };

        if let Some(due) = return_date {
            if due < loan_date {
                return Err(AppError::Validation(
                    "Due date precedes loan date".to_string(),
                ));
            }
        }

        Ok(NewLoan {
            book_id: self.book_id,
            user_id: self.user_id,
            loan_date,
            return_date,
        })
    }
}

/// Return loan request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReturnLoan {
    /// Defaults to now
    pub actual_return_date: Option<DateTime<Utc>>,
}

impl ReturnLoan {
    /// Parse a request body; an empty body means "returned now"
    pub fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid return request: {}", e)))
    }
}

/// Update loan request; the return timestamp is not editable here
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateLoan {
    pub loan_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
}

impl UpdateLoan {
    pub fn is_empty(&self) -> bool {
        self.loan_date.is_none() && self.return_date.is_none()
    }

    /// Merge onto an open loan, returning the new `(loan_date, return_date)`
    pub fn apply(&self, loan: &Loan) -> AppResult<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        loan.ensure_open()?;
        let loan_date = self.loan_date.unwrap_or(loan.loan_date);
        let return_date = self.return_date.or(loan.return_date);
        if let Some(due) = return_date {
            if due < loan_date {
                return Err(AppError::Validation(
                    "Due date precedes loan date".to_string(),
                ));
            }
        }
        Ok((loan_date, return_date))
    }
}

/// Criteria for `find_by`; all set fields must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanFilter {
    pub book_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: Option<LoanStatus>,
}

/// Raw joined row behind `LoanDetails`
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub user_id: i64,
    pub username: String,
    pub loan_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub actual_return_date: Option<DateTime<Utc>>,
}

impl LoanDetailsRow {
    pub fn into_details(self, now: DateTime<Utc>) -> LoanDetails {
        LoanDetails {
            status: LoanStatus::derive(self.actual_return_date, self.return_date, now),
            id: self.id,
            book_id: self.book_id,
            book_title: self.book_title,
            user_id: self.user_id,
            username: self.username,
            loan_date: self.loan_date,
            return_date: self.return_date,
            actual_return_date: self.actual_return_date,
        }
    }
}

/// Loan with book title and borrower for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub user_id: i64,
    pub username: String,
    pub loan_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

/// Loan as served over the API, with its status at read time
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub status: LoanStatus,
}

impl LoanView {
    pub fn at(loan: Loan, now: DateTime<Utc>) -> Self {
        let status = loan.status(now);
        Self { loan, status }
    }
}
