//! Loan management service

use chrono::Utc;
use validator::Validate;

use crate::{
    config::LedgerConfig,
    error::{AppError, AppResult},
    models::loan::{CreateLoan, Loan, LoanDetails, LoanFilter, LoanView, ReturnLoan, UpdateLoan},
    repository::Repository,
};

use super::retry::RetryPolicy;

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    retry: RetryPolicy,
    default_loan_days: u32,
}

impl LoansService {
    pub fn new(repository: Repository, config: &LedgerConfig) -> Self {
        Self {
            repository,
            retry: RetryPolicy::from(config),
            default_loan_days: config.default_loan_days,
        }
    }

    /// Lend one copy of a book (borrow an item)
    pub async fn checkout(&self, request: CreateLoan) -> AppResult<Loan> {
        request.validate()?;
        let new_loan = request.resolve(Utc::now(), self.default_loan_days)?;

        // Verify borrower exists
        self.repository.get_user(new_loan.user_id).await?;

        let store = self.repository.as_ref();
        let pending = &new_loan;
        let loan = self
            .retry
            .run("checkout", move || store.checkout(pending))
            .await?;

        tracing::info!(
            "Loan {} opened: book {} to user {}",
            loan.id,
            loan.book_id,
            loan.user_id
        );
        Ok(loan)
    }

    /// Return a borrowed item
    pub async fn return_loan(&self, loan_id: i64, request: ReturnLoan) -> AppResult<Loan> {
        let at = request.actual_return_date.unwrap_or_else(Utc::now);
        let store = self.repository.as_ref();
        let loan = self
            .retry
            .run("return", move || store.return_loan(loan_id, at))
            .await?;

        tracing::info!("Loan {} returned (book {})", loan.id, loan.book_id);
        Ok(loan)
    }

    /// Administrative removal; an open loan releases its copy
    pub async fn delete_loan(&self, loan_id: i64) -> AppResult<()> {
        let store = self.repository.as_ref();
        self.retry
            .run("delete", move || store.delete(loan_id))
            .await?;

        tracing::info!("Loan {} deleted", loan_id);
        Ok(())
    }

    /// Move the dates of an open loan
    pub async fn update_loan(&self, loan_id: i64, changes: UpdateLoan) -> AppResult<Loan> {
        if changes.is_empty() {
            return Err(AppError::BadRequest("No loan field to update".to_string()));
        }

        let store = self.repository.as_ref();
        let pending = &changes;
        self.retry
            .run("update", move || store.update(loan_id, pending))
            .await
    }

    pub async fn get_loan(&self, loan_id: i64) -> AppResult<LoanView> {
        let loan = self.repository.get_by_id(loan_id).await?;
        Ok(LoanView::at(loan, Utc::now()))
    }

    pub async fn list_loans(&self) -> AppResult<Vec<LoanView>> {
        let now = Utc::now();
        let loans = self.repository.get_all().await?;
        Ok(loans.into_iter().map(|loan| LoanView::at(loan, now)).collect())
    }

    pub async fn find_loans(&self, filter: &LoanFilter) -> AppResult<Vec<LoanView>> {
        let now = Utc::now();
        let loans = self.repository.find_by(filter, now).await?;
        Ok(loans.into_iter().map(|loan| LoanView::at(loan, now)).collect())
    }

    /// Get loans for a user
    pub async fn get_user_loans(&self, user_id: i64) -> AppResult<Vec<LoanView>> {
        // Verify user exists
        self.repository.get_user(user_id).await?;
        let filter = LoanFilter {
            user_id: Some(user_id),
            ..LoanFilter::default()
        };
        self.find_loans(&filter).await
    }

    pub async fn list_all_with_details(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.get_all_with_details(Utc::now()).await
    }

    pub async fn list_overdue(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.list_overdue(Utc::now()).await
    }
}
