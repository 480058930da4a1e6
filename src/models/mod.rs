//! Data models for Librarium

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, CreateBook};
pub use loan::{
    CreateLoan, Loan, LoanDetails, LoanFilter, LoanStatus, LoanView, NewLoan, ReturnLoan,
    UpdateLoan,
};
pub use user::{CreateUser, Role, User, UserClaims};
