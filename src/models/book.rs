//! Book (lendable resource) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Book row with its copy counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    /// Copies owned by the library
    pub total_copies: i32,
    /// Copies currently on the shelf; only checkout/return move this
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Fails with `ResourceUnavailable` when no copy is left to lend
    pub fn ensure_available(&self) -> AppResult<()> {
        if self.available_copies > 0 {
            Ok(())
        } else {
            Err(AppError::ResourceUnavailable(format!(
                "No copies of book {} are available",
                self.id
            )))
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 512, message = "Title must be 1-512 characters"))]
    pub title: String,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: i32,
}
