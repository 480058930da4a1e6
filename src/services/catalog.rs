//! Catalog and borrower records used by the ledger

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{Book, CreateBook},
        user::{CreateUser, User},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let created = self.repository.create_book(&book).await?;
        tracing::info!("Book {} created with {} copies", created.id, created.total_copies);
        Ok(created)
    }

    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.repository.get_book(id).await
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.list_books().await
    }

    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()?;
        self.repository.create_user(&user).await
    }

    pub async fn get_user(&self, id: i64) -> AppResult<User> {
        self.repository.get_user(id).await
    }
}
