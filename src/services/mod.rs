//! Business logic services

pub mod catalog;
pub mod loans;
pub mod retry;

use crate::{
    config::{BackendKind, LedgerConfig},
    error::AppResult,
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    repository: Repository,
}

impl Services {
    /// Create all services on top of the injected storage adapter
    pub fn new(repository: Repository, ledger_config: &LedgerConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), ledger_config),
            repository,
        }
    }

    /// Check the storage backend answers
    pub async fn check_storage(&self) -> AppResult<BackendKind> {
        self.repository.ping().await?;
        Ok(self.repository.backend())
    }
}
