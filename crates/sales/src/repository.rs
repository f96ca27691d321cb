use std::sync::RwLock;

use thiserror::Error;
use uuid::Uuid;

use crate::sale::Sale;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SalesError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store could not be used.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SalesError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Storage for sales records.
pub trait SalesRepository: Send + Sync {
    /// Store a new record. An empty id is replaced with a generated one.
    fn add(&self, sale: Sale) -> Result<Sale, SalesError>;

    fn list(&self) -> Result<Vec<Sale>, SalesError>;

    fn get(&self, id: &str) -> Result<Option<Sale>, SalesError>;

    /// Store `sale` under `id`, replacing any existing record.
    ///
    /// Returns the stored record and whether it was newly created.
    fn upsert(&self, id: &str, sale: Sale) -> Result<(Sale, bool), SalesError>;

    /// Remove and return the record stored under `id`.
    fn delete(&self, id: &str) -> Result<Sale, SalesError>;
}

/// In-memory repository keeping insertion order.
///
/// Intended for tests/dev; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemorySalesRepository {
    sales: RwLock<Vec<Sale>>,
}

impl InMemorySalesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-filled with `Item 1`..`Item 10` (ids `"1"`..`"10"`).
    pub fn seeded() -> Self {
        let sales = (1..=10)
            .map(|n| Sale::new(n.to_string(), format!("Item {n}"), 100.0 + f64::from(n)))
            .collect();
        Self { sales: RwLock::new(sales) }
    }

    fn poisoned<T>(_: T) -> SalesError {
        SalesError::Storage("lock poisoned".to_string())
    }
}

impl SalesRepository for InMemorySalesRepository {
    fn add(&self, mut sale: Sale) -> Result<Sale, SalesError> {
        sale.validate()?;
        if sale.id.trim().is_empty() {
            sale.id = Uuid::now_v7().to_string();
        }

        let mut sales = self.sales.write().map_err(Self::poisoned)?;
        if sales.iter().any(|s| s.id == sale.id) {
            return Err(SalesError::conflict(format!("sale '{}' already exists", sale.id)));
        }
        sales.push(sale.clone());
        tracing::debug!(id = %sale.id, "sale added");
        Ok(sale)
    }

    fn list(&self) -> Result<Vec<Sale>, SalesError> {
        Ok(self.sales.read().map_err(Self::poisoned)?.clone())
    }

    fn get(&self, id: &str) -> Result<Option<Sale>, SalesError> {
        let sales = self.sales.read().map_err(Self::poisoned)?;
        Ok(sales.iter().find(|s| s.id == id).cloned())
    }

    fn upsert(&self, id: &str, mut sale: Sale) -> Result<(Sale, bool), SalesError> {
        if id.trim().is_empty() {
            return Err(SalesError::validation("id must not be empty"));
        }
        sale.id = id.to_string();
        sale.validate()?;

        let mut sales = self.sales.write().map_err(Self::poisoned)?;
        let created = match sales.iter_mut().find(|s| s.id == id) {
            Some(existing) => {
                *existing = sale.clone();
                false
            }
            None => {
                sales.push(sale.clone());
                true
            }
        };
        tracing::debug!(id, created, "sale upserted");
        Ok((sale, created))
    }

    fn delete(&self, id: &str) -> Result<Sale, SalesError> {
        let mut sales = self.sales.write().map_err(Self::poisoned)?;
        let idx = sales.iter().position(|s| s.id == id).ok_or(SalesError::NotFound)?;
        tracing::debug!(id, "sale deleted");
        Ok(sales.remove(idx))
    }
}
