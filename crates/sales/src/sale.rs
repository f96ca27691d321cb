use serde::{Deserialize, Serialize};

use crate::repository::SalesError;

/// A single sales record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub price: f64,
}

impl Sale {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
        }
    }

    pub fn validate(&self) -> Result<(), SalesError> {
        if self.name.trim().is_empty() {
            return Err(SalesError::validation("name must not be empty"));
        }
        if !self.price.is_finite() {
            return Err(SalesError::validation("price must be a finite number"));
        }
        Ok(())
    }
}
