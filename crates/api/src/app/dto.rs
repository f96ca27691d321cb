use serde::Deserialize;

use salesgate_sales::Sale;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SaleRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub price: f64,
}

impl SaleRequest {
    pub fn into_sale(self) -> Sale {
        Sale::new(self.id.unwrap_or_default(), self.name, self.price)
    }
}
