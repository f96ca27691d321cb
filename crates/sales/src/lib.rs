//! Sales records behind the gate.
//!
//! Plain data plus a storage abstraction; no HTTP and no authorization here.
//! Callers authorize an operation before touching the repository.

pub mod repository;
pub mod sale;

pub use repository::{InMemorySalesRepository, SalesError, SalesRepository};
pub use sale::Sale;
