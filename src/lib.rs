pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod validation;

pub use config::AppConfig;
pub use db::{create_pool, InvoiceStore, PgStore, SaveRequest};
pub use error::{PersistenceError, QueryError, StoreError, ValidationError};
pub use service::{CsvExporter, PersistenceCoordinator, SearchService};
