pub mod export;
pub mod persister;
pub mod search;

pub use export::CsvExporter;
pub use persister::PersistenceCoordinator;
pub use search::SearchService;
