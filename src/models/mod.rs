pub mod invoice;
pub mod search;
pub mod stats;

pub use invoice::{InvoiceRecord, LineItem, NormalizedInvoice, NormalizedLineItem};
pub use search::{SearchPage, SearchQuerySpec, SortDirection, SortKey};
pub use stats::UserStatistics;
