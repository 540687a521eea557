//! Order pipelines: queued ingestion, tracking sync off the event bus, and
//! batch CSV import. Storage, ledger, queue and bus are reached only through
//! the `orderline-core` traits.

pub mod catalog;
mod entities;
pub mod error;
pub mod import;
pub mod ingestion;
pub mod ledger;
pub mod tracking;

pub use catalog::{ProductCatalog, ProductMatch};
pub use error::PipelineError;
pub use import::CsvImportPipeline;
pub use ingestion::{IngestionOutcome, OrderIngestionWorker};
pub use tracking::TrackingSync;
