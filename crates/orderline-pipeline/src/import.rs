use std::{path::Path, sync::Arc};

use orderline_core::{
    ImportResult, ImportRowError, ImportSource, NewOrder, NewOrderJob, NewTracking, OrderBackend,
    PhoneResolver,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    catalog::{ProductCatalog, ProductMatch},
    entities,
    error::PipelineError,
};

pub const IMPORT_SOURCE: &str = "csv";

/// Batch import of an uploaded spreadsheet export.
///
/// The file goes to the parsing service once; every returned row is then
/// written on its own, in order, and a failing row is recorded without
/// stopping the batch.
pub struct CsvImportPipeline<S, I> {
    store: Arc<S>,
    source: Arc<I>,
    resolver: PhoneResolver,
}

impl<S, I> CsvImportPipeline<S, I>
where
    S: OrderBackend,
    I: ImportSource,
{
    pub fn new(store: Arc<S>, source: Arc<I>) -> Self {
        Self {
            store,
            source,
            resolver: PhoneResolver::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: PhoneResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Imports every row parsed from `path` and removes the file afterwards.
    ///
    /// Fails only when the file is missing or the parsing service cannot
    /// produce a row list.
    pub async fn import_batch(&self, path: &Path) -> Result<ImportResult, PipelineError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(PipelineError::MissingFile(path.to_path_buf()));
        }

        let parsed = self.source.parse_file(path).await;
        remove_quietly(path).await;
        let rows = parsed.map_err(PipelineError::Import)?;

        let mut result = ImportResult::default();
        let mut catalog: Option<ProductCatalog> = None;

        for (index, row) in rows.into_iter().enumerate() {
            let label = customer_label(&row);
            match self.import_row(row, &mut catalog).await {
                Ok(()) => result.success += 1,
                Err(err) => {
                    warn!("import row {} ({label}) failed: {err}", index + 1);
                    result.failed += 1;
                    result.errors.push(ImportRowError {
                        row: index + 1,
                        customer: label,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "import of {} finished: {} imported, {} failed",
            path.display(),
            result.success,
            result.failed
        );
        Ok(result)
    }

    async fn import_row(
        &self,
        row: NewOrderJob,
        catalog: &mut Option<ProductCatalog>,
    ) -> Result<(), PipelineError> {
        let status = entities::parse_status(row.status.as_deref())?;
        let new_customer = entities::new_customer(&self.resolver, &row.customer)?;
        let mut new_address = entities::new_address(Uuid::new_v4(), &row.address)?;

        // Loaded on first use so a store outage fails rows, not the batch.
        let catalog = match catalog {
            Some(catalog) => catalog,
            None => catalog.insert(
                ProductCatalog::load(&*self.store)
                    .await
                    .map_err(PipelineError::Store)?,
            ),
        };
        let items = catalog.resolve_items(&row.items, ProductMatch::Strict)?;

        let customer = entities::upsert_customer(&*self.store, new_customer).await?;
        new_address.customer_id = customer.id;
        let address = entities::create_address(&*self.store, new_address).await?;

        let order = self
            .store
            .create_order(NewOrder {
                id: Uuid::new_v4(),
                customer_id: customer.id,
                address_id: Some(address.id),
                items,
                status,
                notes: row.notes,
                source: IMPORT_SOURCE.to_string(),
            })
            .await
            .map_err(PipelineError::Store)?;

        self.store
            .create_tracking(NewTracking::pending(order.id))
            .await
            .map_err(PipelineError::Store)?;

        Ok(())
    }
}

fn customer_label(row: &NewOrderJob) -> String {
    format!("{} ({})", row.customer.name.trim(), row.customer.phone_number.trim())
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!("could not remove import file {}: {err}", path.display());
    }
}
