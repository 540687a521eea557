use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("unknown product reference: {0}")]
    UnknownProduct(String),
}

impl OrderError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrderError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        OrderError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Validation and unknown-product errors are the caller's fault and will
    /// fail the same way on redelivery.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            OrderError::Validation(_) | OrderError::UnknownProduct(_)
        )
    }
}
