use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Registry at capacity: {0}")]
    RegistryAtCapacity(String),

    #[error("Delivery attempt failed: {0}")]
    DeliveryAttemptFailed(String),

    #[error("Delivery permanently failed after {attempts} attempts")]
    DeliveryPermanentlyFailed { attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a delivery-path error is worth another attempt
    ///
    /// Permanent conditions (missing records, exhausted retries) are not;
    /// everything else on the delivery path is treated as transient.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Self::NotFound(_) | Self::DeliveryPermanentlyFailed { .. } | Self::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
