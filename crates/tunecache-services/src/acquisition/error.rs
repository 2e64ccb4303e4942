use thiserror::Error;

use crate::providers::ProviderError;

/// Failure of one acquisition job.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Identifier {content_id} could not be resolved: {source}")]
    UnresolvableIdentifier {
        content_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("No audio-only {container} stream for {content_id}")]
    NoCompatibleStream {
        content_id: String,
        container: String,
    },

    #[error("Transfer failed: {0}")]
    TransferFailure(#[source] ProviderError),

    #[error("Conversion failed: {0}")]
    ConversionFailure(#[source] ProviderError),

    #[error("Tagging failed: {0}")]
    TaggingFailure(#[source] ProviderError),

    #[error("Store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl AcquisitionError {
    /// Only a store outage is worth redelivering; every other failure repeats
    /// identically on the next attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AcquisitionError::StoreUnavailable(_))
    }
}

impl From<anyhow::Error> for AcquisitionError {
    fn from(err: anyhow::Error) -> Self {
        AcquisitionError::StoreUnavailable(err)
    }
}
