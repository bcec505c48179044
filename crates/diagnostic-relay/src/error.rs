// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::host::FetchError;

/// Errors returned by the relay lifecycle API.
///
/// Configuration problems never show up here: invalid options are clamped or
/// dropped during resolution.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Activation requires a Tokio runtime")]
    NoRuntime,
}

/// Errors raised while delivering a batch to the collector.
///
/// These are reported on the diagnostics channel and the batch is dropped.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to reach collector: {0}")]
    Network(#[from] FetchError),

    #[error("Collector rejected batch with status {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RelayError::NoRuntime.to_string(),
            "Activation requires a Tokio runtime"
        );
        assert_eq!(
            DeliveryError::Status(503).to_string(),
            "Collector rejected batch with status 503"
        );
        let network = DeliveryError::from(FetchError::new("connection refused"));
        assert_eq!(
            network.to_string(),
            "Failed to reach collector: connection refused"
        );
    }
}
