//! # Fulfillment Error Types
//!
//! Error types for service operations and reconciliation.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Fulfillment Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Lifecycle    │  │       Gateway           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Lifecycle      │  │  GatewayUnavailable     │ │
//! │  │  InvalidUrl     │  │  (CoreError)    │  │  GatewayRejected        │ │
//! │  │  ConfigLoad...  │  │  OrderNotFound  │  │  InvalidResponse        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Database     │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Database       │  │  ChannelError   │                              │
//! │  │  (DbError)      │  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use pustakam_core::CoreError;
use pustakam_db::DbError;

/// Result type alias for fulfillment operations.
pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

/// Error type for fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid gateway base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// A lifecycle rule rejected the operation. The aggregate is unchanged.
    #[error(transparent)]
    Lifecycle(#[from] CoreError),

    /// No order with this number.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    /// Gateway or courier could not be reached, timed out, or returned 5xx/429.
    ///
    /// ## When This Occurs
    /// - Network failure during a reconciliation poll
    /// - Refund submission timed out
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Gateway refused the request (4xx other than 429).
    #[error("Gateway rejected request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    /// Gateway answered with a body we could not read.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Aggregate store failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The reconciliation worker is shutting down.
    #[error("Reconciliation worker is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for FulfillmentError {
    fn from(err: std::io::Error) -> Self {
        FulfillmentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for FulfillmentError {
    fn from(err: toml::de::Error) -> Self {
        FulfillmentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for FulfillmentError {
    fn from(err: toml::ser::Error) -> Self {
        FulfillmentError::ConfigSaveFailed(err.to_string())
    }
}

impl From<url::ParseError> for FulfillmentError {
    fn from(err: url::ParseError) -> Self {
        FulfillmentError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for FulfillmentError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                return FulfillmentError::GatewayUnavailable(err.to_string());
            }
            return FulfillmentError::GatewayRejected {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return FulfillmentError::InvalidResponse(err.to_string());
        }
        FulfillmentError::GatewayUnavailable(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl FulfillmentError {
    /// Returns true if the operation may succeed when retried.
    ///
    /// ## Retryable Errors
    /// - Gateway unreachable or overloaded
    /// - Database busy or pool exhausted
    ///
    /// ## Non-Retryable Errors
    /// - Lifecycle rule violations
    /// - Gateway 4xx rejections
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::GatewayUnavailable(_) => true,
            FulfillmentError::Database(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            FulfillmentError::InvalidConfig(_)
                | FulfillmentError::InvalidUrl(_)
                | FulfillmentError::ConfigLoadFailed(_)
                | FulfillmentError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pustakam_core::OrderStatus;

    #[test]
    fn test_retryable_errors() {
        assert!(FulfillmentError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(FulfillmentError::Database(DbError::Busy("locked".into())).is_retryable());

        assert!(!FulfillmentError::Database(DbError::not_found("Order", "ATK-2024-001")).is_retryable());
        assert!(!FulfillmentError::GatewayRejected {
            status: 400,
            message: "bad amount".into()
        }
        .is_retryable());
        assert!(!FulfillmentError::Lifecycle(CoreError::OrderNotCancellable {
            order_id: "ATK-2024-001".into(),
            status: OrderStatus::Shipped,
        })
        .is_retryable());
    }

    #[test]
    fn test_lifecycle_errors_display_transparently() {
        let err: FulfillmentError = CoreError::OrderNotCancellable {
            order_id: "ATK-2024-001".into(),
            status: OrderStatus::Delivered,
        }
        .into();
        assert_eq!(
            err.to_string(),
            CoreError::OrderNotCancellable {
                order_id: "ATK-2024-001".into(),
                status: OrderStatus::Delivered,
            }
            .to_string()
        );
        assert!(FulfillmentError::InvalidConfig("x".into()).is_config_error());
    }
}
