//! # Fulfillment Configuration
//!
//! Configuration for the storefront fulfillment service.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PUSTAKAM_DATABASE_PATH=/var/lib/pustakam/pustakam.db               │
//! │     PUSTAKAM_PAYMENT_GATEWAY_URL=https://pay.example.com               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pustakam/pustakam.toml (Linux)                           │
//! │     ~/Library/Application Support/in.pustakam.storefront/... (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # pustakam.toml
//! [database]
//! path = "pustakam.db"
//! max_connections = 5
//!
//! [pricing]
//! flat_shipping_fee_paise = 5000
//! free_shipping_threshold_paise = 49900
//! tax_rate_bps = 0
//!
//! [reconciliation]
//! enabled = true
//! interval_secs = 300
//! payment_stale_after_secs = 900
//! shipment_stale_after_secs = 21600
//!
//! [gateway]
//! payment_base_url = "https://payments.example.com/"
//! courier_base_url = "https://courier.example.com/"
//! timeout_secs = 10
//!
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use pustakam_core::{Money, PricingPolicy, TaxRate};

use crate::error::{FulfillmentError, FulfillmentResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Aggregate store location and pool size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("pustakam.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

/// Shipping and tax applied when totals are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee_paise: i64,

    /// Subtotal at or above which shipping is free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold_paise: i64,

    /// Basis points. Printed books are GST-exempt, hence 0.
    #[serde(default)]
    pub tax_rate_bps: u32,
}

fn default_flat_shipping_fee() -> i64 {
    5_000
}

fn default_free_shipping_threshold() -> i64 {
    49_900
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            flat_shipping_fee_paise: default_flat_shipping_fee(),
            free_shipping_threshold_paise: default_free_shipping_threshold(),
            tax_rate_bps: 0,
        }
    }
}

// =============================================================================
// Reconciliation Settings
// =============================================================================

/// Upper bound for the reconciliation interval and staleness thresholds.
pub const MAX_RECONCILIATION_SECS: u64 = 30 * 24 * 60 * 60;

/// How often and how far back the reconciliation job looks.
///
/// Exceeding a staleness threshold never fails a payment or shipment; it
/// only makes the order eligible for a poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSettings {
    /// Run on a timer. On-demand runs work either way.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// A gateway payment still `pending` after this long is polled.
    #[serde(default = "default_payment_stale_after")]
    pub payment_stale_after_secs: u64,

    /// A shipment with no scan for this long is polled.
    #[serde(default = "default_shipment_stale_after")]
    pub shipment_stale_after_secs: u64,

    /// Orders (and refunds) handled per pass, per category.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Refund submissions give up after this many failures.
    #[serde(default = "default_refund_max_attempts")]
    pub refund_max_attempts: i64,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_payment_stale_after() -> u64 {
    15 * 60
}

fn default_shipment_stale_after() -> u64 {
    6 * 60 * 60
}

fn default_batch_size() -> i64 {
    100
}

fn default_refund_max_attempts() -> i64 {
    10
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        ReconciliationSettings {
            enabled: true,
            interval_secs: default_interval(),
            payment_stale_after_secs: default_payment_stale_after(),
            shipment_stale_after_secs: default_shipment_stale_after(),
            batch_size: default_batch_size(),
            refund_max_attempts: default_refund_max_attempts(),
        }
    }
}

impl ReconciliationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn payment_stale_after(&self) -> chrono::Duration {
        bounded_seconds(self.payment_stale_after_secs)
    }

    pub fn shipment_stale_after(&self) -> chrono::Duration {
        bounded_seconds(self.shipment_stale_after_secs)
    }
}

fn bounded_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_RECONCILIATION_SECS) as i64)
}

// =============================================================================
// Gateway Settings
// =============================================================================

/// Outbound connection to the payment gateway and courier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_payment_base_url")]
    pub payment_base_url: String,

    #[serde(default = "default_courier_base_url")]
    pub courier_base_url: String,

    /// Bearer token sent to both endpoints.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Initial backoff (milliseconds) between retries of one call.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Total time (seconds) one call may spend retrying.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_secs: u64,
}

fn default_payment_base_url() -> String {
    "http://127.0.0.1:9100/".to_string()
}

fn default_courier_base_url() -> String {
    "http://127.0.0.1:9200/".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_elapsed() -> u64 {
    30
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            payment_base_url: default_payment_base_url(),
            courier_base_url: default_courier_base_url(),
            api_key: None,
            timeout_secs: default_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_elapsed_secs: default_max_elapsed(),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP listener for the storefront API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete fulfillment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub reconciliation: ReconciliationSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub server: ServerSettings,
}

impl FulfillmentConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (pustakam.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> FulfillmentResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading fulfillment config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load fulfillment config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> FulfillmentResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| FulfillmentError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Fulfillment config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> FulfillmentResult<()> {
        for (name, raw) in [
            ("payment_base_url", &self.gateway.payment_base_url),
            ("courier_base_url", &self.gateway.courier_base_url),
        ] {
            let url = Url::parse(raw)
                .map_err(|e| FulfillmentError::InvalidUrl(format!("{}: {} ({})", name, raw, e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(FulfillmentError::InvalidUrl(format!(
                    "{} must start with http:// or https://, got: {}",
                    name, raw
                )));
            }
        }

        if self.pricing.flat_shipping_fee_paise < 0 || self.pricing.free_shipping_threshold_paise < 0 {
            return Err(FulfillmentError::InvalidConfig(
                "shipping fee and threshold must not be negative".into(),
            ));
        }
        if self.pricing.tax_rate_bps > 10_000 {
            return Err(FulfillmentError::InvalidConfig(
                "tax_rate_bps must be at most 10000".into(),
            ));
        }
        for (name, secs, min) in [
            ("interval_secs", self.reconciliation.interval_secs, 1),
            ("payment_stale_after_secs", self.reconciliation.payment_stale_after_secs, 0),
            ("shipment_stale_after_secs", self.reconciliation.shipment_stale_after_secs, 0),
        ] {
            if secs < min || secs > MAX_RECONCILIATION_SECS {
                return Err(FulfillmentError::InvalidConfig(format!(
                    "{} must be between {} and {}",
                    name, min, MAX_RECONCILIATION_SECS
                )));
            }
        }
        if self.reconciliation.batch_size <= 0 {
            return Err(FulfillmentError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(FulfillmentError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PUSTAKAM_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("PUSTAKAM_PAYMENT_GATEWAY_URL") {
            debug!(url = %url, "Overriding payment gateway URL from environment");
            self.gateway.payment_base_url = url;
        }

        if let Ok(url) = std::env::var("PUSTAKAM_COURIER_URL") {
            debug!(url = %url, "Overriding courier URL from environment");
            self.gateway.courier_base_url = url;
        }

        if let Ok(key) = std::env::var("PUSTAKAM_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(key);
        }

        if let Ok(addr) = std::env::var("PUSTAKAM_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Ok(port) = std::env::var("PUSTAKAM_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding server port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(port = %port, "Ignoring invalid PUSTAKAM_PORT"),
            }
        }

        if let Ok(secs) = std::env::var("PUSTAKAM_RECONCILE_INTERVAL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.reconciliation.interval_secs = s;
            }
        }

        if let Ok(enabled) = std::env::var("PUSTAKAM_RECONCILIATION_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.reconciliation.enabled = true,
                "0" | "false" | "no" | "off" => self.reconciliation.enabled = false,
                _ => warn!(value = %enabled, "Unknown PUSTAKAM_RECONCILIATION_ENABLED value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("in", "pustakam", "storefront")
            .map(|dirs| dirs.config_dir().join("pustakam.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pricing policy for order placement and amendment.
    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            flat_shipping_fee: Money::from_paise(self.pricing.flat_shipping_fee_paise),
            free_shipping_threshold: Money::from_paise(self.pricing.free_shipping_threshold_paise),
            tax_rate: TaxRate::from_bps(self.pricing.tax_rate_bps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FulfillmentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.pricing_policy(), PricingPolicy::default());
        assert_eq!(config.reconciliation.payment_stale_after(), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: FulfillmentConfig = toml::from_str(
            r#"
            [pricing]
            tax_rate_bps = 500

            [reconciliation]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.pricing.tax_rate_bps, 500);
        assert_eq!(config.pricing.flat_shipping_fee_paise, 5_000);
        assert!(!config.reconciliation.enabled);
        assert_eq!(config.reconciliation.interval_secs, 300);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_validation() {
        let mut config = FulfillmentConfig::default();

        config.gateway.payment_base_url = "ftp://pay.example.com".to_string();
        assert!(matches!(config.validate(), Err(FulfillmentError::InvalidUrl(_))));

        config.gateway.payment_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.gateway.payment_base_url = "https://pay.example.com/".to_string();
        assert!(config.validate().is_ok());

        config.reconciliation.batch_size = 0;
        assert!(matches!(config.validate(), Err(FulfillmentError::InvalidConfig(_))));
    }

    #[test]
    fn test_reconciliation_windows_are_bounded() {
        let mut config = FulfillmentConfig::default();

        config.reconciliation.interval_secs = 0;
        assert!(matches!(config.validate(), Err(FulfillmentError::InvalidConfig(_))));
        config.reconciliation.interval_secs = 60;

        config.reconciliation.payment_stale_after_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(FulfillmentError::InvalidConfig(_))));
        // Accessors stay usable even on unvalidated settings.
        assert_eq!(
            config.reconciliation.payment_stale_after(),
            chrono::Duration::days(30)
        );
        config.reconciliation.payment_stale_after_secs = MAX_RECONCILIATION_SECS;
        assert!(config.validate().is_ok());

        config.reconciliation.shipment_stale_after_secs = MAX_RECONCILIATION_SECS + 1;
        assert!(matches!(config.validate(), Err(FulfillmentError::InvalidConfig(_))));
    }

    #[test]
    fn test_toml_serialization() {
        let config = FulfillmentConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[reconciliation]"));
        assert!(toml_str.contains("[gateway]"));
    }
}
