//! Product catalog contract.
//!
//! The catalog maps a product identifier to its price and resource
//! specification snapshot. The commit path only reads; the write path
//! exists for catalog administration and carries the original
//! validation rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from catalog implementations.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The backing store could not be reached; retryable.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected by validation.
    #[error("invalid product: {0}")]
    Invalid(&'static str),
}

/// Sellability status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatus {
    /// Listed and sellable.
    Enabled,
    /// Delisted; commits against it fail permanently.
    Disabled,
}

impl ProductStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ENABLED" => Some(Self::Enabled),
            "DISABLED" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Resource configuration provisioned for a purchased product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// CPU core count.
    pub cpus: i32,
    /// Memory size in MiB.
    pub memory_mb: i32,
    /// Accelerator count.
    pub gpus: i32,
    /// Base image reference (e.g. `ubuntu:22.04`).
    pub image: String,
    /// Free-form extension payload (raw JSON: disks, networking, ...).
    pub config_json: Vec<u8>,
}

/// A sellable product with its resource specification.
///
/// `spec` is `None` only for corrupt catalog entries; an enabled
/// product without a spec is a data-integrity bug, not a retryable
/// condition.
#[derive(Debug, Clone)]
pub struct Product {
    /// Product identifier.
    pub id: i64,
    /// Display name; becomes the provisioned resource's name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Sellability status.
    pub status: ProductStatus,
    /// Price in minor currency units.
    pub price: i64,
    /// Resource specification snapshot.
    pub spec: Option<ResourceSpec>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A product submitted for creation, before an ID is assigned.
#[derive(Debug, Clone)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Price in minor currency units.
    pub price: i64,
    /// Resource specification.
    pub spec: ResourceSpec,
}

impl NewProduct {
    /// Validate the submission.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] naming the first violated
    /// rule: non-empty name, positive price, positive cpu/memory,
    /// non-empty image.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.is_empty() {
            return Err(CatalogError::Invalid("product name is required"));
        }
        if self.price <= 0 {
            return Err(CatalogError::Invalid("price must be greater than 0"));
        }
        if self.spec.cpus <= 0 || self.spec.memory_mb <= 0 {
            return Err(CatalogError::Invalid("cpu and memory must be greater than 0"));
        }
        if self.spec.image.is_empty() {
            return Err(CatalogError::Invalid("image is required"));
        }
        Ok(())
    }
}

/// Read/write access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up a product by ID with its spec snapshot.
    ///
    /// Returns `Ok(None)` when the product does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unavailable`] when the backing store
    /// cannot be reached.
    async fn get(&self, product_id: i64) -> Result<Option<Product>, CatalogError>;

    /// Create a product (enabled by default) and return its ID.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] on validation failure and
    /// [`CatalogError::Unavailable`] on store failure.
    async fn create(&self, product: NewProduct) -> Result<i64, CatalogError>;
}
