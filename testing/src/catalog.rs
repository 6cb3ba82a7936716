//! In-memory product catalog.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use stampede_core::catalog::{
    CatalogError, NewProduct, Product, ProductCatalog, ProductStatus, ResourceSpec,
};

/// [`ProductCatalog`] over a hash map.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<i64, Product>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Insert a fully formed product under its own id.
    pub fn insert(&self, product: Product) {
        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.id, product);
    }

    /// Insert an enabled product with the given spec; returns it for
    /// further tweaking.
    pub fn insert_enabled(&self, id: i64, price: i64, spec: ResourceSpec) -> Product {
        let now = Utc::now();
        let product = Product {
            id,
            name: format!("product-{id}"),
            description: String::new(),
            status: ProductStatus::Enabled,
            price,
            spec: Some(spec),
            created_at: now,
            updated_at: now,
        };
        self.insert(product.clone());
        product
    }

    /// Make subsequent lookups fail with [`CatalogError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get(&self, product_id: i64) -> Result<Option<Product>, CatalogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("injected outage".to_string()));
        }
        Ok(self
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&product_id)
            .cloned())
    }

    async fn create(&self, product: NewProduct) -> Result<i64, CatalogError> {
        product.validate()?;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("injected outage".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        self.insert(Product {
            id,
            name: product.name,
            description: product.description,
            status: ProductStatus::Enabled,
            price: product.price,
            spec: Some(product.spec),
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }
}
