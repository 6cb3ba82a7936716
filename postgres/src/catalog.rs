//! Product catalog over PostgreSQL.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use stampede_core::catalog::{
    CatalogError, NewProduct, Product, ProductCatalog, ProductStatus, ResourceSpec,
};
use tracing::debug;

/// PostgreSQL-backed [`ProductCatalog`].
pub struct PgProductCatalog {
    pool: PgPool,
}

impl PgProductCatalog {
    /// Create a catalog over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn get(&self, product_id: i64) -> Result<Option<Product>, CatalogError> {
        let row = sqlx::query(
            r"
            SELECT p.id, p.name, p.description, p.status, p.price,
                   p.created_at, p.updated_at,
                   s.cpus, s.memory_mb, s.gpus, s.image, s.config_json
            FROM products p
            LEFT JOIN product_specs s ON s.id = p.spec_id
            WHERE p.id = $1
            ",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let unavailable = |e: sqlx::Error| CatalogError::Unavailable(e.to_string());
        let status_str: String = row.try_get("status").map_err(unavailable)?;
        // A spec should always be present; a NULL join result is the
        // data-integrity case the committer classifies as fatal.
        let spec = match row.try_get::<Option<i32>, _>("cpus").map_err(unavailable)? {
            Some(cpus) => Some(ResourceSpec {
                cpus,
                memory_mb: row.try_get("memory_mb").map_err(unavailable)?,
                gpus: row.try_get("gpus").map_err(unavailable)?,
                image: row.try_get("image").map_err(unavailable)?,
                config_json: row.try_get("config_json").map_err(unavailable)?,
            }),
            None => None,
        };

        Ok(Some(Product {
            id: row.try_get("id").map_err(unavailable)?,
            name: row.try_get("name").map_err(unavailable)?,
            description: row.try_get("description").map_err(unavailable)?,
            status: ProductStatus::parse(&status_str).unwrap_or(ProductStatus::Disabled),
            price: row.try_get("price").map_err(unavailable)?,
            spec,
            created_at: row.try_get("created_at").map_err(unavailable)?,
            updated_at: row.try_get("updated_at").map_err(unavailable)?,
        }))
    }

    async fn create(&self, product: NewProduct) -> Result<i64, CatalogError> {
        product.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let spec_id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO product_specs (cpus, memory_mb, gpus, image, config_json)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(product.spec.cpus)
        .bind(product.spec.memory_mb)
        .bind(product.spec.gpus)
        .bind(&product.spec.image)
        .bind(&product.spec.config_json)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let product_id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO products (name, description, status, price, spec_id)
            VALUES ($1, $2, 'ENABLED', $3, $4)
            RETURNING id
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(spec_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        debug!(product_id, spec_id, "product created");
        Ok(product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_product_catalog_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PgProductCatalog>();
    }
}
