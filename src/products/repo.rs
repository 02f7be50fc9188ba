use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{NewProduct, Product, ProductFilter};
use crate::error::RepoError;

#[async_trait]
pub trait ProductRepo: Send + Sync {
    /// Inserts a product; a taken SKU is `RepoError::Conflict`.
    async fn create(&self, new: NewProduct) -> Result<Product, RepoError>;
    async fn find(&self, uuid: Uuid) -> Result<Option<Product>, RepoError>;
    /// Newest first, plus the number of rows matching `filter`.
    async fn list(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64), RepoError>;
    /// Distinct, non-empty categories in alphabetical order.
    async fn categories(&self) -> Result<Vec<String>, RepoError>;
    /// Writes every editable column of `product` back to its row.
    async fn update(&self, product: &Product) -> Result<Product, RepoError>;
    async fn set_image(
        &self,
        uuid: Uuid,
        path: &str,
        url: &str,
        updated_by: i64,
    ) -> Result<Product, RepoError>;
    /// Marks the row deleted; `false` when there was nothing to delete.
    async fn soft_delete(&self, uuid: Uuid) -> Result<bool, RepoError>;
}

#[derive(Clone)]
pub struct PgProductRepo {
    db: PgPool,
}

impl PgProductRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const PRODUCT_COLUMNS: &str = "id, uuid, name, description, price, stock, category, brand, sku, \
     image_path, image_url, status, created_by, updated_by, created_at, updated_at, deleted_at";

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(status) = &filter.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl ProductRepo for PgProductRepo {
    async fn create(&self, new: NewProduct) -> Result<Product, RepoError> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products
                (uuid, name, description, price, stock, category, brand, sku, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(new.uuid)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.stock)
        .bind(&new.category)
        .bind(&new.brand)
        .bind(&new.sku)
        .bind(new.status.as_str())
        .bind(new.created_by)
        .fetch_one(&self.db)
        .await
        .map_err(|e| RepoError::from_sqlx(e, "SKU"))
    }

    async fn find(&self, uuid: Uuid) -> Result<Option<Product>, RepoError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(&self.db)
        .await?;
        Ok(product)
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64), RepoError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products"
        ));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let products = select
            .build_query_as::<Product>()
            .fetch_all(&self.db)
            .await?;

        Ok((products, total))
    }

    async fn categories(&self) -> Result<Vec<String>, RepoError> {
        let categories = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT category
              FROM products
             WHERE deleted_at IS NULL AND category <> ''
             ORDER BY category
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(categories)
    }

    async fn update(&self, product: &Product) -> Result<Product, RepoError> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
               SET name = $2, description = $3, price = $4, stock = $5, category = $6,
                   brand = $7, sku = $8, status = $9, updated_by = $10, updated_at = NOW()
             WHERE uuid = $1 AND deleted_at IS NULL
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.uuid)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.sku)
        .bind(&product.status)
        .bind(product.updated_by)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| RepoError::from_sqlx(e, "SKU"))?
        .ok_or(RepoError::NotFound("Product"))
    }

    async fn set_image(
        &self,
        uuid: Uuid,
        path: &str,
        url: &str,
        updated_by: i64,
    ) -> Result<Product, RepoError> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
               SET image_path = $2, image_url = $3, updated_by = $4, updated_at = NOW()
             WHERE uuid = $1 AND deleted_at IS NULL
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(uuid)
        .bind(path)
        .bind(url)
        .bind(updated_by)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepoError::NotFound("Product"))
    }

    async fn soft_delete(&self, uuid: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE products SET deleted_at = NOW() WHERE uuid = $1 AND deleted_at IS NULL",
        )
        .bind(uuid)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
