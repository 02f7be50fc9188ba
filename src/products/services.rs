use std::str::FromStr;

use tracing::info;
use uuid::Uuid;

use super::{
    dto::{CreateProductRequest, UpdateProductRequest},
    repo_types::{NewProduct, Product, ProductStatus},
};
use crate::{
    error::ApiError,
    images::UploadedFile,
    state::AppState,
};

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_status(raw: &str) -> Result<ProductStatus, ApiError> {
    ProductStatus::from_str(raw).map_err(|e| ApiError::validation_with("Invalid request data", e))
}

fn check_price(price: f64) -> Result<f64, ApiError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(ApiError::validation_with(
            "Invalid request data",
            "price must be a number >= 0",
        ))
    }
}

fn check_stock(stock: i32) -> Result<i32, ApiError> {
    if stock >= 0 {
        Ok(stock)
    } else {
        Err(ApiError::validation_with(
            "Invalid request data",
            "stock must be >= 0",
        ))
    }
}

/// Validates a create request and stamps the creator.
pub fn new_product(req: CreateProductRequest, created_by: i64) -> Result<NewProduct, ApiError> {
    let name = non_blank(Some(req.name))
        .ok_or_else(|| ApiError::validation_with("Invalid request data", "name is required"))?;
    let category = non_blank(Some(req.category)).ok_or_else(|| {
        ApiError::validation_with("Invalid request data", "category is required")
    })?;
    let status = match non_blank(req.status) {
        Some(raw) => parse_status(&raw)?,
        None => ProductStatus::default(),
    };

    Ok(NewProduct {
        uuid: Uuid::new_v4(),
        name,
        description: req.description,
        price: check_price(req.price)?,
        stock: check_stock(req.stock)?,
        category,
        brand: req.brand,
        sku: non_blank(req.sku),
        status,
        created_by: Some(created_by),
    })
}

/// Applies the provided, non-empty fields of `req` onto `product`.
pub fn apply_update(
    product: &mut Product,
    req: UpdateProductRequest,
    updated_by: i64,
) -> Result<(), ApiError> {
    if let Some(name) = non_blank(req.name) {
        product.name = name;
    }
    if let Some(description) = req.description.filter(|d| !d.is_empty()) {
        product.description = description;
    }
    if let Some(price) = req.price {
        product.price = check_price(price)?;
    }
    if let Some(stock) = req.stock {
        product.stock = check_stock(stock)?;
    }
    if let Some(category) = non_blank(req.category) {
        product.category = category;
    }
    if let Some(brand) = req.brand.filter(|b| !b.is_empty()) {
        product.brand = brand;
    }
    if let Some(sku) = non_blank(req.sku) {
        product.sku = Some(sku);
    }
    if let Some(status) = non_blank(req.status) {
        product.status = parse_status(&status)?.as_str().to_string();
    }
    product.updated_by = Some(updated_by);
    Ok(())
}

/// Stores `file` as the product's image.
///
/// The row is pointed at the new file before the previous file is removed;
/// if the row update fails the new file is deleted again.
pub async fn attach_image(
    state: &AppState,
    product: &Product,
    user_id: i64,
    file: UploadedFile,
) -> Result<Product, ApiError> {
    let repo = state.products.clone();
    let uuid = product.uuid;

    let (stored, updated) = state
        .images
        .replace(&file, product.image_path.as_deref(), |stored| async move {
            repo.set_image(uuid, &stored.path, &stored.url, user_id)
                .await
                .map_err(anyhow::Error::from)
        })
        .await?;

    info!(product = %uuid, path = %stored.path, "product image updated");
    Ok(updated)
}
