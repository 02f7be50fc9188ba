use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        CreateProductRequest, DataResponse, ImageUploadResponse, ListProductsQuery,
        MessageResponse, PaginationMeta, ProductListResponse, ProductResponse,
        UpdateProductRequest,
    },
    repo_types::{Product, ProductFilter, ProductStatus},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, AppJson, AppQuery},
    images::UploadedFile,
    pagination::PageParams,
    state::AppState,
};

/// Multipart bodies may exceed the image cap so oversize files get a JSON 400.
const UPLOAD_BODY_LIMIT: usize = 20 * 1024 * 1024;
const DEFAULT_PAGE_SIZE: i64 = 10;

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/categories", get(list_categories))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route(
            "/products/:id/image",
            post(upload_image).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
}

fn parse_product_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid product ID"))
}

async fn find_product(state: &AppState, uuid: Uuid) -> Result<Product, ApiError> {
    state
        .products
        .find(uuid)
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to retrieve product"))?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<ListProductsQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let page = PageParams::parse(q.page.as_deref(), q.limit.as_deref(), DEFAULT_PAGE_SIZE);
    let filter = ProductFilter {
        category: q.category.filter(|c| !c.is_empty()),
        // An explicit empty status lists every status.
        status: match q.status {
            None => Some(ProductStatus::Active.as_str().to_string()),
            Some(s) if s.is_empty() => None,
            Some(s) => Some(s),
        },
        search: q.search.filter(|s| !s.is_empty()),
    };

    let (products, total) = state
        .products
        .list(&filter, page.size, page.offset())
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to retrieve products"))?;

    Ok(Json(ProductListResponse {
        message: "Products retrieved successfully",
        data: products.into_iter().map(ProductResponse::from).collect(),
        pagination: PaginationMeta {
            page: page.page,
            limit: page.size,
            total,
            total_pages: page.total_pages(total),
        },
    }))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<ProductResponse>>, ApiError> {
    let product = find_product(&state, parse_product_id(&id)?).await?;
    Ok(Json(DataResponse {
        message: "Product retrieved successfully",
        data: product.into(),
    }))
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<String>>>, ApiError> {
    let categories = state
        .products
        .categories()
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to retrieve categories"))?;
    Ok(Json(DataResponse {
        message: "Categories retrieved successfully",
        data: categories,
    }))
}

#[instrument(skip(state, req))]
pub async fn create_product(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<DataResponse<ProductResponse>>), ApiError> {
    let new = services::new_product(req, user_id)?;
    let product = state
        .products
        .create(new)
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to create product"))?;

    info!(product = %product.uuid, user_id, "product created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            message: "Product created successfully",
            data: product.into(),
        }),
    ))
}

#[instrument(skip(state, req))]
pub async fn update_product(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateProductRequest>,
) -> Result<Json<DataResponse<ProductResponse>>, ApiError> {
    let mut product = find_product(&state, parse_product_id(&id)?).await?;
    services::apply_update(&mut product, req, user_id)?;

    let product = state
        .products
        .update(&product)
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to update product"))?;

    info!(product = %product.uuid, user_id, "product updated");
    Ok(Json(DataResponse {
        message: "Product updated successfully",
        data: product.into(),
    }))
}

#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let product = find_product(&state, parse_product_id(&id)?).await?;

    let deleted = state
        .products
        .soft_delete(product.uuid)
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to delete product"))?;
    if !deleted {
        return Err(ApiError::NotFound("Product not found".into()));
    }

    if let Some(path) = product.image_path.as_deref() {
        state.images.delete_best_effort(path).await;
    }

    info!(product = %product.uuid, user_id, "product deleted");
    Ok(Json(MessageResponse {
        message: "Product deleted successfully",
    }))
}

/// Pulls the `image` field out of a multipart body.
async fn read_image_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        return Ok(Some(UploadedFile::new(file_name, data)));
    }
    Ok(None)
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    let product = find_product(&state, parse_product_id(&id)?).await?;

    let mut multipart = multipart
        .map_err(|e| ApiError::validation_with("Invalid multipart payload", e.body_text()))?;
    let file = read_image_field(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::validation("No image file provided"))?;

    let product = services::attach_image(&state, &product, user_id, file).await?;

    Ok(Json(ImageUploadResponse {
        message: "Image uploaded successfully",
        image_url: product.image_url.unwrap_or_default(),
    }))
}
