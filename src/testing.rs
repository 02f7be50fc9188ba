//! In-memory repositories and a router harness for handler tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::password::hash_password,
    config::AppConfig,
    error::RepoError,
    products::{
        repo::ProductRepo,
        repo_types::{NewProduct, Product, ProductFilter},
    },
    state::AppState,
    users::{
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
};

pub const SEED_PASSWORD: &str = "password123";

#[derive(Default)]
pub struct MemoryUserRepo {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserRepo {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, new: NewUser) -> Result<User, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == new.email) {
            return Err(RepoError::Conflict("Email"));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: rows.len() as i64 + 1,
            uuid: new.uuid,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.id == id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), RepoError> {
        let rows = self.rows.lock().unwrap();
        let page = rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, rows.len() as i64))
    }
}

#[derive(Default)]
pub struct MemoryProductRepo {
    rows: Mutex<Vec<Product>>,
    fail_image_updates: AtomicBool,
}

fn matches(product: &Product, filter: &ProductFilter) -> bool {
    if product.deleted_at.is_some() {
        return false;
    }
    if filter.category.as_ref().is_some_and(|c| *c != product.category) {
        return false;
    }
    if filter.status.as_ref().is_some_and(|s| *s != product.status) {
        return false;
    }
    match &filter.search {
        Some(term) => {
            let term = term.to_lowercase();
            product.name.to_lowercase().contains(&term)
                || product.description.to_lowercase().contains(&term)
        }
        None => true,
    }
}

impl MemoryProductRepo {
    /// Rows ever created, deleted ones included.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Raw row lookup that ignores soft deletion.
    pub fn get(&self, uuid: Uuid) -> Option<Product> {
        let rows = self.rows.lock().unwrap();
        rows.iter().find(|p| p.uuid == uuid).cloned()
    }

    /// Makes every later `set_image` fail like a lost database connection.
    pub fn fail_image_updates(&self) {
        self.fail_image_updates.store(true, Ordering::SeqCst);
    }

    fn sku_taken(rows: &[Product], sku: Option<&str>, except: Uuid) -> bool {
        sku.is_some_and(|sku| {
            rows.iter()
                .any(|p| p.uuid != except && p.sku.as_deref() == Some(sku))
        })
    }
}

#[async_trait]
impl ProductRepo for MemoryProductRepo {
    async fn create(&self, new: NewProduct) -> Result<Product, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        if Self::sku_taken(&rows, new.sku.as_deref(), new.uuid) {
            return Err(RepoError::Conflict("SKU"));
        }
        let now = OffsetDateTime::now_utc();
        let product = Product {
            id: rows.len() as i64 + 1,
            uuid: new.uuid,
            name: new.name,
            description: new.description,
            price: new.price,
            stock: new.stock,
            category: new.category,
            brand: new.brand,
            sku: new.sku,
            image_path: None,
            image_url: None,
            status: new.status.as_str().to_string(),
            created_by: new.created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        rows.push(product.clone());
        Ok(product)
    }

    async fn find(&self, uuid: Uuid) -> Result<Option<Product>, RepoError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|p| p.uuid == uuid && p.deleted_at.is_none())
            .cloned())
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64), RepoError> {
        let rows = self.rows.lock().unwrap();
        let mut hits: Vec<Product> = rows.iter().filter(|p| matches(p, filter)).cloned().collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn categories(&self) -> Result<Vec<String>, RepoError> {
        let rows = self.rows.lock().unwrap();
        let mut categories: Vec<String> = rows
            .iter()
            .filter(|p| p.deleted_at.is_none() && !p.category.is_empty())
            .map(|p| p.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn update(&self, product: &Product) -> Result<Product, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        if Self::sku_taken(&rows, product.sku.as_deref(), product.uuid) {
            return Err(RepoError::Conflict("SKU"));
        }
        let row = rows
            .iter_mut()
            .find(|p| p.uuid == product.uuid && p.deleted_at.is_none())
            .ok_or(RepoError::NotFound("Product"))?;
        *row = Product {
            id: row.id,
            created_at: row.created_at,
            created_by: row.created_by,
            image_path: row.image_path.clone(),
            image_url: row.image_url.clone(),
            deleted_at: None,
            updated_at: OffsetDateTime::now_utc(),
            ..product.clone()
        };
        Ok(row.clone())
    }

    async fn set_image(
        &self,
        uuid: Uuid,
        path: &str,
        url: &str,
        updated_by: i64,
    ) -> Result<Product, RepoError> {
        if self.fail_image_updates.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|p| p.uuid == uuid && p.deleted_at.is_none())
            .ok_or(RepoError::NotFound("Product"))?;
        row.image_path = Some(path.to_string());
        row.image_url = Some(url.to_string());
        row.updated_by = Some(updated_by);
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn soft_delete(&self, uuid: Uuid) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|p| p.uuid == uuid && p.deleted_at.is_none())
        {
            Some(row) => {
                row.deleted_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Full router over in-memory repositories and a throwaway upload root.
pub struct TestApp {
    pub state: AppState,
    pub users: Arc<MemoryUserRepo>,
    pub products: Arc<MemoryProductRepo>,
    router: Router,
    _tmp: TempDir,
}

pub fn test_config(upload_root: &str) -> AppConfig {
    let vars: HashMap<&str, &str> = [
        ("DATABASE_URL", "postgres://unused/storefront"),
        ("JWT_SECRET", "test-secret"),
        ("UPLOAD_ROOT", upload_root),
    ]
    .into_iter()
    .collect();
    AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap()
}

/// Argon2 is slow in debug builds; seeded users share one hash.
fn seed_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(SEED_PASSWORD).unwrap())
}

impl TestApp {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path().to_str().unwrap());
        let users = Arc::new(MemoryUserRepo::default());
        let products = Arc::new(MemoryProductRepo::default());
        let state = AppState::from_parts(config, users.clone(), products.clone());
        std::fs::create_dir_all(state.images.dir()).unwrap();
        let router = build_app(state.clone());
        Self {
            state,
            users,
            products,
            router,
            _tmp: tmp,
        }
    }

    pub async fn send_raw(&self, req: Request<Body>) -> (StatusCode, Bytes) {
        send_raw(&self.router, req).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        send(&self.router, req).await
    }

    pub fn token(&self, user_id: i64) -> String {
        self.state.jwt.issue(user_id).unwrap()
    }

    /// Inserts a user whose password is [`SEED_PASSWORD`] and returns its id.
    pub async fn seed_user(&self, name: &str, email: &str) -> i64 {
        self.users
            .create(NewUser {
                uuid: Uuid::new_v4(),
                name: name.to_string(),
                email: email.to_string(),
                password_hash: seed_hash().to_string(),
            })
            .await
            .unwrap()
            .id
    }

    /// Number of files in the product image directory.
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.state.images.dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub async fn send_raw(router: &Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes)
}

/// Sends `req` and decodes the body as JSON (`Null` when empty).
pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(router, req).await;
    if bytes.is_empty() {
        return (status, Value::Null);
    }
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn authed(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn raw_json(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
