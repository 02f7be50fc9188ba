use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    auth::jwt::JwtKeys,
    config::AppConfig,
    images::ImageStore,
    products::repo::{PgProductRepo, ProductRepo},
    users::repo::{PgUserRepo, UserRepo},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub products: Arc<dyn ProductRepo>,
    pub images: Arc<ImageStore>,
    pub jwt: JwtKeys,
}

impl AppState {
    /// Connects to Postgres, applies migrations and prepares the upload directory.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("failed to run migrations")?;
        tracing::info!("migrations applied");

        let state = Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgProductRepo::new(db)),
        );
        state
            .images
            .init_dir()
            .await
            .context("failed to create upload directory")?;

        Ok(state)
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserRepo>,
        products: Arc<dyn ProductRepo>,
    ) -> Self {
        let images = Arc::new(ImageStore::new(
            config.uploads.products_dir(),
            config.uploads.products_url(),
        ));
        let jwt = JwtKeys::new(&config.jwt);
        Self {
            config: Arc::new(config),
            users,
            products,
            images,
            jwt,
        }
    }
}
