use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::{debug, instrument};

use super::dto::{ListUsersQuery, PublicUser, UserListResponse};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, AppQuery},
    pagination::PageParams,
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 10;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/all", get(list_users))
        .route("/user/:user_id", get(get_user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<PublicUser>, ApiError> {
    let user_id: i64 = user_id
        .trim()
        .parse()
        .map_err(|_| ApiError::validation("Invalid user_id"))?;

    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to retrieve user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    debug!(caller, user_id, "user profile served");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppQuery(q): AppQuery<ListUsersQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let page = PageParams::parse(q.page.as_deref(), q.page_size.as_deref(), DEFAULT_PAGE_SIZE);

    let (users, total) = state
        .users
        .list(page.size, page.offset())
        .await
        .map_err(|e| ApiError::from_repo(e, "Failed to retrieve users"))?;

    Ok(Json(UserListResponse {
        data: users.into_iter().map(PublicUser::from).collect(),
        page: page.page,
        page_size: page.size,
        total,
        total_pages: page.total_pages(total),
    }))
}
