/// API routes and handlers
pub mod admin;
pub mod blob;
pub mod form;
pub mod general;
pub mod health;
pub mod middleware;
pub mod users;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(general::routes())
        .merge(users::routes())
        .merge(admin::routes())
        .merge(blob::routes())
        .merge(health::routes())
}
