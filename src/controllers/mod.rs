pub mod events;
pub mod payments;
pub mod users;
pub mod wallet;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(events::routes())
        .merge(payments::routes())
        .merge(users::routes())
        .merge(wallet::routes())
}
