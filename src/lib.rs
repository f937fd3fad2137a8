use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;

pub mod config;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod rank;
pub mod router;
pub mod routes;
pub mod utils;

pub use router::create_router;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
}
