use crate::config::AppConfig;
use crate::db::DbPool;
use crate::services::scheduling::Scheduler;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub scheduler: Scheduler,
}
