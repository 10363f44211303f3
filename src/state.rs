use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::db::{self, PgTaskStore, PgUserStore};
use crate::mail::{Mailer, SendGridMailer};
use crate::memory::MemoryStore;
use crate::storage::{TaskStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let (users, tasks) = match config.database_url.as_deref() {
            Some(url) => {
                let pool = db::connect(&config, url).await?;
                info!("using postgres store");
                (
                    Arc::new(PgUserStore::new(pool.clone())) as Arc<dyn UserStore>,
                    Arc::new(PgTaskStore::new(pool)) as Arc<dyn TaskStore>,
                )
            }
            None => {
                warn!("DATABASE_URL not set; data lives in memory and is lost on restart");
                let store = Arc::new(MemoryStore::default());
                (
                    store.clone() as Arc<dyn UserStore>,
                    store as Arc<dyn TaskStore>,
                )
            }
        };

        let mailer = Arc::new(SendGridMailer::new(&config.mail)) as Arc<dyn Mailer>;
        Ok(Self::from_parts(config, users, tasks, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        tasks: Arc<dyn TaskStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config,
            users,
            tasks,
            mailer,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(Arc::new(crate::mail::testing::RecordingMailer::default()))
    }

    #[cfg(test)]
    pub fn fake_with(mailer: Arc<dyn Mailer>) -> Self {
        use crate::config::{JwtConfig, MailConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            mail: MailConfig {
                sendgrid_api_key: "fake".into(),
                from: "test@taskmanagr.app".into(),
            },
        });
        let store = Arc::new(MemoryStore::default());
        Self::from_parts(config, store.clone(), store, mailer)
    }
}
