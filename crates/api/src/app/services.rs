//! Service wiring: role store selection, caching, and the permission checker.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use risknexus_auth::PermissionChecker;
use risknexus_infra::cache::SweeperHandle;
use risknexus_infra::config::AppConfig;
use risknexus_infra::roles::{
    CachedRoleRepository, InMemoryRoleRepository, PostgresRoleRepository, RoleRepository,
};

/// Cached role store shared by handlers and the permission checker.
pub type RoleStore = CachedRoleRepository<Arc<dyn RoleRepository>>;

pub struct AppServices {
    /// All role reads and writes go through here so the cache stays coherent.
    pub roles: Arc<RoleStore>,
    pub checker: PermissionChecker<Arc<RoleStore>>,
    sweeper: Option<SweeperHandle>,
}

impl AppServices {
    /// Wrap `repo` in the permission cache. Does not start a sweeper.
    pub fn new(repo: Arc<dyn RoleRepository>, config: &AppConfig) -> Self {
        let roles = Arc::new(CachedRoleRepository::new(repo, config.role_cache_ttl));
        let checker = PermissionChecker::new(Arc::clone(&roles));
        Self {
            roles,
            checker,
            sweeper: None,
        }
    }

    /// Start the background purge if configured. Requires a tokio runtime.
    pub fn with_sweeper(mut self, config: &AppConfig) -> Self {
        self.sweeper = config
            .cache_sweep_interval
            .map(|every| self.roles.spawn_sweeper(every));
        self
    }
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("role_cache_ttl", &self.roles.ttl())
            .field("sweeper", &self.sweeper.is_some())
            .finish()
    }
}

/// Build services from config: Postgres when `DATABASE_URL` is set, else in-memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let repo: Arc<dyn RoleRepository> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let repo = PostgresRoleRepository::new(pool);
            repo.ensure_schema().await?;
            tracing::info!("using postgres role store");
            Arc::new(repo)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory role store");
            Arc::new(InMemoryRoleRepository::new())
        }
    };

    tracing::info!(
        ttl_secs = config.role_cache_ttl.as_secs(),
        sweep_secs = config.cache_sweep_interval.map(|d| d.as_secs()),
        "role permission cache configured"
    );
    Ok(AppServices::new(repo, config).with_sweeper(config))
}
