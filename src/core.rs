//! Core QueryDeck functionality
//!
//! `QueryDeck` is the explicit context repositories are built from. It owns
//! the entity metadata registry and one router registry per backend kind, so
//! repositories bound to equal settings share one connection.

use config::{AppConfig, RelationalSettings, SearchSettings};
use query_engine::{
    ConnectionRouter, Dialect, Entity, HttpSearchClient, MapperRegistry, PgExecutor, QueryError, RouterRegistry,
    SearchClient, SqlExecutor,
};
use std::sync::Arc;
use tracing::info;

use crate::errors::QueryDeckError;
use crate::repository::{RelationalRepository, SearchRepository};

/// Builds the executor for one relational URL of a configuration
pub type SqlExecutorFactory =
    Arc<dyn Fn(&RelationalSettings, &str) -> Result<Arc<dyn SqlExecutor>, QueryError> + Send + Sync>;

/// Builds the client for one search configuration
pub type SearchClientFactory = Arc<dyn Fn(&SearchSettings) -> Result<Arc<dyn SearchClient>, QueryError> + Send + Sync>;

/// Default relational executors: a lazily connected pool for Postgres.
///
/// The pool is created without connecting; it must be used inside a tokio runtime.
pub fn default_sql_executor(settings: &RelationalSettings, url: &str) -> Result<Arc<dyn SqlExecutor>, QueryError> {
    match settings.dialect {
        Dialect::Postgres => Ok(Arc::new(PgExecutor::connect_lazy(url, settings.max_connections)?)),
        other => Err(QueryError::validation(format!(
            "no built-in executor for the {} dialect; supply one with QueryDeck::with_factories",
            other
        ))),
    }
}

pub fn default_search_client(settings: &SearchSettings) -> Result<Arc<dyn SearchClient>, QueryError> {
    Ok(Arc::new(HttpSearchClient::new(settings)?))
}

/// Entry point owning the registries every repository draws from
pub struct QueryDeck {
    config: AppConfig,
    mappers: Arc<MapperRegistry>,
    relational_routers: RouterRegistry<RelationalSettings, dyn SqlExecutor>,
    search_routers: RouterRegistry<SearchSettings, dyn SearchClient>,
    sql_factory: SqlExecutorFactory,
    search_factory: SearchClientFactory,
}

impl std::fmt::Debug for QueryDeck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDeck")
            .field("relational_configs", &self.config.relational.keys().collect::<Vec<_>>())
            .field("search_configs", &self.config.search.keys().collect::<Vec<_>>())
            .field("relational_routers", &self.relational_routers.len())
            .field("search_routers", &self.search_routers.len())
            .field("entities", &self.mappers.len())
            .finish()
    }
}

impl QueryDeck {
    /// Context with the built-in executors
    pub fn new(config: AppConfig) -> Result<Self, QueryDeckError> {
        Self::with_factories(config, Arc::new(default_sql_executor), Arc::new(default_search_client))
    }

    /// Load configuration from `.env` and the configuration file
    pub fn from_env() -> Result<Self, QueryDeckError> {
        Self::new(AppConfig::load()?)
    }

    /// Context whose connections come from the given factories.
    ///
    /// Each factory runs at most once per distinct settings value.
    pub fn with_factories(
        config: AppConfig,
        sql_factory: SqlExecutorFactory,
        search_factory: SearchClientFactory,
    ) -> Result<Self, QueryDeckError> {
        config.validate()?;
        Ok(Self {
            config,
            mappers: Arc::new(MapperRegistry::new()),
            relational_routers: RouterRegistry::new(),
            search_routers: RouterRegistry::new(),
            sql_factory,
            search_factory,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mappers(&self) -> &Arc<MapperRegistry> {
        &self.mappers
    }

    /// Router for the named relational configuration, built on first use
    pub fn relational_router(&self, name: &str) -> Result<Arc<ConnectionRouter<dyn SqlExecutor>>, QueryDeckError> {
        let settings = self.config.relational(name)?;
        let router = self.relational_routers.get_or_register(settings, |settings| {
            info!(config = name, dialect = %settings.dialect, "Creating relational connection");
            let write = (self.sql_factory)(settings, &settings.write_url)?;
            Ok(match settings.read_url.as_deref() {
                Some(read_url) if read_url != settings.write_url => {
                    ConnectionRouter::new((self.sql_factory)(settings, read_url)?, write)
                }
                _ => ConnectionRouter::single(write),
            })
        })?;
        Ok(router)
    }

    /// Router for the named search configuration, built on first use
    pub fn search_router(&self, name: &str) -> Result<Arc<ConnectionRouter<dyn SearchClient>>, QueryDeckError> {
        let settings = self.config.search(name)?;
        let router = self.search_routers.get_or_register(settings, |settings| {
            info!(
                config = name,
                cluster = %settings.cluster_name,
                nodes = settings.server_addresses.len(),
                "Creating search client"
            );
            Ok(ConnectionRouter::single((self.search_factory)(settings)?))
        })?;
        Ok(router)
    }

    /// Repository for `T` bound to the named relational configuration
    pub fn relational<T: Entity>(&self, name: &str) -> Result<RelationalRepository<T>, QueryDeckError> {
        let mapper = self.mappers.mapper::<T>()?;
        // Fail on a missing table before any connection is built
        mapper.descriptor().table()?;
        let dialect = self.config.relational(name)?.dialect;
        let router = self.relational_router(name)?;
        Ok(RelationalRepository::new(router, mapper, dialect)?)
    }

    /// Repository for `T` bound to the named search configuration
    pub fn search<T: Entity>(&self, name: &str) -> Result<SearchRepository<T>, QueryDeckError> {
        let mapper = self.mappers.mapper::<T>()?;
        mapper.descriptor().document()?;
        let router = self.search_router(name)?;
        Ok(SearchRepository::new(router, mapper)?)
    }
}
