//! Read/write connection routing and the once-only connection registry

use crate::errors::QueryError;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Read and write targets of one named configuration.
///
/// Without a read replica both routes return the same connection.
pub struct ConnectionRouter<C: ?Sized> {
    read: Arc<C>,
    write: Arc<C>,
}

impl<C: ?Sized> ConnectionRouter<C> {
    pub fn new(read: Arc<C>, write: Arc<C>) -> Self {
        Self { read, write }
    }

    /// Router that sends reads and writes to one connection
    pub fn single(connection: Arc<C>) -> Self {
        Self {
            read: Arc::clone(&connection),
            write: connection,
        }
    }

    pub fn read_route(&self) -> &Arc<C> {
        &self.read
    }

    pub fn write_route(&self) -> &Arc<C> {
        &self.write
    }

    pub fn is_split(&self) -> bool {
        !Arc::ptr_eq(&self.read, &self.write)
    }
}

impl<C: ?Sized> Clone for ConnectionRouter<C> {
    fn clone(&self) -> Self {
        Self {
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<C: ?Sized> fmt::Debug for ConnectionRouter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRouter")
            .field("split", &self.is_split())
            .finish()
    }
}

/// Routers keyed by configuration identity.
///
/// A router is built at most once per key, even under concurrent first use.
/// Lookups take a shared lock; only construction is exclusive. Published
/// routers are never replaced or evicted.
pub struct RouterRegistry<K, C: ?Sized> {
    routers: RwLock<HashMap<K, Arc<ConnectionRouter<C>>>>,
}

impl<K, C: ?Sized> Default for RouterRegistry<K, C> {
    fn default() -> Self {
        Self {
            routers: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, C: ?Sized> RouterRegistry<K, C>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<Arc<ConnectionRouter<C>>> {
        self.routers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Router for `key`, calling `factory` only if none is registered yet.
    ///
    /// Construction runs under the exclusive lock so concurrent callers for
    /// the same key wait and then share the first router. A failing factory
    /// registers nothing.
    pub fn get_or_register<F>(&self, key: &K, factory: F) -> Result<Arc<ConnectionRouter<C>>, QueryError>
    where
        F: FnOnce(&K) -> Result<ConnectionRouter<C>, QueryError>,
    {
        if let Some(router) = self.get(key) {
            return Ok(router);
        }

        let mut routers = self.routers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(router) = routers.get(key) {
            return Ok(Arc::clone(router));
        }
        let router = Arc::new(factory(key)?);
        routers.insert(key.clone(), Arc::clone(&router));
        info!("Registered connection router ({} configured)", routers.len());
        Ok(router)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.routers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.routers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, C: ?Sized> fmt::Debug for RouterRegistry<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.routers.read().map(|r| r.len()).unwrap_or_default();
        f.debug_struct("RouterRegistry").field("routers", &len).finish()
    }
}
