use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, instrument};

use crate::errors;
use crate::plugin::PluginRegistry;
use crate::schema::SchemaRegistry;
use crate::session::Session;
use crate::sql::ViewCatalog;
use crate::store::Store;
use crate::transaction::Transaction;
use crate::LixError;

/// Shared handle to one in-process lix. Cheap to clone; all clones see the
/// same store.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: RwLock<Store>,
    plugins: PluginRegistry,
    catalog: Mutex<Option<(u64, Arc<ViewCatalog>)>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("plugins", &self.inner.plugins)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub(crate) fn from_store(store: Store, plugins: PluginRegistry) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: RwLock::new(store),
                plugins,
                catalog: Mutex::new(None),
            }),
        }
    }

    /// A session starting on the persisted default active version.
    pub fn session(&self) -> Result<Session, LixError> {
        let active_version_id =
            self.read(|store| Ok(store.versions.default_active_version_id().to_string()))?;
        Ok(Session::new(self.clone(), active_version_id))
    }

    /// A session starting on `version_id`.
    pub fn session_for(&self, version_id: &str) -> Result<Session, LixError> {
        self.read(|store| store.versions.require(version_id).map(|_| ()))?;
        Ok(Session::new(self.clone(), version_id.to_string()))
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.inner.plugins
    }

    /// Runs `f` against a consistent view of the store.
    pub fn read<T>(&self, f: impl FnOnce(&Store) -> Result<T, LixError>) -> Result<T, LixError> {
        let guard = self
            .inner
            .store
            .read()
            .map_err(|_| errors::unknown_error("store lock poisoned"))?;
        f(&guard)
    }

    /// Runs `f` as one write transaction on `active_version_id`.
    ///
    /// Pending change sets are committed when `f` succeeds. On any error the
    /// store is restored to its state before the transaction.
    pub fn transaction<T>(
        &self,
        active_version_id: &str,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, LixError>,
    ) -> Result<T, LixError> {
        self.transaction_with_pointer(active_version_id, f)
            .map(|(value, _)| value)
    }

    /// Like [`Engine::transaction`], also returning the transaction's active
    /// version pointer after `f` ran.
    #[instrument(skip_all, fields(active_version_id = %active_version_id))]
    pub(crate) fn transaction_with_pointer<T>(
        &self,
        active_version_id: &str,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, LixError>,
    ) -> Result<(T, String), LixError> {
        let mut guard = self
            .inner
            .store
            .write()
            .map_err(|_| errors::unknown_error("store lock poisoned"))?;
        let savepoint = (*guard).clone();

        let result = {
            let mut tx = Transaction::new(self, &mut *guard, active_version_id.to_string());
            match f(&mut tx) {
                Ok(value) => tx.finish().map(|pointer| (value, pointer)),
                Err(error) => Err(error),
            }
        };

        if let Err(error) = &result {
            debug!(code = %error.code, "rolling back transaction");
            *guard = savepoint;
        }
        result
    }

    /// Row writes performed on the state cache since boot or import.
    pub fn cache_write_count(&self) -> Result<u64, LixError> {
        self.read(|store| Ok(store.cache.write_count()))
    }

    /// The view catalog for `schemas`, rebuilt only when the registered
    /// schemas changed.
    pub(crate) fn catalog(&self, schemas: &SchemaRegistry) -> Result<Arc<ViewCatalog>, LixError> {
        let fingerprint = schemas.fingerprint();
        let mut cached = self
            .inner
            .catalog
            .lock()
            .map_err(|_| errors::unknown_error("view catalog lock poisoned"))?;
        if let Some((cached_fingerprint, catalog)) = cached.as_ref() {
            if *cached_fingerprint == fingerprint {
                return Ok(Arc::clone(catalog));
            }
        }
        debug!(fingerprint, "rebuilding view catalog");
        let catalog = Arc::new(ViewCatalog::build(schemas)?);
        *cached = Some((fingerprint, Arc::clone(&catalog)));
        Ok(catalog)
    }
}
