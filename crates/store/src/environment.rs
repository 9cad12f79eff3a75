//! Store lookup by configuration.

use crate::config::StoreConfig;
use crate::store::{Store, StoreShared};
use eddy_core::{Error, Result, StoreProvider};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Opens stores by configuration and shares them while they are in use.
///
/// Opening the same identifier twice returns handles to the same store as
/// long as a handle from the first open is still alive.
pub struct Environment {
    default_config: StoreConfig,
    stores: Mutex<HashMap<String, Weak<StoreShared>>>,
}

impl Environment {
    /// Creates an environment whose default store uses `default_config`.
    pub fn new(default_config: StoreConfig) -> Self {
        Self {
            default_config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the default configuration.
    pub fn default_config(&self) -> &StoreConfig {
        &self.default_config
    }

    /// Opens the store described by `config`.
    ///
    /// Fails with `SchemaMismatch` if the store is already open with
    /// different object types.
    pub fn open(&self, config: &StoreConfig) -> Result<Store> {
        let mut stores = self.stores.lock();
        if let Some(shared) = stores.get(config.identifier()).and_then(Weak::upgrade) {
            if !shared.is_closed() {
                if !shared.config().same_schema(config) {
                    return Err(Error::schema_mismatch(config.identifier()));
                }
                return Ok(Store::from_shared(shared));
            }
        }

        let shared = StoreShared::new(config.clone());
        stores.insert(config.identifier().to_string(), Arc::downgrade(&shared));
        stores.retain(|_, store| store.strong_count() > 0);
        debug!(store = config.identifier(), open = stores.len(), "opened store");
        Ok(Store::from_shared(shared))
    }

    /// Opens the default store.
    pub fn open_default(&self) -> Result<Store> {
        self.open(&self.default_config)
    }

    /// Returns a provider that opens `config` on demand.
    pub fn provider(self: &Arc<Self>, config: StoreConfig) -> ConfiguredStore {
        ConfiguredStore {
            environment: self.clone(),
            config,
        }
    }
}

impl StoreProvider for Environment {
    type Store = Store;

    fn provide(&self) -> Result<Store> {
        self.open_default()
    }
}

/// A store opened lazily from a fixed configuration.
pub struct ConfiguredStore {
    environment: Arc<Environment>,
    config: StoreConfig,
}

impl ConfiguredStore {
    /// Returns the configuration this provider opens.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl StoreProvider for ConfiguredStore {
    type Store = Store;

    fn provide(&self) -> Result<Store> {
        self.environment.open(&self.config)
    }
}
