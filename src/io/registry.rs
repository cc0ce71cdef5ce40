use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{unrecognized_options, Configuration, StorageTarget},
    error::{DbResult, Error},
};

/// Identifies one shared database handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleKey {
    pub target: StorageTarget,
    pub config: Configuration,
}

impl HandleKey {
    pub fn new(target: StorageTarget, config: Configuration) -> HandleKey {
        HandleKey { target, config }
    }

    /// Opens a new native database for this key.
    ///
    /// Options the engine does not recognize are logged and dropped, and the
    /// open is retried without them.
    fn open(&self) -> DbResult<duckdb::Connection> {
        let mut config = self.config.clone();
        loop {
            let native = config.to_native()?;
            let opened = match &self.target {
                StorageTarget::InMemory => duckdb::Connection::open_in_memory_with_flags(native),
                StorageTarget::File(path) => duckdb::Connection::open_with_flags(path, native),
            };
            let error = match opened {
                Ok(database) => return Ok(database),
                Err(error) => error,
            };

            let message = error.to_string();
            let before = config.len();
            for option in unrecognized_options(&message) {
                if config.remove(option).is_some() {
                    warn!(option, "skipping unrecognized configuration option");
                }
            }
            if config.len() == before {
                return Err(Error::EngineInitialization {
                    target: self.target.to_string(),
                    message,
                });
            }
        }
    }
}

/// Identifies one logical connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// A registered connection: its id plus a private native connection derived
/// from the shared handle.
pub(crate) struct Lease {
    pub id: ConnectionId,
    pub native: duckdb::Connection,
}

struct Handle {
    /// Root connection owning the native database.
    database: duckdb::Connection,
    live: HashSet<ConnectionId>,
}

#[derive(Default)]
struct State {
    handles: HashMap<HandleKey, Handle>,
    next_id: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    created: AtomicU64,
}

/// Shares one native database handle per [`HandleKey`] between connections.
///
/// A handle is opened by the first connection for its key and dropped once the
/// last of its connections is released. All methods block and are meant to be
/// called from worker threads.
#[derive(Clone, Default)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a new connection for `key`, opening the handle if needed.
    ///
    /// On failure nothing is registered.
    #[instrument(skip_all, fields(target = %key.target))]
    pub(crate) fn acquire(&self, key: &HandleKey) -> DbResult<Lease> {
        let mut state = self.shared.state.lock();
        let id = ConnectionId(state.next_id);

        let native = match state.handles.get_mut(key) {
            Some(handle) => {
                let native = derive(&handle.database, key)?;
                handle.live.insert(id);
                native
            }
            None => {
                let database = key.open()?;
                let native = derive(&database, key)?;
                state.handles.insert(
                    key.clone(),
                    Handle {
                        database,
                        live: HashSet::from([id]),
                    },
                );
                self.shared.created.fetch_add(1, Ordering::AcqRel);
                info!("opened database handle");
                native
            }
        };

        state.next_id += 1;
        debug!(?id, "registered connection");
        Ok(Lease { id, native })
    }

    /// Unregisters a connection, dropping its handle when it was the last one.
    ///
    /// The connection's native context must already be closed.
    #[instrument(skip_all, fields(target = %key.target, ?id))]
    pub(crate) fn release(&self, key: &HandleKey, id: ConnectionId) {
        let mut state = self.shared.state.lock();
        let Some(handle) = state.handles.get_mut(key) else {
            return;
        };
        handle.live.remove(&id);
        if handle.live.is_empty() {
            state.handles.remove(key);
            info!("closed database handle");
        } else {
            debug!(remaining = handle.live.len(), "released connection");
        }
    }

    /// Number of open database handles.
    pub fn handle_count(&self) -> usize {
        self.shared.state.lock().handles.len()
    }

    /// Total number of handles ever opened.
    pub fn handles_created(&self) -> u64 {
        self.shared.created.load(Ordering::Acquire)
    }

    /// Number of live connections across every handle.
    pub fn connection_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.handles.values().map(|h| h.live.len()).sum()
    }
}

/// Settings applied to every derived connection. Lossless export keeps UUID
/// and 128-bit integer columns distinguishable in the Arrow results.
const CONNECTION_SETTINGS: &str = "SET arrow_lossless_conversion = true";

/// Derives a private native connection from a database handle.
fn derive(database: &duckdb::Connection, key: &HandleKey) -> DbResult<duckdb::Connection> {
    let init_error = |error: duckdb::Error| Error::EngineInitialization {
        target: key.target.to_string(),
        message: error.to_string(),
    };
    let native = database.try_clone().map_err(init_error)?;
    native.execute_batch(CONNECTION_SETTINGS).map_err(init_error)?;
    Ok(native)
}
