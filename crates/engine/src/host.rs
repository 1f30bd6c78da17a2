//! Host stores and the host manager
//!
//! A [`HostStore`] owns everything recorded for one monitored host: the data
//! and index channels, the catalog and a small persisted descriptor. Hosts
//! move between `Closed` and `Open`; every operation on a closed (or
//! disabled) host fails with [`StoreError::StoreClosed`] rather than
//! touching half-initialized state.
//!
//! Layout under the host's root directory:
//!
//! | path          | contents                       |
//! |---------------|--------------------------------|
//! | `host.json`   | descriptor (addr, budget, ...) |
//! | `catalog.dat` | catalog snapshot               |
//! | `tdat/`       | data channel segments          |
//! | `tidx/`       | index channel segments         |

use crate::catalog::Catalog;
use crate::channel::{ChannelRole, TraceChannel};
use crate::rebuild::{rebuild, RebuildStats};
use crate::retention::RetentionCoordinator;
use crate::search::execute_search;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracevault_core::search_types::{MethodStats, RankBy, SearchDirection};
use tracevault_core::{
    SearchQuery, SearchResult, StoreConfig, StoreError, StoreResult, SymbolRegistry, TraceMatcher,
    TraceRecord, TraceSummary,
};
use tracing::{info, warn};

const DESCRIPTOR_FILE: &str = "host.json";
const CATALOG_FILE: &str = "catalog.dat";
const DATA_DIR: &str = "tdat";
const INDEX_DIR: &str = "tidx";

/// Persisted per-host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// Address the host's agent connects from.
    pub addr: String,
    /// Disabled hosts reject ingest and queries but keep their data.
    pub enabled: bool,
    /// Retained-bytes budget for the data channel.
    pub max_size: u64,
    /// Operator comment.
    pub comment: String,
}

impl HostDescriptor {
    fn new(max_size: u64) -> Self {
        Self {
            addr: String::new(),
            enabled: true,
            max_size,
            comment: String::new(),
        }
    }
}

struct OpenState {
    data: TraceChannel,
    index: TraceChannel,
    catalog: Arc<Catalog>,
}

/// Trace storage for one monitored host.
pub struct HostStore {
    name: String,
    root: PathBuf,
    config: StoreConfig,
    symbols: Arc<dyn SymbolRegistry>,
    descriptor: Mutex<HostDescriptor>,
    inner: RwLock<Option<OpenState>>,
}

impl HostStore {
    /// Open (or create) the store for `name` under `root`.
    pub fn open(
        name: &str,
        root: &Path,
        config: StoreConfig,
        symbols: Arc<dyn SymbolRegistry>,
    ) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        let descriptor = Self::load_descriptor(root, &config)?;

        let store = Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            config,
            symbols,
            descriptor: Mutex::new(descriptor),
            inner: RwLock::new(None),
        };
        store.open_channels()?;
        info!(host = name, root = %root.display(), "host store opened");
        Ok(store)
    }

    fn load_descriptor(root: &Path, config: &StoreConfig) -> StoreResult<HostDescriptor> {
        let path = root.join(DESCRIPTOR_FILE);
        if path.exists() {
            let json = fs::read_to_string(&path)?;
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                what: "host descriptor",
                detail: e.to_string(),
            })
        } else {
            let descriptor = HostDescriptor::new(config.max_size);
            Self::write_descriptor(root, &descriptor)?;
            Ok(descriptor)
        }
    }

    fn write_descriptor(root: &Path, descriptor: &HostDescriptor) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(descriptor).map_err(|e| StoreError::Corrupt {
            what: "host descriptor",
            detail: e.to_string(),
        })?;
        fs::write(root.join(DESCRIPTOR_FILE), json)?;
        Ok(())
    }

    /// Build channels, wire the retention coordinator and load (or recover)
    /// the catalog.
    fn open_channels(&self) -> StoreResult<()> {
        let max_size = self.descriptor.lock().max_size;
        let data = TraceChannel::open(
            &self.root.join(DATA_DIR),
            ChannelRole::Data,
            max_size,
            self.config.file_size,
        )?;

        let catalog_path = self.root.join(CATALOG_FILE);
        let index_dir = self.root.join(INDEX_DIR);
        let loaded = match Catalog::load(&catalog_path) {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                // Missing or unreadable snapshot: the data channel is the
                // source of truth, rescan it into a fresh index.
                if catalog_path.exists() {
                    warn!(host = %self.name, error = %e, "catalog snapshot unreadable, rebuilding");
                } else {
                    info!(host = %self.name, "no catalog snapshot, rebuilding from data channel");
                }
                if index_dir.exists() {
                    fs::remove_dir_all(&index_dir)?;
                }
                None
            }
        };

        // The index channel shares the host budget: its bytes normally fall
        // to the retention cascade, but the size budget is the backstop when
        // a trim leaves no surviving catalog entry to cascade from.
        let index =
            TraceChannel::open(&index_dir, ChannelRole::Index, max_size, self.config.file_size)?;

        let catalog = match loaded {
            Some(catalog) => Arc::new(catalog),
            None => {
                let catalog = Arc::new(Catalog::new());
                rebuild(&self.root.join(DATA_DIR), &index, &catalog)?;
                catalog.save(&catalog_path)?;
                catalog
            }
        };

        let coordinator = Arc::new(RetentionCoordinator::new(
            Arc::clone(&catalog),
            index.store(),
        ));
        data.store().lock().add_listener(coordinator);

        *self.inner.write() = Some(OpenState {
            data,
            index,
            catalog,
        });
        Ok(())
    }

    /// Host name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the persisted descriptor.
    pub fn descriptor(&self) -> HostDescriptor {
        self.descriptor.lock().clone()
    }

    /// Whether the store is open.
    pub fn is_open(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Number of retained traces.
    pub fn trace_count(&self) -> usize {
        self.inner
            .read()
            .as_ref()
            .map(|s| s.catalog.len())
            .unwrap_or(0)
    }

    fn closed(&self) -> StoreError {
        StoreError::StoreClosed(self.name.clone())
    }

    /// Run `f` against the open state, failing fast when the store is
    /// closed or disabled.
    fn with_open<T>(&self, f: impl FnOnce(&OpenState) -> StoreResult<T>) -> StoreResult<T> {
        if !self.descriptor.lock().enabled {
            return Err(self.closed());
        }
        let guard = self.inner.read();
        let state = guard.as_ref().ok_or_else(|| self.closed())?;
        f(state)
    }

    /// Ingest one trace tree.
    ///
    /// Write order is data tree, then index root, then catalog row; a crash
    /// between steps leaves at most orphaned channel bytes, which the next
    /// rebuild reconciles.
    pub fn ingest(&self, rec: &TraceRecord) -> StoreResult<u64> {
        self.with_open(|state| {
            let data_chunk = state.data.write(rec)?;
            let index_chunk = state.index.write(rec)?;
            state
                .catalog
                .insert(TraceSummary::from_record(rec, data_chunk, index_chunk))?;
            Ok(data_chunk.offset)
        })
    }

    /// Execute a paginated search.
    pub fn search(
        &self,
        query: &SearchQuery,
        matcher: Option<&dyn TraceMatcher>,
    ) -> StoreResult<SearchResult> {
        self.with_open(|state| {
            execute_search(
                &state.catalog,
                &state.data,
                &state.index,
                self.symbols.as_ref(),
                &self.config,
                query,
                matcher,
            )
        })
    }

    /// Catalog summary for the trace at `offset`.
    pub fn summary(&self, offset: u64) -> StoreResult<TraceSummary> {
        self.with_open(|state| {
            state
                .catalog
                .get(offset)
                .ok_or(StoreError::NotFound(offset))
        })
    }

    /// Subtree of the trace at `offset`, addressed by a `/`-separated
    /// child-index path, pruned below `min_method_time`.
    pub fn subtree(
        &self,
        offset: u64,
        path: &str,
        min_method_time: u64,
    ) -> StoreResult<TraceRecord> {
        self.with_open(|state| {
            let summary = state
                .catalog
                .get(offset)
                .ok_or(StoreError::NotFound(offset))?;
            state
                .data
                .read_subtree(summary.data_chunk, path, min_method_time)
        })
    }

    /// Per-method timing histogram of the trace at `offset`.
    pub fn method_histogram(
        &self,
        offset: u64,
        rank_by: RankBy,
        direction: SearchDirection,
    ) -> StoreResult<Vec<MethodStats>> {
        self.with_open(|state| {
            let summary = state
                .catalog
                .get(offset)
                .ok_or(StoreError::NotFound(offset))?;
            state.data.method_histogram(
                summary.data_chunk,
                rank_by,
                direction,
                self.symbols.as_ref(),
            )
        })
    }

    /// Flush channels and snapshot the catalog without closing.
    pub fn commit(&self) -> StoreResult<()> {
        self.with_open(|state| {
            state.data.flush()?;
            state.index.flush()?;
            state.catalog.save(&self.root.join(CATALOG_FILE))
        })
    }

    /// Close the store, snapshotting the catalog. Idempotent.
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.inner.write();
        if let Some(state) = guard.take() {
            state.data.flush()?;
            state.index.flush()?;
            if let Err(e) = state.catalog.save(&self.root.join(CATALOG_FILE)) {
                warn!(host = %self.name, error = %e, "catalog snapshot on close failed");
            }
            info!(host = %self.name, "host store closed");
        }
        Ok(())
    }

    /// Reopen a closed store. A no-op when already open.
    pub fn reopen(&self) -> StoreResult<()> {
        if self.inner.read().is_some() {
            return Ok(());
        }
        self.open_channels()
    }

    /// Discard the index channel and catalog and regenerate both from the
    /// raw data segments.
    pub fn rebuild_index(&self) -> StoreResult<RebuildStats> {
        if !self.descriptor.lock().enabled {
            return Err(self.closed());
        }
        let mut guard = self.inner.write();
        let state = guard.take().ok_or_else(|| self.closed())?;
        state.data.flush()?;
        drop(state);

        let index_dir = self.root.join(INDEX_DIR);
        if index_dir.exists() {
            fs::remove_dir_all(&index_dir)?;
        }
        let catalog_path = self.root.join(CATALOG_FILE);
        if catalog_path.exists() {
            fs::remove_file(&catalog_path)?;
        }

        let max_size = self.descriptor.lock().max_size;
        let data = TraceChannel::open(
            &self.root.join(DATA_DIR),
            ChannelRole::Data,
            max_size,
            self.config.file_size,
        )?;
        let index = TraceChannel::open(&index_dir, ChannelRole::Index, max_size, self.config.file_size)?;
        let catalog = Arc::new(Catalog::new());

        let stats = rebuild(&self.root.join(DATA_DIR), &index, &catalog)?;
        catalog.save(&catalog_path)?;

        let coordinator = Arc::new(RetentionCoordinator::new(
            Arc::clone(&catalog),
            index.store(),
        ));
        data.store().lock().add_listener(coordinator);

        *guard = Some(OpenState {
            data,
            index,
            catalog,
        });
        info!(host = %self.name, "{}", stats.summary());
        Ok(stats)
    }

    /// Change the host's byte budget; persisted, applied to both channels on
    /// their next cleanup pass.
    pub fn set_max_size(&self, max_size: u64) -> StoreResult<()> {
        {
            let mut descriptor = self.descriptor.lock();
            descriptor.max_size = max_size;
            Self::write_descriptor(&self.root, &descriptor)?;
        }
        if let Some(state) = self.inner.read().as_ref() {
            state.data.set_max_size(max_size);
            state.index.set_max_size(max_size);
        }
        Ok(())
    }

    /// Enable or disable the host. Disabled hosts keep their data but
    /// reject ingest and queries.
    pub fn set_enabled(&self, enabled: bool) -> StoreResult<()> {
        let mut descriptor = self.descriptor.lock();
        descriptor.enabled = enabled;
        Self::write_descriptor(&self.root, &descriptor)
    }
}

/// Registry of host stores under one data directory.
pub struct HostManager {
    data_dir: PathBuf,
    config: StoreConfig,
    symbols: Arc<dyn SymbolRegistry>,
    hosts: Mutex<HashMap<String, Arc<HostStore>>>,
}

impl HostManager {
    /// Create a manager rooted at `data_dir`, adopting any host directories
    /// already present.
    pub fn open(
        data_dir: &Path,
        config: StoreConfig,
        symbols: Arc<dyn SymbolRegistry>,
    ) -> StoreResult<Self> {
        fs::create_dir_all(data_dir)?;
        let manager = Self {
            data_dir: data_dir.to_path_buf(),
            config,
            symbols,
            hosts: Mutex::new(HashMap::new()),
        };
        for entry in fs::read_dir(data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                manager.get_or_create(name)?;
            }
        }
        Ok(manager)
    }

    /// Fetch the store for `name`, opening or creating it on first use.
    pub fn get_or_create(&self, name: &str) -> StoreResult<Arc<HostStore>> {
        let mut hosts = self.hosts.lock();
        if let Some(host) = hosts.get(name) {
            return Ok(Arc::clone(host));
        }
        let host = Arc::new(HostStore::open(
            name,
            &self.data_dir.join(name),
            self.config.clone(),
            Arc::clone(&self.symbols),
        )?);
        hosts.insert(name.to_string(), Arc::clone(&host));
        Ok(host)
    }

    /// Fetch an already-registered store.
    pub fn get(&self, name: &str) -> Option<Arc<HostStore>> {
        self.hosts.lock().get(name).cloned()
    }

    /// Registered host names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close and deregister a host, deleting its directory.
    pub fn remove(&self, name: &str) -> StoreResult<()> {
        if let Some(host) = self.hosts.lock().remove(name) {
            host.close()?;
        }
        let dir = self.data_dir.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        info!(host = name, "host removed");
        Ok(())
    }

    /// Close every registered host (service shutdown).
    pub fn close_all(&self) -> StoreResult<()> {
        for host in self.hosts.lock().values() {
            host.close()?;
        }
        Ok(())
    }
}
