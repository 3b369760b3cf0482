//! Backend routing by kind.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use recall_core::{BackendKind, DiskSettings, RecallResult, StorageError};
use tracing::{debug, warn};

use super::lmdb_backend::LmdbBackend;
use super::null::NullBackend;
use super::traits::StorageBackend;

/// The set of backends available to one cache context.
///
/// Resolving a kind that was never registered yields the shared
/// [`NullBackend`]; backend selection never fails. When disk settings are
/// known, `Disk` is opened on first use.
pub struct BackendRegistry {
    backends: BTreeMap<BackendKind, Arc<dyn StorageBackend>>,
    disk_settings: Option<DiskSettings>,
    /// `None` inside once an open attempt failed.
    disk: OnceCell<Option<Arc<dyn StorageBackend>>>,
    null: Arc<dyn StorageBackend>,
    warned: Mutex<HashSet<BackendKind>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self {
            backends: BTreeMap::new(),
            disk_settings: None,
            disk: OnceCell::new(),
            null: Arc::new(NullBackend),
            warned: Mutex::new(HashSet::new()),
        }
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under the kind it reports, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn StorageBackend>) {
        let kind = backend.kind();
        if kind.is_null() {
            return;
        }
        debug!(backend = %kind, "Registered cache backend");
        self.backends.insert(kind, backend);
    }

    /// Remember where the LMDB backend lives; it is opened on first resolve.
    pub fn with_disk_settings(&mut self, settings: DiskSettings) {
        self.disk_settings = Some(settings);
    }

    /// Open the LMDB backend now.
    ///
    /// A failure is logged and leaves `Disk` resolving to the null backend.
    pub fn open_disk(&mut self, settings: &DiskSettings) {
        self.with_disk_settings(settings.clone());
        self.lazy_disk();
    }

    /// The LMDB backend, opening it on the first call.
    fn lazy_disk(&self) -> Option<Arc<dyn StorageBackend>> {
        let settings = self.disk_settings.as_ref()?;
        self.disk
            .get_or_init(|| match LmdbBackend::open(settings) {
                Ok(backend) => {
                    debug!(path = %settings.path.display(), "Opened disk cache backend");
                    Some(Arc::new(backend) as Arc<dyn StorageBackend>)
                }
                Err(e) => {
                    let err = StorageError::BackendUnavailable {
                        backend: BackendKind::Disk,
                        reason: e.to_string(),
                    };
                    warn!(
                        error = %err,
                        path = %settings.path.display(),
                        "Disk cache unavailable, falling back to null backend"
                    );
                    None
                }
            })
            .clone()
    }

    /// The disk backend if it has been opened successfully.
    fn opened_disk(&self) -> Option<&Arc<dyn StorageBackend>> {
        self.disk.get().and_then(Option::as_ref)
    }

    /// The backend registered for `kind`, or the null backend.
    pub fn resolve(&self, kind: BackendKind) -> Arc<dyn StorageBackend> {
        if let Some(backend) = self.backends.get(&kind) {
            return Arc::clone(backend);
        }
        if kind == BackendKind::Disk {
            if let Some(backend) = self.lazy_disk() {
                return backend;
            }
        }

        if !kind.is_null() {
            let first_time = self
                .warned
                .lock()
                .map(|mut warned| warned.insert(kind))
                .unwrap_or(false);
            if first_time {
                warn!(backend = %kind, "Cache backend not configured, using null backend");
            }
        }

        Arc::clone(&self.null)
    }

    /// Whether `kind` has a registered or already-opened backend.
    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
            || (kind == BackendKind::Disk && self.opened_disk().is_some())
    }

    /// Kinds with a registered or already-opened backend, in order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self.backends.keys().copied().collect();
        if !self.backends.contains_key(&BackendKind::Disk) && self.opened_disk().is_some() {
            kinds.push(BackendKind::Disk);
            kinds.sort();
        }
        kinds
    }

    /// Reset every registered or opened backend.
    ///
    /// Every backend is attempted; the first failure is returned.
    pub async fn reset_all(&self) -> RecallResult<()> {
        let lazy = self
            .opened_disk()
            .filter(|_| !self.backends.contains_key(&BackendKind::Disk))
            .map(|backend| (&BackendKind::Disk, backend));

        let mut first_error = None;
        for (kind, backend) in self.backends.iter().chain(lazy) {
            if let Err(e) = backend.reset().await {
                warn!(backend = %kind, error = %e, "Failed to reset cache backend");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
