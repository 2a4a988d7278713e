use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{PlayerError, Result};
use crate::model::{CompletionSet, ProgressRecord, StepId};

/// Minimum spacing of file rewrites caused by [`LocalProgressCache::touch`].
const TOUCH_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Fast per-device progress cache.
///
/// Cheap to clone; clones share the same map. When opened with a path, every
/// store rewrites the JSON file through a temp file and rename.
#[derive(Debug, Clone, Default)]
pub struct LocalProgressCache {
    records: Arc<RwLock<HashMap<StepId, ProgressRecord>>>,
    path: Option<Arc<PathBuf>>,
    last_flush: Arc<Mutex<Option<Instant>>>,
}

impl LocalProgressCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed cache. A missing file is an empty cache; an
    /// unreadable one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<StepId, ProgressRecord>>(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable progress cache");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), records = records.len(), "Progress cache opened");
        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            path: Some(Arc::new(path)),
            last_flush: Arc::default(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub fn get(&self, step_id: &StepId) -> Option<ProgressRecord> {
        self.records.read().get(step_id).cloned()
    }

    /// Insert or merge a record and return what was stored.
    ///
    /// A cached completion is never cleared and the high-water mark never
    /// goes down.
    pub fn store(&self, record: ProgressRecord) -> Result<ProgressRecord> {
        let stored = self.merge(record);
        self.flush()
            .map_err(|e| PlayerError::persistence(&stored.step_id, e.to_string()))?;
        Ok(stored)
    }

    /// Like [`store`](Self::store), for per-frame position updates: the map
    /// is updated at once, the file at most once per second.
    pub fn touch(&self, record: ProgressRecord) -> Result<ProgressRecord> {
        let stored = self.merge(record);
        let due = self
            .last_flush
            .lock()
            .is_none_or(|at| at.elapsed() >= TOUCH_FLUSH_INTERVAL);
        if due {
            self.flush()
                .map_err(|e| PlayerError::persistence(&stored.step_id, e.to_string()))?;
        }
        Ok(stored)
    }

    pub fn completed_steps(&self) -> CompletionSet {
        self.records
            .read()
            .values()
            .filter(|r| r.completed)
            .map(|r| r.step_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn merge(&self, record: ProgressRecord) -> ProgressRecord {
        let mut records = self.records.write();
        let merged = match records.get(&record.step_id) {
            Some(existing) => ProgressRecord {
                completed: record.completed || existing.completed,
                max_watched: record.max_watched.max(existing.max_watched),
                ..record
            },
            None => record,
        };
        records.insert(merged.step_id.clone(), merged.clone());
        merged
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let body = {
            let records = self.records.read();
            let ordered: BTreeMap<_, _> = records.iter().collect();
            serde_json::to_vec_pretty(&ordered)?
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        *self.last_flush.lock() = Some(Instant::now());
        Ok(())
    }
}
