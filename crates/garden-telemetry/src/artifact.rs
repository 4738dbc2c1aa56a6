//! Single-slot artifact directory.
//!
//! At most one committed artifact exists at a time. A save writes to a hidden
//! temp file, syncs it, renames it into place and only then removes the
//! previous artifact, all while holding the store mutex. Readers therefore
//! see a complete artifact or `ArtifactNotFound`, never a partial file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::types::{
    ArtifactHandle, ArtifactId, ArtifactKind, CommittedArtifact, TelemetryError, TelemetryResult,
};

/// File extension of committed artifacts.
const ARTIFACT_EXT: &str = "png";

/// Suffix of in-flight writes.
const TEMP_SUFFIX: &str = ".tmp";

struct SlotState {
    current: Option<ArtifactHandle>,
    last_id: Option<ArtifactId>,
}

/// Owns the artifact directory.
pub struct ArtifactStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<SlotState>,
}

impl ArtifactStore {
    /// Open (or create) the artifact directory.
    ///
    /// Leftover temp files are removed. If several committed artifacts are
    /// found, the newest is adopted and the rest are deleted.
    pub fn open(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> TelemetryResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut committed: Vec<(ArtifactId, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                remove_quietly(&path);
                continue;
            }
            if let Some(id) = parse_artifact_name(&path) {
                committed.push((id, path));
            }
        }
        committed.sort_by_key(|(id, _)| *id);

        let current = match committed.pop() {
            Some((id, path)) => {
                for (_, stale) in &committed {
                    remove_quietly(stale);
                }
                let bytes_len = fs::metadata(&path)?.len() as usize;
                tracing::info!("Adopted existing artifact {id} from {}", path.display());
                // The kind of an adopted artifact is not recorded on disk. The
                // path is kept as found since the stem need not be canonical.
                Some(ArtifactHandle {
                    id,
                    kind: ArtifactKind::LineChart,
                    path,
                    bytes_len,
                })
            }
            None => None,
        };

        let last_id = current.as_ref().map(|h| h.id);
        Ok(Self {
            dir,
            clock,
            state: Mutex::new(SlotState { current, last_id }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> TelemetryResult<MutexGuard<'_, SlotState>> {
        self.state
            .lock()
            .map_err(|_| TelemetryError::ArtifactStorage(std::io::Error::other("artifact lock poisoned")))
    }

    fn path_for(&self, id: ArtifactId) -> PathBuf {
        self.dir.join(format!("{id}.{ARTIFACT_EXT}"))
    }

    /// Commit `bytes` as the only artifact.
    ///
    /// The returned bytes are the ones written, so callers never need a
    /// second lookup that a concurrent save could invalidate.
    pub fn save(&self, kind: ArtifactKind, bytes: Vec<u8>) -> TelemetryResult<CommittedArtifact> {
        let mut state = self.lock()?;

        let now = ArtifactId::from_micros(self.clock.now_micros());
        let id = match state.last_id {
            Some(last) if now <= last => ArtifactId::from_micros(last.as_micros() + 1),
            _ => now,
        };

        let final_path = self.path_for(id);
        let temp_path = self.dir.join(format!(".{id}{TEMP_SUFFIX}"));
        if let Err(e) = write_synced(&temp_path, &bytes) {
            remove_quietly(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            remove_quietly(&temp_path);
            return Err(e.into());
        }

        self.purge_except(&final_path);

        let handle = ArtifactHandle {
            id,
            kind,
            path: final_path,
            bytes_len: bytes.len(),
        };
        state.last_id = Some(id);
        state.current = Some(handle.clone());
        tracing::info!("Committed {kind:?} artifact {id} ({} bytes)", bytes.len());
        Ok(CommittedArtifact { handle, bytes })
    }

    /// Bytes of a committed artifact.
    pub fn get(&self, id: ArtifactId) -> TelemetryResult<Vec<u8>> {
        let state = self.lock()?;
        let current = match state.current.as_ref() {
            Some(handle) if handle.id == id => handle,
            _ => return Err(TelemetryError::ArtifactNotFound(id.to_string())),
        };
        match fs::read(&current.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TelemetryError::ArtifactNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle of the committed artifact, if any.
    pub fn current(&self) -> TelemetryResult<Option<ArtifactHandle>> {
        Ok(self.lock()?.current.clone())
    }

    /// Number of committed artifacts on disk.
    pub fn len(&self) -> TelemetryResult<usize> {
        let _state = self.lock()?;
        let mut n = 0;
        for entry in fs::read_dir(&self.dir)? {
            if parse_artifact_name(&entry?.path()).is_some() {
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> TelemetryResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every committed artifact except `keep`.
    fn purge_except(&self, keep: &Path) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to list artifact dir {}: {e}", self.dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path != keep && parse_artifact_name(&path).is_some() {
                remove_quietly(&path);
            }
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {e}", path.display());
        }
    }
}

/// `<secs>[.<frac>].png` → id. Anything else is not an artifact.
fn parse_artifact_name(path: &Path) -> Option<ArtifactId> {
    if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn fixed_store(dir: &Path) -> ArtifactStore {
        ArtifactStore::open(dir, Arc::new(FixedClock::at_secs(1_700_000_000))).unwrap()
    }

    #[test]
    fn test_save_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixed_store(dir.path());
        let committed = store.save(ArtifactKind::LineChart, b"chart-bytes".to_vec()).unwrap();
        let handle = &committed.handle;
        assert_eq!(handle.id.to_string(), "1700000000.000000");
        assert_eq!(committed.bytes, b"chart-bytes");
        assert_eq!(store.get(handle.id).unwrap(), b"chart-bytes");
        assert!(handle.path.exists());
    }

    #[test]
    fn test_single_slot_after_many_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixed_store(dir.path());
        let mut ids = Vec::new();
        for i in 0..5u8 {
            ids.push(store.save(ArtifactKind::Heatmap, vec![i; 16]).unwrap().handle.id);
        }
        assert_eq!(store.len().unwrap(), 1);

        // Same clock tick: ids still strictly increase.
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }

        let last = *ids.last().unwrap();
        assert_eq!(store.get(last).unwrap(), vec![4u8; 16]);
        assert!(matches!(
            store.get(ids[0]),
            Err(TelemetryError::ArtifactNotFound(_))
        ));
        assert_eq!(store.current().unwrap().unwrap().id, last);
    }

    #[test]
    fn test_unknown_id_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixed_store(dir.path());
        let err = store.get(ArtifactId::from_micros(1)).unwrap_err();
        assert!(matches!(err, TelemetryError::ArtifactNotFound(_)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_open_adopts_newest_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("100.000000.png"), b"old").unwrap();
        fs::write(dir.path().join("200.500000.png"), b"new").unwrap();
        fs::write(dir.path().join(".300.000000.tmp"), b"partial").unwrap();
        fs::write(dir.path().join("garden_map.jpg"), b"unrelated").unwrap();

        let store = ArtifactStore::open(dir.path(), Arc::new(FixedClock::at_secs(150))).unwrap();
        let current = store.current().unwrap().unwrap();
        assert_eq!(current.id.to_string(), "200.500000");
        assert_eq!(store.len().unwrap(), 1);
        assert!(!dir.path().join(".300.000000.tmp").exists());
        assert!(dir.path().join("garden_map.jpg").exists());

        // The clock is behind the adopted id; new ids still sort after it.
        let next = store.save(ArtifactKind::LineChart, b"x".to_vec()).unwrap();
        assert!(next.handle.id > current.id);
    }

    #[test]
    fn test_ignores_non_artifacts_when_purging() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
        let store = fixed_store(dir.path());
        store.save(ArtifactKind::LineChart, b"a".to_vec()).unwrap();
        store.save(ArtifactKind::LineChart, b"b".to_vec()).unwrap();
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_open_adopts_short_fraction_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1567296000.5.png"), b"legacy").unwrap();

        let store = ArtifactStore::open(dir.path(), Arc::new(FixedClock::at_secs(1_567_296_000))).unwrap();
        let current = store.current().unwrap().unwrap();
        assert_eq!(current.id.to_string(), "1567296000.500000");
        assert_eq!(current.bytes_len, 6);
        assert_eq!(store.get(current.id).unwrap(), b"legacy");

        let next = store.save(ArtifactKind::Heatmap, b"fresh".to_vec()).unwrap();
        assert!(next.handle.id > current.id);
        assert!(!dir.path().join("1567296000.5.png").exists());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixed_store(dir.path());
        store.save(ArtifactKind::LineChart, b"a".to_vec()).unwrap();

        std::thread::scope(|s| {
            let holder = s.spawn(|| {
                let _guard = store.state.lock().unwrap();
                panic!("holder died");
            });
            assert!(holder.join().is_err());
        });

        assert!(matches!(store.current(), Err(TelemetryError::ArtifactStorage(_))));
        assert!(store.save(ArtifactKind::LineChart, b"b".to_vec()).is_err());
    }
}
