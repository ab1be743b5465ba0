use std::path::{Path, PathBuf};

use bincode::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use sled::{Config, Db, IVec, Tree};

use crate::{
    application::services::VectorIndex,
    domain::{ExpertLogRecord, IndexError, IndexHit, IndexedLog, LogEmbedding, LogFilter},
};

use super::rank;

const LOGS_TREE: &str = "expert_knowledge_base";
const META_TREE: &str = "meta";
const DIMENSIONS_KEY: &[u8] = b"dimensions";

/// Durable vector index backed by `sled`.
///
/// Full `IndexedLog` payloads live in a single tree keyed by a monotonic
/// sled-generated id, so iteration follows insertion order. Similarity is
/// computed in memory with cosine distance, which is fine for the few
/// thousand records an expert knowledge base holds.
pub struct SledVectorIndex {
    db: Db,
    logs: Tree,
    meta: Tree,
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SledVectorIndex {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            IndexError::Unavailable(format!("failed to create data directory {dir:?}: {err}"))
        })?;

        let db = Config::default()
            .path(&dir)
            .cache_capacity(64 * 1024 * 1024)
            .open()
            .map_err(|err| IndexError::Unavailable(format!("failed to open sled db: {err}")))?;

        let logs = db
            .open_tree(LOGS_TREE)
            .map_err(|err| IndexError::Unavailable(format!("failed to open logs tree: {err}")))?;
        let meta = db
            .open_tree(META_TREE)
            .map_err(|err| IndexError::Unavailable(format!("failed to open meta tree: {err}")))?;

        Ok(Self {
            db,
            logs,
            meta,
            data_dir: dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, IndexError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| IndexError::Codec(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IndexError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| IndexError::Codec(format!("deserialization error: {err}")))
    }

    fn decode_entry(bytes: &IVec) -> Result<IndexedLog, IndexError> {
        Self::deserialize(bytes.as_ref())
    }

    fn stored_dimensions(&self) -> Result<Option<usize>, IndexError> {
        let raw = self
            .meta
            .get(DIMENSIONS_KEY)
            .map_err(|err| IndexError::Backend(format!("failed to read index metadata: {err}")))?;
        raw.map(|bytes| Self::deserialize::<u64>(&bytes).map(|d| d as usize))
            .transpose()
    }

    fn entries(&self) -> impl Iterator<Item = Result<IndexedLog, IndexError>> + '_ {
        self.logs.iter().map(|entry| {
            let (_, value) = entry.map_err(|err| {
                IndexError::Backend(format!("failed to read expert log: {err}"))
            })?;
            Self::decode_entry(&value)
        })
    }
}

impl VectorIndex for SledVectorIndex {
    fn insert(&self, entry: &IndexedLog) -> Result<(), IndexError> {
        let _guard = self.write_lock.lock();

        let dims = entry.embedding.dims();
        match self.stored_dimensions()? {
            Some(expected) if expected != dims => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: dims,
                });
            }
            Some(_) => {}
            None => {
                self.meta
                    .insert(DIMENSIONS_KEY, Self::serialize(&(dims as u64))?)
                    .map_err(|err| {
                        IndexError::Backend(format!("failed to record dimensions: {err}"))
                    })?;
            }
        }

        let key = self
            .db
            .generate_id()
            .map_err(|err| IndexError::Backend(format!("failed to allocate key: {err}")))?;
        let bytes = Self::serialize(entry)?;
        self.logs
            .insert(key.to_be_bytes(), bytes)
            .map_err(|err| IndexError::Backend(format!("failed to persist expert log: {err}")))?;

        self.logs
            .flush()
            .map_err(|err| IndexError::Backend(format!("failed to flush expert logs: {err}")))?;

        Ok(())
    }

    fn query(
        &self,
        embedding: &LogEmbedding,
        top_k: usize,
        filter: &LogFilter,
    ) -> Result<Vec<IndexHit>, IndexError> {
        rank(self.entries(), embedding, top_k, filter)
    }

    fn get(&self, filter: &LogFilter) -> Result<Vec<ExpertLogRecord>, IndexError> {
        let mut records = Vec::new();
        for entry in self.entries() {
            let entry = entry?;
            if filter.matches(&entry.record) {
                records.push(entry.record);
            }
        }
        Ok(records)
    }

    fn count(&self) -> Result<usize, IndexError> {
        Ok(self.logs.len())
    }

    fn flush(&self) -> Result<(), IndexError> {
        self.db
            .flush()
            .map_err(|err| IndexError::Backend(format!("failed to flush db: {err}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordSource;

    fn entry(expert: &str, vector: Vec<f32>) -> IndexedLog {
        IndexedLog {
            record: ExpertLogRecord::new(
                "E1",
                "door won't close",
                "sensor fault",
                "clean sensor",
                expert,
                "2024-01-01T00:00:00Z",
                RecordSource::Expert,
            ),
            embedding: LogEmbedding::new("m", vector),
        }
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let stored = entry("x1", vec![1.0, 0.0, 0.0]);
        {
            let index = SledVectorIndex::open(dir.path()).unwrap();
            index.insert(&stored).unwrap();
            index.flush().unwrap();
        }

        let index = SledVectorIndex::open(dir.path()).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        let records = index.get(&LogFilter::by_expert("x1")).unwrap();
        assert_eq!(records, vec![stored.record]);
    }

    #[test]
    fn dimension_is_pinned_by_first_insert() {
        let dir = tempfile::tempdir().unwrap();
        let index = SledVectorIndex::open(dir.path()).unwrap();
        index.insert(&entry("x1", vec![1.0, 0.0])).unwrap();

        let err = index.insert(&entry("x2", vec![1.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn get_preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = SledVectorIndex::open(dir.path()).unwrap();
        for expert in ["a", "b", "c"] {
            index.insert(&entry(expert, vec![0.5, 0.5])).unwrap();
        }
        let experts: Vec<_> = index
            .get(&LogFilter::any())
            .unwrap()
            .into_iter()
            .map(|r| r.expert_id)
            .collect();
        assert_eq!(experts, ["a", "b", "c"]);
    }
}
