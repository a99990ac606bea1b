use depgraph_core::{DepGraphError, Result};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    hash::Hash,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

type DB = DBWithThreadMode<MultiThreaded>;

const CONTAINERS_CF: &str = "containers";
const METADATA_CF: &str = "metadata";
const VERSION_KEY: &[u8] = b"version";

/// Keys of containers and values of multimaps.
pub trait ContainerKey: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> ContainerKey for T where
    T: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static
{
}

pub trait ContainerValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> ContainerValue for T where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

pub trait Maplike<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<&V>;

    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    fn put(&mut self, key: K, value: V);

    fn remove(&mut self, key: &K) -> Option<V>;

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand buffered changes over to the backing store. A no-op in memory.
    fn stage(&mut self) -> Result<()>;
}

pub trait MultiMaplike<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Box<dyn Iterator<Item = &V> + '_>;

    fn contains_key(&self, key: &K) -> bool;

    fn contains(&self, key: &K, value: &V) -> bool;

    /// Returns `false` when the pair was already present.
    fn put(&mut self, key: K, value: V) -> bool;

    /// Replace the whole value set; an empty set keeps the key registered.
    fn replace(&mut self, key: K, values: Vec<V>);

    /// Removes one pair; the key goes away with its last value.
    fn remove_value(&mut self, key: &K, value: &V) -> bool;

    fn remove(&mut self, key: &K);

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_>;

    fn len(&self) -> usize;

    fn stage(&mut self) -> Result<()>;
}

/// Supplies the containers a dependency graph is built from.
pub trait ContainerFactory: Send + Sync {
    fn create_map<K: ContainerKey, V: ContainerValue>(
        &self,
        name: &str,
    ) -> Result<Box<dyn Maplike<K, V>>>
    where
        Self: Sized;

    fn create_multimap<K: ContainerKey, V: ContainerKey>(
        &self,
        name: &str,
    ) -> Result<Box<dyn MultiMaplike<K, V>>>
    where
        Self: Sized;

    /// Snapshot version persisted by an earlier session, 0 for a fresh store.
    fn load_version(&self) -> Result<u64>;

    fn store_version(&self, version: u64) -> Result<()>;

    /// Write everything staged so far.
    fn flush(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| DepGraphError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| DepGraphError::Serialization(e.to_string()))
}

fn storage_error(e: rocksdb::Error) -> DepGraphError {
    DepGraphError::Storage(e.to_string())
}

/// Staging area shared by the containers of one RocksDB factory.
#[derive(Clone)]
struct Journal {
    db: Arc<DB>,
    prefix: Vec<u8>,
    batch: Arc<Mutex<WriteBatch>>,
}

impl Journal {
    fn new(db: Arc<DB>, name: &str, batch: Arc<Mutex<WriteBatch>>) -> Self {
        let mut prefix = name.as_bytes().to_vec();
        prefix.push(0);
        Self { db, prefix, batch }
    }

    fn key_bytes<K: Serialize>(&self, key: &K) -> Result<Vec<u8>> {
        let mut bytes = self.prefix.clone();
        bytes.extend(encode(key)?);
        Ok(bytes)
    }

    fn put<K: Serialize, V: Serialize>(&self, key: &K, value: &V) -> Result<()> {
        let cf = self.containers_cf()?;
        let key = self.key_bytes(key)?;
        let value = encode(value)?;
        self.batch.lock().put_cf(&cf, key, value);
        Ok(())
    }

    fn delete<K: Serialize>(&self, key: &K) -> Result<()> {
        let cf = self.containers_cf()?;
        let key = self.key_bytes(key)?;
        self.batch.lock().delete_cf(&cf, key);
        Ok(())
    }

    fn containers_cf(&self) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db.cf_handle(CONTAINERS_CF).ok_or_else(|| {
            DepGraphError::Storage(format!("Column family '{}' not found", CONTAINERS_CF))
        })
    }

    /// Every persisted entry of this container.
    fn load<K: DeserializeOwned, V: DeserializeOwned>(&self) -> Result<Vec<(K, V)>> {
        let cf = self.containers_cf()?;
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&self.prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(storage_error)?;
            if !key.starts_with(&self.prefix) {
                break;
            }
            entries.push((decode(&key[self.prefix.len()..])?, decode(&value)?));
        }
        Ok(entries)
    }
}

/// Hash-map container; with a journal attached, changed keys are remembered
/// until the next [`Maplike::stage`].
pub struct HashMapContainer<K, V> {
    entries: FxHashMap<K, V>,
    dirty: FxHashSet<K>,
    journal: Option<Journal>,
}

impl<K: ContainerKey, V: ContainerValue> HashMapContainer<K, V> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            dirty: FxHashSet::default(),
            journal: None,
        }
    }

    fn with_journal(journal: Journal) -> Result<Self> {
        let entries = journal.load::<K, V>()?.into_iter().collect();
        Ok(Self {
            entries,
            dirty: FxHashSet::default(),
            journal: Some(journal),
        })
    }

    fn touch(&mut self, key: &K) {
        if self.journal.is_some() {
            self.dirty.insert(key.clone());
        }
    }
}

impl<K: ContainerKey, V: ContainerValue> Default for HashMapContainer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ContainerKey, V: ContainerValue> Maplike<K, V> for HashMapContainer<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    fn put(&mut self, key: K, value: V) {
        self.touch(&key);
        self.entries.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.touch(key);
        }
        removed
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.entries.keys())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stage(&mut self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        for key in self.dirty.drain() {
            match self.entries.get(&key) {
                Some(value) => journal.put(&key, value)?,
                None => journal.delete(&key)?,
            }
        }
        Ok(())
    }
}

pub struct HashMultiMapContainer<K, V> {
    entries: FxHashMap<K, FxHashSet<V>>,
    dirty: FxHashSet<K>,
    journal: Option<Journal>,
}

impl<K: ContainerKey, V: ContainerKey> HashMultiMapContainer<K, V> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            dirty: FxHashSet::default(),
            journal: None,
        }
    }

    fn with_journal(journal: Journal) -> Result<Self> {
        let entries = journal
            .load::<K, Vec<V>>()?
            .into_iter()
            .map(|(key, values)| (key, values.into_iter().collect()))
            .collect();
        Ok(Self {
            entries,
            dirty: FxHashSet::default(),
            journal: Some(journal),
        })
    }

    fn touch(&mut self, key: &K) {
        if self.journal.is_some() {
            self.dirty.insert(key.clone());
        }
    }
}

impl<K: ContainerKey, V: ContainerKey> Default for HashMultiMapContainer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ContainerKey, V: ContainerKey> MultiMaplike<K, V> for HashMultiMapContainer<K, V> {
    fn get(&self, key: &K) -> Box<dyn Iterator<Item = &V> + '_> {
        match self.entries.get(key) {
            Some(values) => Box::new(values.iter()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn contains(&self, key: &K, value: &V) -> bool {
        self.entries
            .get(key)
            .is_some_and(|values| values.contains(value))
    }

    fn put(&mut self, key: K, value: V) -> bool {
        let added = self.entries.entry(key.clone()).or_default().insert(value);
        if added {
            self.touch(&key);
        }
        added
    }

    fn replace(&mut self, key: K, values: Vec<V>) {
        self.touch(&key);
        self.entries.insert(key, values.into_iter().collect());
    }

    fn remove_value(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = values.remove(value);
        if values.is_empty() {
            self.entries.remove(key);
        }
        if removed {
            self.touch(key);
        }
        removed
    }

    fn remove(&mut self, key: &K) {
        if self.entries.remove(key).is_some() {
            self.touch(key);
        }
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.entries.keys())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stage(&mut self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        for key in self.dirty.drain() {
            match self.entries.get(&key) {
                Some(values) => journal.put(&key, &values.iter().collect::<Vec<_>>())?,
                None => journal.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// Containers living only for the lifetime of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryContainerFactory;

impl InMemoryContainerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerFactory for InMemoryContainerFactory {
    fn create_map<K: ContainerKey, V: ContainerValue>(
        &self,
        _name: &str,
    ) -> Result<Box<dyn Maplike<K, V>>> {
        Ok(Box::new(HashMapContainer::new()))
    }

    fn create_multimap<K: ContainerKey, V: ContainerKey>(
        &self,
        _name: &str,
    ) -> Result<Box<dyn MultiMaplike<K, V>>> {
        Ok(Box::new(HashMultiMapContainer::new()))
    }

    fn load_version(&self) -> Result<u64> {
        Ok(0)
    }

    fn store_version(&self, _version: u64) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Containers persisted in a RocksDB database.
///
/// Entries are loaded into memory when a container is created; staged
/// changes of all containers are written together by [`ContainerFactory::flush`].
pub struct RocksDbContainerFactory {
    db: Arc<DB>,
    db_path: PathBuf,
    batch: Arc<Mutex<WriteBatch>>,
}

impl RocksDbContainerFactory {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_compression_type(DBCompressionType::Zstd);

        let cf_descriptors = vec![
            Self::create_containers_cf_descriptor(),
            Self::create_metadata_cf_descriptor(),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| DepGraphError::Storage(format!("Failed to open database: {}", e)))?;

        info!("Opened dependency graph database at {}", path.as_ref().display());

        Ok(Self {
            db: Arc::new(db),
            db_path: path.as_ref().to_path_buf(),
            batch: Arc::new(Mutex::new(WriteBatch::default())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn create_containers_cf_descriptor() -> ColumnFamilyDescriptor {
        let mut opts = Options::default();
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_compression_type(DBCompressionType::Zstd);
        ColumnFamilyDescriptor::new(CONTAINERS_CF, opts)
    }

    fn create_metadata_cf_descriptor() -> ColumnFamilyDescriptor {
        let mut opts = Options::default();
        opts.set_write_buffer_size(4 * 1024 * 1024);
        ColumnFamilyDescriptor::new(METADATA_CF, opts)
    }

    fn metadata_cf(&self) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db.cf_handle(METADATA_CF).ok_or_else(|| {
            DepGraphError::Storage(format!("Column family '{}' not found", METADATA_CF))
        })
    }

    fn journal(&self, name: &str) -> Journal {
        Journal::new(self.db.clone(), name, self.batch.clone())
    }
}

impl ContainerFactory for RocksDbContainerFactory {
    fn create_map<K: ContainerKey, V: ContainerValue>(
        &self,
        name: &str,
    ) -> Result<Box<dyn Maplike<K, V>>> {
        let container = HashMapContainer::with_journal(self.journal(name))?;
        debug!("Loaded map '{}' with {} entries", name, container.len());
        Ok(Box::new(container))
    }

    fn create_multimap<K: ContainerKey, V: ContainerKey>(
        &self,
        name: &str,
    ) -> Result<Box<dyn MultiMaplike<K, V>>> {
        let container = HashMultiMapContainer::with_journal(self.journal(name))?;
        debug!("Loaded multimap '{}' with {} keys", name, container.len());
        Ok(Box::new(container))
    }

    fn load_version(&self) -> Result<u64> {
        let cf = self.metadata_cf()?;
        match self.db.get_cf(&cf, VERSION_KEY).map_err(storage_error)? {
            Some(bytes) => decode(&bytes),
            None => Ok(0),
        }
    }

    fn store_version(&self, version: u64) -> Result<()> {
        let cf = self.metadata_cf()?;
        let bytes = encode(&version)?;
        self.batch.lock().put_cf(&cf, VERSION_KEY, bytes);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.batch.lock());
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        self.db.write(batch).map_err(storage_error)?;
        debug!("Flushed {} staged container writes", ops);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.flush()?;
        self.db.flush().map_err(storage_error)?;
        info!("Closed dependency graph database at {}", self.db_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_multimap_set_semantics() {
        let mut map: HashMultiMapContainer<String, String> = HashMultiMapContainer::new();
        assert!(map.put("a".into(), "x".into()));
        assert!(!map.put("a".into(), "x".into()));
        assert!(map.put("a".into(), "y".into()));
        assert_eq!(map.get(&"a".to_string()).count(), 2);

        assert!(map.remove_value(&"a".to_string(), &"x".to_string()));
        assert!(map.remove_value(&"a".to_string(), &"y".to_string()));
        assert!(!map.contains_key(&"a".to_string()));
    }

    #[test]
    fn test_replace_with_empty_keeps_key() {
        let mut map: HashMultiMapContainer<String, String> = HashMultiMapContainer::new();
        map.replace("src".into(), Vec::new());
        assert!(map.contains_key(&"src".to_string()));
        assert_eq!(map.get(&"src".to_string()).count(), 0);
    }

    #[test]
    fn test_rocksdb_containers_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let factory = RocksDbContainerFactory::open(temp_dir.path()).unwrap();
            let mut map = factory.create_map::<String, u32>("numbers").unwrap();
            let mut multi = factory.create_multimap::<String, String>("sets").unwrap();
            map.put("one".into(), 1);
            map.put("two".into(), 2);
            map.remove(&"two".to_string());
            multi.put("k".into(), "v1".into());
            multi.put("k".into(), "v2".into());
            map.stage().unwrap();
            multi.stage().unwrap();
            factory.store_version(7).unwrap();
            factory.close().unwrap();
        }

        let factory = RocksDbContainerFactory::open(temp_dir.path()).unwrap();
        let map = factory.create_map::<String, u32>("numbers").unwrap();
        let multi = factory.create_multimap::<String, String>("sets").unwrap();
        assert_eq!(map.get(&"one".to_string()), Some(&1));
        assert!(!map.contains_key(&"two".to_string()));
        assert_eq!(multi.get(&"k".to_string()).count(), 2);
        assert_eq!(factory.load_version().unwrap(), 7);
    }
}
