use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::target::Fingerprint;

/// Persisted mapping from target identity (or per-consumer input key) to the last observed [`Fingerprint`].
pub trait FingerprintStore {
  fn get(&self, key: &str) -> Option<Fingerprint>;
  fn set(&mut self, key: String, fingerprint: Fingerprint);
  fn remove(&mut self, key: &str);
  /// Makes all changes durable. Does nothing for non-durable stores.
  #[inline]
  fn flush(&mut self) -> Result<(), StoreError> { Ok(()) }
}

impl<S: FingerprintStore + ?Sized> FingerprintStore for &mut S {
  #[inline]
  fn get(&self, key: &str) -> Option<Fingerprint> { (**self).get(key) }
  #[inline]
  fn set(&mut self, key: String, fingerprint: Fingerprint) { (**self).set(key, fingerprint) }
  #[inline]
  fn remove(&mut self, key: &str) { (**self).remove(key) }
  #[inline]
  fn flush(&mut self) -> Result<(), StoreError> { (**self).flush() }
}


/// Non-durable [`FingerprintStore`], useful for testing and for embedding.
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
  records: HashMap<String, Fingerprint>,
}

impl MemoryStore {
  #[inline]
  pub fn new() -> Self { Self::default() }
  #[inline]
  pub fn len(&self) -> usize { self.records.len() }
  #[inline]
  pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

impl FingerprintStore for MemoryStore {
  #[inline]
  fn get(&self, key: &str) -> Option<Fingerprint> { self.records.get(key).copied() }
  #[inline]
  fn set(&mut self, key: String, fingerprint: Fingerprint) { self.records.insert(key, fingerprint); }
  #[inline]
  fn remove(&mut self, key: &str) { self.records.remove(key); }
}


/// Durable [`FingerprintStore`] backed by a single RON file. Changes are kept in memory until [flushed], which
/// atomically replaces the file.
///
/// [flushed]: FingerprintStore::flush
#[derive(Debug)]
pub struct FileStore {
  path: PathBuf,
  records: BTreeMap<String, Fingerprint>,
  dirty: bool,
}

impl FileStore {
  /// Opens the store at `path`. A missing file is an empty store.
  ///
  /// # Errors
  ///
  /// Returns an error if the file exists but cannot be read or deserialized.
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let path = path.into();
    let records = match fs::read_to_string(&path) {
      Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
      Err(source) => return Err(StoreError::Io { path, source }),
      Ok(text) => ron::from_str(&text).map_err(|source| StoreError::Deserialize { path: path.clone(), source })?,
    };
    debug!(path = %path.display(), records = records.len(), "opened fingerprint store");
    Ok(Self { path, records, dirty: false })
  }

  #[inline]
  pub fn path(&self) -> &Path { &self.path }
  #[inline]
  pub fn len(&self) -> usize { self.records.len() }
  #[inline]
  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  fn write(&self) -> Result<(), StoreError> {
    let text = ron::ser::to_string_pretty(&self.records, PrettyConfig::default())?;
    let io_error = |source| StoreError::Io { path: self.path.clone(), source };
    let dir = match self.path.parent() {
      Some(dir) if !dir.as_os_str().is_empty() => dir,
      _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_error)?;
    let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(text.as_bytes()).map_err(io_error)?;
    file.persist(&self.path).map_err(|e| io_error(e.error))?;
    Ok(())
  }
}

impl FingerprintStore for FileStore {
  #[inline]
  fn get(&self, key: &str) -> Option<Fingerprint> { self.records.get(key).copied() }
  #[inline]
  fn set(&mut self, key: String, fingerprint: Fingerprint) {
    if self.records.insert(key, fingerprint) != Some(fingerprint) {
      self.dirty = true;
    }
  }
  #[inline]
  fn remove(&mut self, key: &str) {
    if self.records.remove(key).is_some() {
      self.dirty = true;
    }
  }
  fn flush(&mut self) -> Result<(), StoreError> {
    if !self.dirty {
      return Ok(());
    }
    self.write()?;
    self.dirty = false;
    trace!(path = %self.path.display(), records = self.records.len(), "flushed fingerprint store");
    Ok(())
  }
}


#[cfg(test)]
mod test {
  use std::time::SystemTime;

  use assert_matches::assert_matches;
  use testresult::TestResult;

  use dev_shared::fs::create_temp_dir;

  use super::*;

  fn fingerprint(byte: u8) -> Fingerprint {
    Fingerprint::File { modified: SystemTime::UNIX_EPOCH, hash: [byte; 32] }
  }

  #[test]
  fn test_memory_store() {
    let mut store = MemoryStore::new();
    assert_eq!(store.get("/a"), None);
    store.set("/a".to_string(), fingerprint(1));
    assert_eq!(store.get("/a"), Some(fingerprint(1)));
    store.set("/a".to_string(), fingerprint(2));
    assert_eq!(store.get("/a"), Some(fingerprint(2)));
    store.remove("/a");
    assert!(store.is_empty());
  }

  #[test]
  fn test_file_store_survives_reopen() -> TestResult {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("nested").join(".isengard.ron");
    let mut store = FileStore::open(&path)?;
    assert!(store.is_empty());
    store.set("/proj/a.o".to_string(), fingerprint(1));
    store.set("/proj/a.o|/proj/a.c".to_string(), Fingerprint::Folder { modified: SystemTime::UNIX_EPOCH });
    store.flush()?;

    let store = FileStore::open(&path)?;
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("/proj/a.o"), Some(fingerprint(1)));
    assert_matches!(store.get("/proj/a.o|/proj/a.c"), Some(Fingerprint::Folder { .. }));
    Ok(())
  }

  #[test]
  fn test_file_store_flush_is_lazy() -> TestResult {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join(".isengard.ron");
    let mut store = FileStore::open(&path)?;
    store.flush()?;
    assert!(!path.exists(), "clean store was written");

    store.set("a@".to_string(), fingerprint(3));
    store.remove("a@");
    store.flush()?;
    assert!(FileStore::open(&path)?.is_empty());
    Ok(())
  }

  #[test]
  fn test_file_store_corrupt() -> TestResult {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join(".isengard.ron");
    fs::write(&path, "not ron {")?;
    assert_matches!(FileStore::open(&path), Err(StoreError::Deserialize { .. }));
    Ok(())
  }
}
