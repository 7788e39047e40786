use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::fs::{hash_file, metadata, remove_if_exists};

/// A buildable thing: a file, a folder, or a purely logical marker.
///
/// Targets are compared and hashed by their [identity](Target::identity): the absolute path for files and folders,
/// and `"<name>@"` for virtual targets. A file and a folder at the same path therefore have the same identity.
#[derive(Clone)]
pub enum Target {
  File(PathBuf),
  Folder(PathBuf),
  Virtual(String),
}

impl Target {
  #[inline]
  pub fn file(path: impl Into<PathBuf>) -> Self { Self::File(path.into()) }
  #[inline]
  pub fn folder(path: impl Into<PathBuf>) -> Self { Self::Folder(path.into()) }
  #[inline]
  pub fn virtual_target(name: impl Into<String>) -> Self { Self::Virtual(name.into()) }

  /// Gets the canonical identity of this target.
  pub fn identity(&self) -> String {
    match self {
      Target::File(path) | Target::Folder(path) => path.to_string_lossy().into_owned(),
      Target::Virtual(name) => format!("{}@", name),
    }
  }

  /// Gets the path of this target, or `None` if this is a virtual target.
  #[inline]
  pub fn path(&self) -> Option<&Path> {
    match self {
      Target::File(path) | Target::Folder(path) => Some(path),
      Target::Virtual(_) => None,
    }
  }

  #[inline]
  pub fn is_virtual(&self) -> bool { matches!(self, Target::Virtual(_)) }

  /// Computes the current fingerprint of this target, returning:
  /// - `Ok(Some(fingerprint))` if the target exists,
  /// - `Ok(None)` if it does not exist, or if this is a virtual target,
  /// - `Err(e)` if reading metadata or contents failed.
  ///
  /// Fingerprints are computed fresh on every call and never cached.
  pub fn fingerprint(&self) -> Result<Option<Fingerprint>, io::Error> {
    match self {
      Target::File(path) => {
        let Some(metadata) = metadata(path)? else {
          return Ok(None);
        };
        let modified = metadata.modified()?;
        if !metadata.is_file() {
          return Ok(Some(Fingerprint::Folder { modified }));
        }
        let Some(hash) = hash_file(path)? else {
          return Ok(None);
        };
        Ok(Some(Fingerprint::File { modified, hash }))
      }
      Target::Folder(path) => {
        let Some(metadata) = metadata(path)? else {
          return Ok(None);
        };
        Ok(Some(Fingerprint::Folder { modified: metadata.modified()? }))
      }
      Target::Virtual(_) => Ok(None),
    }
  }

  /// Removes the artifact of this target from the filesystem. Does nothing for virtual targets or missing artifacts.
  pub fn clean(&self) -> Result<(), io::Error> {
    match self.path() {
      Some(path) => remove_if_exists(path),
      None => Ok(()),
    }
  }
}

impl PartialEq for Target {
  #[inline]
  fn eq(&self, other: &Self) -> bool { self.identity() == other.identity() }
}
impl Eq for Target {}
impl Hash for Target {
  #[inline]
  fn hash<H: Hasher>(&self, state: &mut H) { self.identity().hash(state) }
}

impl Display for Target {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.identity())
  }
}
impl Debug for Target {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let kind = match self {
      Target::File(_) => "File",
      Target::Folder(_) => "Folder",
      Target::Virtual(_) => "Virtual",
    };
    write!(f, "<{} {}>", kind, self.identity())
  }
}


/// A comparable snapshot of the observable state of a [`Target`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Fingerprint {
  /// Last modification time and SHA-256 hash of the contents of a file.
  File { modified: SystemTime, hash: [u8; 32] },
  /// Last modification time of a directory entry.
  Folder { modified: SystemTime },
}

impl Debug for Fingerprint {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Fingerprint::File { modified, hash } => {
        write!(f, "File({:?}, ", modified)?;
        for b in &hash[..4] {
          write!(f, "{:02x}", b)?;
        }
        f.write_str("…)")
      }
      Fingerprint::Folder { modified } => write!(f, "Folder({:?})", modified),
    }
  }
}


#[cfg(test)]
mod test {
  use std::collections::HashSet;
  use std::fs;

  use assert_matches::assert_matches;
  use testresult::TestResult;

  use dev_shared::fs::{create_temp_dir, write_until_modified};

  use super::*;

  #[test]
  fn test_identity() {
    assert_eq!(Target::file("/proj/build/a.o").identity(), "/proj/build/a.o");
    assert_eq!(Target::folder("/proj/dist").identity(), "/proj/dist");
    assert_eq!(Target::virtual_target("all").identity(), "all@");
  }

  #[test]
  fn test_equality_by_identity() {
    assert_eq!(Target::file("/proj/dist"), Target::folder("/proj/dist"));
    assert_ne!(Target::file("/proj/all"), Target::virtual_target("/proj/all"));
    let set: HashSet<_> = [Target::file("/a"), Target::folder("/a"), Target::virtual_target("a")].into_iter().collect();
    assert_eq!(set.len(), 2);
  }

  #[test]
  fn test_file_fingerprint() -> TestResult {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("a.c");
    let target = Target::file(&path);
    assert_eq!(target.fingerprint()?, None);

    fs::write(&path, "v1")?;
    let fingerprint = target.fingerprint()?;
    assert_matches!(fingerprint, Some(Fingerprint::File { .. }));
    assert_eq!(fingerprint, target.fingerprint()?);

    write_until_modified(&path, "v2")?;
    assert_ne!(fingerprint, target.fingerprint()?, "fingerprint is equal after modifying file");

    fs::remove_file(&path)?;
    assert_eq!(target.fingerprint()?, None, "fingerprint is present after removing file");
    Ok(())
  }

  #[test]
  fn test_folder_fingerprint() -> TestResult {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("dist");
    let target = Target::folder(&path);
    assert_eq!(target.fingerprint()?, None);

    fs::create_dir(&path)?;
    assert_matches!(target.fingerprint()?, Some(Fingerprint::Folder { .. }));
    Ok(())
  }

  #[test]
  fn test_virtual_fingerprint_is_absent() -> TestResult {
    assert_eq!(Target::virtual_target("all").fingerprint()?, None);
    Ok(())
  }

  #[test]
  fn test_clean() -> TestResult {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("a.o");
    fs::write(&path, "object")?;
    let target = Target::file(&path);
    target.clean()?;
    assert!(!path.exists());
    target.clean()?;
    Target::virtual_target("all").clean()?;
    Ok(())
  }
}
