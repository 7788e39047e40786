use std::{fs, io};
use std::fs::{File, Metadata};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// Gets the metadata for given `path`, returning:
/// - `Ok(Some(metadata))` if a file or directory exists at given path,
/// - `Ok(None)` if no file or directory exists at given path,
/// - `Err(e)` if there was an error getting the metadata for given path.
pub fn metadata(path: impl AsRef<Path>) -> Result<Option<Metadata>, io::Error> {
  match fs::metadata(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
    Ok(m) => Ok(Some(m))
  }
}

/// Hashes the contents of the file at `path` with SHA-256, returning:
/// - `Ok(Some(hash))` if a file exists at given path,
/// - `Ok(None)` if the file disappeared before it could be opened,
/// - `Err(e)` if there was an error opening or reading the file.
pub fn hash_file(path: impl AsRef<Path>) -> Result<Option<[u8; 32]>, io::Error> {
  let mut file = match File::open(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e),
    Ok(file) => file,
  };
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher)?;
  Ok(Some(hasher.finalize().into()))
}

/// Removes the file or directory (recursively) at `path`. Succeeds when nothing exists at `path`.
pub fn remove_if_exists(path: impl AsRef<Path>) -> Result<(), io::Error> {
  let path = path.as_ref();
  let result = match metadata(path)? {
    Some(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
    Some(_) => fs::remove_file(path),
    None => return Ok(()),
  };
  match result {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    r => r,
  }
}

/// Lexically normalizes `path`: removes `.` components and lets `..` pop the previous normal component. Does not touch
/// the filesystem, so symbolic links are not resolved.
/// Makes `path` absolute by joining it onto the current directory if it is relative, then [normalizes](normalize) it.
/// If the current directory cannot be determined, `path` is only normalized.
pub fn absolute(path: impl AsRef<Path>) -> PathBuf {
  let path = path.as_ref();
  let path = if path.as_os_str().is_empty() { Path::new(".") } else { path };
  match std::path::absolute(path) {
    Ok(absolute) => normalize(absolute),
    Err(_) => normalize(path),
  }
}

pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.as_ref().components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !normalized.pop() {
          normalized.push(component);
        }
      }
      c => normalized.push(c),
    }
  }
  normalized
}
