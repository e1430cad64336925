// src/name_mapper.rs
//
// Conversion between local filesystem paths and flat, slash-separated object keys.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, TransferError};

/// Maps files found under an upload root to object keys.
///
/// The root is inspected once: a root naming a single file maps to that file's base
/// name, a directory root maps every file to its path relative to the root.
#[derive(Debug, Clone)]
pub struct NameMapper {
    root: PathBuf,
    root_is_file: bool,
}

impl NameMapper {
    /// Stat `root` and build a mapper for it. Fails with `NotFound` when the root does
    /// not exist.
    pub fn for_root(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let meta = std::fs::metadata(root).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransferError::NotFound(format!("local path {}", root.display()))
            } else {
                TransferError::local(root, e)
            }
        })?;
        Ok(Self { root: root.to_path_buf(), root_is_file: !meta.is_dir() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn root_is_file(&self) -> bool {
        self.root_is_file
    }

    /// Object key for `file`, which must live under the root.
    pub fn remote_key(&self, file: &Path) -> Result<String> {
        if self.root_is_file {
            return file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    TransferError::Validation(format!("{} has no file name", file.display()))
                });
        }

        let relative = file.strip_prefix(&self.root).map_err(|_| {
            TransferError::Validation(format!(
                "{} is not under {}",
                file.display(),
                self.root.display()
            ))
        })?;

        let key = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        if key.is_empty() {
            return Err(TransferError::Validation(format!(
                "{} maps to an empty key",
                file.display()
            )));
        }
        Ok(key)
    }
}

/// One-shot form of [`NameMapper::remote_key`].
pub fn local_to_remote_key(file_path: impl AsRef<Path>, root_prefix: impl AsRef<Path>) -> Result<String> {
    NameMapper::for_root(root_prefix)?.remote_key(file_path.as_ref())
}

/// Local destination for `key` under `root_dir`. Directories are not created.
///
/// Keys with `..` segments are refused since they would land outside `root_dir`.
pub fn remote_key_to_local_path(root_dir: impl AsRef<Path>, key: &str) -> Result<PathBuf> {
    let mut path = root_dir.as_ref().to_path_buf();
    let mut pushed = false;
    for segment in key.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(TransferError::Validation(format!(
                    "object key {key:?} escapes the download root"
                )));
            }
            s => {
                path.push(s);
                pushed = true;
            }
        }
    }
    if !pushed {
        return Err(TransferError::Validation(format!("object key {key:?} has no name segments")));
    }
    Ok(path)
}
