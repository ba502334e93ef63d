//! Working-copy administrative area
//!
//! Every versioned directory carries a `.tsr/` administrative area:
//!
//! ```text
//! dir/.tsr/
//! ├── entries            hash-file: entry name -> nested entry record
//! ├── lock               scoped administrative lock (present = locked)
//! └── text-base/<name>   pristine copy of each versioned file
//! ```
//!
//! The `entries` file maps each versioned name to a nested hash-file
//! with the keys `kind`, `revision`, `url`, `schedule`. The empty name
//! is the directory's own entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tessera_core::{Error, NodeKind, PropMap, Result, Revnum};
use tessera_store::{atomic::write_atomic, hashfile};

/// Name of the administrative directory
pub const ADM_DIR: &str = ".tsr";

/// Entry name of the directory itself
pub const THIS_DIR: &str = "";

/// Scheduled state of a working-copy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Schedule {
    /// Tracked, nothing pending
    Normal,
    /// Scheduled for addition at the next commit
    Add,
    /// Scheduled for deletion at the next commit
    Delete,
}

impl Schedule {
    fn as_str(&self) -> &'static str {
        match self {
            Schedule::Normal => "normal",
            Schedule::Add => "add",
            Schedule::Delete => "delete",
        }
    }

    fn from_str_token(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Schedule::Normal),
            "add" => Some(Schedule::Add),
            "delete" => Some(Schedule::Delete),
            _ => None,
        }
    }
}

/// One versioned entry in a working-copy directory
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    /// Node kind recorded at checkout/update time
    pub kind: NodeKind,
    /// Base revision this entry was last updated to
    pub revision: Revnum,
    /// Repository URL this entry tracks
    pub url: Option<String>,
    /// Pending schedule
    pub schedule: Schedule,
}

impl Entry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut record = PropMap::new();
        record.insert("kind".to_string(), self.kind.as_str().as_bytes().to_vec());
        record.insert(
            "revision".to_string(),
            self.revision.to_string().into_bytes(),
        );
        if let Some(url) = &self.url {
            record.insert("url".to_string(), url.as_bytes().to_vec());
        }
        record.insert(
            "schedule".to_string(),
            self.schedule.as_str().as_bytes().to_vec(),
        );
        hashfile::to_bytes(&record)
    }

    fn from_bytes(bytes: &[u8], name: &str) -> Result<Self> {
        let corrupt = |details: &str| Error::CorruptHashFile {
            details: format!("entry '{}': {}", name, details),
        };

        let mut record = hashfile::from_bytes(bytes)?;
        let mut take_str = |key: &str| -> Result<Option<String>> {
            match record.remove(key) {
                None => Ok(None),
                Some(bytes) => String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|_| corrupt(&format!("binary {}", key))),
            }
        };

        let kind = take_str("kind")?
            .as_deref()
            .and_then(NodeKind::from_str_token)
            .ok_or_else(|| corrupt("missing or unknown kind"))?;
        let revision = take_str("revision")?
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt("missing or malformed revision"))?;
        let url = take_str("url")?;
        let schedule = take_str("schedule")?
            .as_deref()
            .and_then(Schedule::from_str_token)
            .ok_or_else(|| corrupt("missing or unknown schedule"))?;

        Ok(Entry {
            kind,
            revision,
            url,
            schedule,
        })
    }
}

/// Entries of one working-copy directory, keyed by name
pub type Entries = BTreeMap<String, Entry>;

/// Path of a directory's administrative area
pub fn adm_dir(dir: &Path) -> PathBuf {
    dir.join(ADM_DIR)
}

/// Path of the entries file
pub fn entries_file(dir: &Path) -> PathBuf {
    adm_dir(dir).join("entries")
}

/// Path of the pristine copy of a versioned file
pub fn text_base_path(dir: &Path, name: &str) -> PathBuf {
    adm_dir(dir).join("text-base").join(name)
}

/// True if `dir` carries an administrative area
pub fn is_versioned(dir: &Path) -> bool {
    entries_file(dir).exists()
}

/// Read the entries of a versioned directory
///
/// # Errors
/// Returns [`Error::EntryNotFound`] if `dir` has no administrative
/// area.
pub fn read_entries(dir: &Path) -> Result<Entries> {
    let bytes = std::fs::read(entries_file(dir)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::EntryNotFound {
                path: dir.to_path_buf(),
            }
        } else {
            Error::from(e)
        }
    })?;

    let raw = hashfile::from_bytes(&bytes)?;
    let mut entries = Entries::new();
    for (name, value) in raw {
        let entry = Entry::from_bytes(&value, &name)?;
        entries.insert(name, entry);
    }
    Ok(entries)
}

/// Atomically rewrite the entries of a directory, creating the
/// administrative area if needed
pub fn write_entries(dir: &Path, entries: &Entries) -> Result<()> {
    std::fs::create_dir_all(adm_dir(dir))?;
    let mut raw = PropMap::new();
    for (name, entry) in entries {
        raw.insert(name.clone(), entry.to_bytes());
    }
    write_atomic(&entries_file(dir), &hashfile::to_bytes(&raw))?;
    Ok(())
}

/// Look up the entry for `path` without walking the whole tree
///
/// A versioned directory answers with its own (`THIS_DIR`) entry; any
/// other path is looked up in its parent's entries. Returns None for
/// unversioned paths.
pub fn read_entry(path: &Path) -> Result<Option<Entry>> {
    if is_versioned(path) {
        return Ok(read_entries(path)?.get(THIS_DIR).cloned());
    }
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(None);
    };
    if !is_versioned(parent) {
        return Ok(None);
    }
    let name = name.to_string_lossy();
    Ok(read_entries(parent)?.get(name.as_ref()).cloned())
}

/// Split an operand into (anchor, target)
///
/// A versioned directory is its own anchor with an empty target;
/// anything else anchors at its parent with its basename as target.
///
/// # Errors
/// Returns [`Error::EntryNotFound`] if neither the path nor its parent
/// is versioned.
pub fn anchor_target(path: &Path) -> Result<(PathBuf, String)> {
    if is_versioned(path) {
        return Ok((path.to_path_buf(), String::new()));
    }
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(Error::EntryNotFound {
            path: path.to_path_buf(),
        });
    };
    if !is_versioned(parent) {
        return Err(Error::EntryNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok((parent.to_path_buf(), name.to_string_lossy().into_owned()))
}
