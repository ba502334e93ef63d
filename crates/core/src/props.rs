//! Property maps
//!
//! Revisions, transactions, and nodes all carry a map of named byte
//! values. Keys are UTF-8 strings compared byte-exact; values are
//! arbitrary bytes. A `BTreeMap` keeps serialization deterministic.

use std::collections::BTreeMap;

/// Property map: name → raw bytes
pub type PropMap = BTreeMap<String, Vec<u8>>;

/// Creation / commit datestamp, RFC-3339
///
/// Stamped on every new transaction so abandoned transactions can be
/// aged by operators; overwritten with the commit date when the
/// transaction becomes a revision.
pub const PROP_REVISION_DATE: &str = "tsr:date";

/// Commit log message
pub const PROP_REVISION_LOG: &str = "tsr:log";

/// Committing author
pub const PROP_REVISION_AUTHOR: &str = "tsr:author";

/// Apply a single mutation to a property map
///
/// A `None` value removes the property; anything else replaces it.
pub fn set_prop(props: &mut PropMap, name: &str, value: Option<&[u8]>) {
    match value {
        Some(v) => {
            props.insert(name.to_string(), v.to_vec());
        }
        None => {
            props.remove(name);
        }
    }
}
