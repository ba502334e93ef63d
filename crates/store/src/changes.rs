//! Path-change logs
//!
//! Every mutation through a transaction root appends one line to the
//! transaction's `changes` file; at commit the folded log is copied
//! into the revision file so reporting layers can answer "what changed
//! in revision N" without tree comparison. Line format:
//!
//! ```text
//! <action> <node-rev-id> <path>\n
//! ```
//!
//! Paths may contain spaces (the id never does), so parsing splits on
//! the first two spaces only.

use std::collections::BTreeMap;
use tessera_core::{Error, NodeRevisionId, Result};

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Path was created
    Add,
    /// Path content or properties were rewritten
    Modify,
    /// Path was removed
    Delete,
    /// Path was removed and re-created within one transaction
    Replace,
}

impl ChangeAction {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Modify => "modify",
            ChangeAction::Delete => "delete",
            ChangeAction::Replace => "replace",
        }
    }

    fn from_str_token(s: &str) -> Option<Self> {
        match s {
            "add" => Some(ChangeAction::Add),
            "modify" => Some(ChangeAction::Modify),
            "delete" => Some(ChangeAction::Delete),
            "replace" => Some(ChangeAction::Replace),
            _ => None,
        }
    }
}

/// One entry of a change log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    /// Repository path, normalized without a leading slash
    pub path: String,
    /// Node revision the change produced (for deletes: the node that
    /// was removed)
    pub node_id: NodeRevisionId,
    /// The change kind
    pub action: ChangeAction,
}

impl ChangedPath {
    /// Serialize to one log line
    pub fn to_line(&self) -> String {
        format!("{} {} {}\n", self.action.as_str(), self.node_id, self.path)
    }

    /// Parse one log line (without the trailing newline)
    pub fn from_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(3, ' ');
        let action = fields
            .next()
            .and_then(ChangeAction::from_str_token)
            .ok_or_else(|| corrupt(line))?;
        let node_id = fields
            .next()
            .and_then(NodeRevisionId::from_string)
            .ok_or_else(|| corrupt(line))?;
        let path = fields.next().ok_or_else(|| corrupt(line))?;
        if path.is_empty() {
            return Err(corrupt(line));
        }
        Ok(ChangedPath {
            path: path.to_string(),
            node_id,
            action,
        })
    }
}

fn corrupt(line: &str) -> Error {
    Error::CorruptHashFile {
        details: format!("malformed change line {:?}", line),
    }
}

/// Serialize a change log
pub fn to_bytes(changes: &[ChangedPath]) -> Vec<u8> {
    let mut out = Vec::new();
    for change in changes {
        out.extend_from_slice(change.to_line().as_bytes());
    }
    out
}

/// Parse a change log
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<ChangedPath>> {
    let text = std::str::from_utf8(bytes).map_err(|_| corrupt("<binary>"))?;
    text.lines().map(ChangedPath::from_line).collect()
}

/// Fold a raw log into one net change per path
///
/// Successive changes to one path combine: add+modify stays add,
/// add+delete cancels out, delete+add becomes replace. Output is
/// ordered by path.
pub fn fold(changes: Vec<ChangedPath>) -> Vec<ChangedPath> {
    let mut folded: BTreeMap<String, ChangedPath> = BTreeMap::new();

    for change in changes {
        match folded.remove(&change.path) {
            None => {
                folded.insert(change.path.clone(), change);
            }
            Some(prev) => {
                use ChangeAction::*;
                let net = match (prev.action, change.action) {
                    (Add, Delete) => None,
                    (Add, _) => Some(Add),
                    (Replace, Delete) | (Modify, Delete) | (Delete, Delete) => Some(Delete),
                    (Replace, _) => Some(Replace),
                    (Delete, _) => Some(Replace),
                    (Modify, _) => Some(change.action),
                };
                if let Some(action) = net {
                    folded.insert(
                        change.path.clone(),
                        ChangedPath {
                            path: change.path,
                            node_id: change.node_id,
                            action,
                        },
                    );
                }
            }
        }
    }

    folded.into_values().collect()
}
