//! Static LSP configuration ingestion.
//!
//! Configuration changes arrive as keyed SET/DEL entries:
//!
//! - key `<in_label>|<nexthop>` or `<vrf>:<in_label>|<nexthop>`
//! - SET carries the field `out_label`
//!
//! Entries for the same key are coalesced before they are applied.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::error::{MplsError, Result};
use crate::label::MplsLabel;
use crate::nexthop::NexthopDescriptor;
use crate::vrf::{VrfId, DEFAULT_VRF};

/// Field carrying the outgoing label of a SET entry.
pub const FIELD_OUT_LABEL: &str = "out_label";

/// Entry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Add or update.
    Set,
    /// Delete.
    Del,
}

impl Operation {
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair.
pub type FieldValue = (String, String);

/// Raw configuration entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspConfigEntry {
    /// Entry key, see the module docs.
    pub key: String,
    pub op: Operation,
    /// Field-value pairs (empty for DEL).
    pub fvs: Vec<FieldValue>,
}

impl LspConfigEntry {
    /// Creates a SET entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Set,
            fvs,
        }
    }

    /// Creates a DEL entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Del,
            fvs: Vec::new(),
        }
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Parses the entry into a typed task.
    pub fn to_task(&self) -> Result<StaticLspTask> {
        let key: StaticLspKey = self.key.parse()?;
        let action = match self.op {
            Operation::Del => StaticLspAction::Del,
            Operation::Set => {
                let raw = self.get_field(FIELD_OUT_LABEL).ok_or_else(|| {
                    MplsError::invalid_config(FIELD_OUT_LABEL, format!("missing for {}", self.key))
                })?;
                StaticLspAction::Set {
                    out_label: MplsLabel::parse_out_label(raw, key.nexthop.family())?,
                }
            }
        };
        Ok(StaticLspTask { key, action })
    }
}

/// Identity of a static definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StaticLspKey {
    pub vrf: VrfId,
    pub in_label: MplsLabel,
    pub nexthop: NexthopDescriptor,
}

impl StaticLspKey {
    pub fn new(vrf: VrfId, in_label: MplsLabel, nexthop: NexthopDescriptor) -> Self {
        Self {
            vrf,
            in_label,
            nexthop,
        }
    }
}

impl FromStr for StaticLspKey {
    type Err = MplsError;

    fn from_str(s: &str) -> Result<Self> {
        let (label_part, nexthop_part) = s
            .split_once('|')
            .ok_or_else(|| MplsError::invalid_config("key", format!("missing '|' in {}", s)))?;

        let (vrf, label_part) = match label_part.split_once(':') {
            Some((vrf, rest)) => {
                let vrf = vrf.trim().parse::<VrfId>().map_err(|_| {
                    MplsError::invalid_config("key", format!("invalid VRF id in {}", s))
                })?;
                (vrf, rest)
            }
            None => (DEFAULT_VRF, label_part),
        };

        Ok(Self {
            vrf,
            in_label: label_part.parse()?,
            nexthop: nexthop_part.parse()?,
        })
    }
}

impl fmt::Display for StaticLspKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vrf == DEFAULT_VRF {
            write!(f, "{}|{}", self.in_label.value(), self.nexthop)
        } else {
            write!(f, "{}:{}|{}", self.vrf, self.in_label.value(), self.nexthop)
        }
    }
}

/// What to do with a static definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticLspAction {
    Set { out_label: MplsLabel },
    Del,
}

/// A parsed configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLspTask {
    pub key: StaticLspKey,
    pub action: StaticLspAction,
}

impl StaticLspTask {
    /// Builds the SET entry for a static definition.
    pub fn set_entry(key: &StaticLspKey, out_label: MplsLabel) -> LspConfigEntry {
        LspConfigEntry::set(
            key.to_string(),
            vec![(FIELD_OUT_LABEL.to_string(), out_label.to_string())],
        )
    }
}

/// Pending configuration changes, coalesced per key.
///
/// - DEL drops any pending SET for the key
/// - SET after SET merges fields, newer values win
/// - DEL then SET keeps both, in order
#[derive(Debug, Default)]
pub struct StaticLspConsumer {
    to_sync: BTreeMap<String, VecDeque<LspConfigEntry>>,
    pending_count: usize,
}

impl StaticLspConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there are pending entries.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Queues entries.
    pub fn add_to_sync(&mut self, entries: Vec<LspConfigEntry>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: LspConfigEntry) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                self.pending_count -= queue.len();
                queue.clear();
                queue.push_back(entry);
                self.pending_count += 1;
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op == Operation::Set {
                        for (field, value) in entry.fvs {
                            match last.fvs.iter_mut().find(|(f, _)| *f == field) {
                                Some(existing) => existing.1 = value,
                                None => last.fvs.push((field, value)),
                            }
                        }
                        return;
                    }
                }
                queue.push_back(entry);
                self.pending_count += 1;
            }
        }
    }

    /// Drains all pending entries, ordered by key then arrival.
    pub fn drain(&mut self) -> Vec<LspConfigEntry> {
        let mut result = Vec::with_capacity(self.pending_count);
        for (_key, queue) in std::mem::take(&mut self.to_sync) {
            result.extend(queue);
        }
        self.pending_count = 0;
        result
    }

    /// Peeks at pending entries without removing them.
    pub fn peek(&self) -> impl Iterator<Item = &LspConfigEntry> {
        self.to_sync.values().flat_map(|q| q.iter())
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.peek()
            .map(|e| {
                let op = if e.op.is_set() { "SET" } else { "DEL" };
                format!("{}: {} {:?}", e.key, op, e.fvs)
            })
            .collect()
    }
}
