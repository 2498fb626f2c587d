//! The three replicated operations and their wire envelope.

use crate::clock::Id;
use crate::weave::AttrMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ── OpSpec ─────────────────────────────────────────────────────────────────

/// Originating-id parts of an op: `body` is the timestamp portion
/// (sub-sequence suffix included when present), `ext` the source portion.
/// Sufficient to reconstruct every id the op generates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSpec {
    pub body: String,
    pub ext: String,
}

impl OpSpec {
    pub fn new(body: impl Into<String>, ext: impl Into<String>) -> Self {
        OpSpec {
            body: body.into(),
            ext: ext.into(),
        }
    }

    /// The id the parts join into: the op's own id, and the pivot of the
    /// concurrent-insertion tie-break.
    pub fn id(&self) -> Id {
        Id::new(&self.body, &self.ext)
    }
}

impl From<&Id> for OpSpec {
    fn from(id: &Id) -> Self {
        OpSpec::new(id.body(), id.ext())
    }
}

// ── InsertRun ──────────────────────────────────────────────────────────────

/// Characters to insert after one reference id, with optional attributes
/// applied to every character of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRun {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttrMap>,
}

impl InsertRun {
    pub fn new(value: impl Into<String>) -> Self {
        InsertRun {
            value: value.into(),
            attributes: None,
        }
    }

    pub fn with_attributes(value: impl Into<String>, attributes: AttrMap) -> Self {
        InsertRun {
            value: value.into(),
            attributes: Some(attributes),
        }
    }
}

// ── Op ─────────────────────────────────────────────────────────────────────

/// A replicated operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
    /// Splice runs of characters after the referenced atoms, live or
    /// tombstoned.
    Insert { refs: IndexMap<Id, InsertRun> },
    /// Fold the referenced atoms into their predecessors' buckets.
    Remove { ids: BTreeSet<Id> },
    /// Replace the attributes of the referenced live atoms wholesale.
    SetAttributes { entries: IndexMap<Id, AttrMap> },
}

impl Op {
    /// Short mnemonic name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Insert { .. } => "insert",
            Op::Remove { .. } => "remove",
            Op::SetAttributes { .. } => "setAttributes",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            Op::Insert { refs } => {
                for (id, run) in refs {
                    write!(f, " {{ {} ← {:?} }}", id, run.value)?;
                }
                Ok(())
            }
            Op::Remove { ids } => {
                let ids: Vec<_> = ids.iter().map(Id::as_str).collect();
                write!(f, " {{ {} }}", ids.join(", "))
            }
            Op::SetAttributes { entries } => {
                let keys: Vec<_> = entries.keys().map(Id::as_str).collect();
                write!(f, " {{ {} }}", keys.join(", "))
            }
        }
    }
}

// ── OpEnvelope ─────────────────────────────────────────────────────────────

/// A spec'd op: the unit a replication layer broadcasts and delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpEnvelope {
    pub spec: OpSpec,
    pub op: Op,
}
