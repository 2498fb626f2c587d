//! The weave: an ordered sequence of character atoms with per-position
//! tombstone buckets.
//!
//! Position 0 is always the base atom, which anchors inserts at the start of
//! the document and is never deleted or re-styled. Deleting the atom at
//! position `p` removes it from the sequence and folds its id — together with
//! its own bucket — into the bucket of the atom at `p - 1`, so deleted ids
//! stay addressable at the position they vanished from (co-tombstone
//! addressing).

use crate::clock::Id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

pub mod nav;

pub use nav::{CharRef, Located, Wrap};

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum WeaveError {
    #[error("OUT_OF_BOUNDS: {0}")]
    OutOfBounds(i64),
    #[error("BASE_ATOM")]
    BaseAtom,
    #[error("RANGE_ORDER")]
    RangeOrder,
    #[error("UNKNOWN_REF: {0}")]
    UnknownRef(String),
}

// ── Attributes ─────────────────────────────────────────────────────────────

/// Per-atom rich-text attributes: name → non-empty value. The map is
/// replaced wholesale, never mutated in place.
pub type AttrMap = Map<String, Value>;

/// Values that normalization drops.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Copy `attrs` with falsy values dropped; an empty result is stored as no
/// attributes.
pub fn normalize_attrs(attrs: Option<&AttrMap>) -> Option<AttrMap> {
    let kept: AttrMap = attrs?
        .iter()
        .filter(|(_, v)| !is_falsy(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}

// ── Atom ───────────────────────────────────────────────────────────────────

/// One character plus its primary id, tombstone bucket, and optional
/// attributes. `ch` is `None` only for the base atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: Id,
    pub ch: Option<char>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub deleted_ids: BTreeSet<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<AttrMap>,
}

impl Atom {
    fn base() -> Self {
        Atom {
            id: Id::base(),
            ch: None,
            deleted_ids: BTreeSet::new(),
            attrs: None,
        }
    }
}

// ── Weave ──────────────────────────────────────────────────────────────────

/// The ordered sequence of live atoms held by a replica.
///
/// Each weave owns its own base atom instance, so buckets are never shared
/// across weaves. Serialization is the transparent atom sequence; id strings
/// round-trip bit-exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weave {
    atoms: Vec<Atom>,
}

impl Default for Weave {
    fn default() -> Self {
        Self::new()
    }
}

impl Weave {
    pub fn new() -> Self {
        Weave {
            atoms: vec![Atom::base()],
        }
    }

    /// Number of live atoms, the base atom included. Always at least 1.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Atom at position `p`.
    pub fn get_char(&self, p: usize) -> Result<&Atom, WeaveError> {
        self.atoms.get(p).ok_or(WeaveError::OutOfBounds(p as i64))
    }

    /// All live atoms in weave order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Splice a fresh live atom at `p` with normalized attributes and an
    /// empty bucket. Position 0 is reserved for the base atom.
    pub fn insert_char(
        &mut self,
        p: usize,
        ch: char,
        id: Id,
        attrs: Option<&AttrMap>,
    ) -> Result<(), WeaveError> {
        if p == 0 || p > self.atoms.len() {
            return Err(WeaveError::OutOfBounds(p as i64));
        }
        self.atoms.insert(
            p,
            Atom {
                id,
                ch: Some(ch),
                deleted_ids: BTreeSet::new(),
                attrs: normalize_attrs(attrs),
            },
        );
        Ok(())
    }

    /// Remove the atom at `p`, folding its id and bucket into the bucket of
    /// the atom at `p - 1`.
    pub fn delete_char(&mut self, p: usize) -> Result<(), WeaveError> {
        if p == 0 || p >= self.atoms.len() {
            return Err(WeaveError::OutOfBounds(p as i64));
        }
        let atom = self.atoms.remove(p);
        let bucket = &mut self.atoms[p - 1].deleted_ids;
        bucket.extend(atom.deleted_ids);
        bucket.insert(atom.id);
        Ok(())
    }

    /// Replace the attributes of the atom at `p` with a normalized copy.
    /// The base atom's attributes are fixed.
    pub fn set_char_attr(&mut self, p: usize, attrs: Option<&AttrMap>) -> Result<(), WeaveError> {
        if p == 0 {
            return Err(WeaveError::BaseAtom);
        }
        if p >= self.atoms.len() {
            return Err(WeaveError::OutOfBounds(p as i64));
        }
        self.atoms[p].attrs = normalize_attrs(attrs);
        Ok(())
    }

    /// True when the atom at `p` is `id` or, with `include_deleted`, its
    /// bucket holds `id`.
    pub fn matches_one(&self, p: usize, id: &Id, include_deleted: bool) -> bool {
        match self.atoms.get(p) {
            Some(atom) => atom.id == *id || (include_deleted && atom.deleted_ids.contains(id)),
            None => false,
        }
    }

    /// True when any id in `ids` hits the atom at `p` per `matches_one`.
    pub fn matches_any(&self, p: usize, ids: &BTreeSet<Id>, include_deleted: bool) -> bool {
        match self.atoms.get(p) {
            Some(atom) => {
                ids.contains(&atom.id) || (include_deleted && !atom.deleted_ids.is_disjoint(ids))
            }
            None => false,
        }
    }

    /// Number of ids from `ids` hitting the atom at `p`: the primary id
    /// (0 or 1) plus, with `include_deleted`, the bucket intersection.
    pub fn match_count(&self, p: usize, ids: &BTreeSet<Id>, include_deleted: bool) -> usize {
        let Some(atom) = self.atoms.get(p) else {
            return 0;
        };
        let primary = usize::from(ids.contains(&atom.id));
        if include_deleted {
            primary + atom.deleted_ids.intersection(ids).count()
        } else {
            primary
        }
    }

    /// First position whose atom matches `id`.
    pub fn index_of(&self, id: &Id, include_deleted: bool) -> Option<usize> {
        (0..self.atoms.len()).find(|&p| self.matches_one(p, id, include_deleted))
    }

    /// True when `id` is present anywhere, as a primary id or a tombstone.
    pub fn contains_id(&self, id: &Id) -> bool {
        self.index_of(id, true).is_some()
    }

    /// Concatenation of the characters of all live atoms.
    pub fn text(&self) -> String {
        self.atoms.iter().filter_map(|a| a.ch).collect()
    }
}
