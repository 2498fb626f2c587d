//! OT delta records and the bridge between deltas and replicated ops.
//!
//! A delta is an ordered list of retain / insert / delete records walking
//! 1-based visible positions; the base atom is implicit. [`Replica::apply_delta`]
//! lowers a delta from an OT editor onto the engine, and the `delta_from_*`
//! methods derive the delta a mirroring editor should apply for a
//! just-applied op.

use crate::clock::{ClockSource, Id, IdSequence};
use crate::engine::{InsertRun, Op, OpEnvelope, OpSpec, Replica};
use crate::weave::{AttrMap, WeaveError};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// ── Records ────────────────────────────────────────────────────────────────

/// One OT delta record. Retain records may carry attributes, the shape
/// rich-text editors emit when a range is re-styled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeltaOp {
    Retain {
        retain: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<AttrMap>,
    },
    Insert {
        insert: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<AttrMap>,
    },
    Delete {
        delete: usize,
    },
}

/// An edit script over visible positions.
pub type Delta = Vec<DeltaOp>;

impl DeltaOp {
    pub fn retain(n: usize) -> Self {
        DeltaOp::Retain {
            retain: n,
            attributes: None,
        }
    }

    pub fn insert(s: impl Into<String>) -> Self {
        DeltaOp::Insert {
            insert: s.into(),
            attributes: None,
        }
    }

    pub fn delete(n: usize) -> Self {
        DeltaOp::Delete { delete: n }
    }
}

/// Append a record, merging it into the previous one when both are the same
/// kind with the same attributes.
fn append(delta: &mut Delta, rec: DeltaOp) {
    match (delta.last_mut(), &rec) {
        (
            Some(DeltaOp::Retain {
                retain: n,
                attributes: a,
            }),
            DeltaOp::Retain {
                retain: m,
                attributes: b,
            },
        ) if a == b => {
            *n += m;
            return;
        }
        (
            Some(DeltaOp::Insert {
                insert: s,
                attributes: a,
            }),
            DeltaOp::Insert {
                insert: t,
                attributes: b,
            },
        ) if a == b => {
            s.push_str(t);
            return;
        }
        (Some(DeltaOp::Delete { delete: n }), DeltaOp::Delete { delete: m }) => {
            *n += m;
            return;
        }
        _ => {}
    }
    delta.push(rec);
}

/// Apply a delta to a plain string, mirroring the edit an editor would make.
pub fn apply(text: &str, delta: &Delta) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut idx = 0usize;
    for rec in delta {
        match rec {
            DeltaOp::Retain { retain, .. } => {
                let end = (idx + retain).min(chars.len());
                out.extend(&chars[idx..end]);
                idx = end;
            }
            DeltaOp::Insert { insert, .. } => out.push_str(insert),
            DeltaOp::Delete { delete } => idx = (idx + delete).min(chars.len()),
        }
    }
    out.extend(&chars[idx..]);
    out
}

// ── Delta → ops ────────────────────────────────────────────────────────────

impl<C: ClockSource> Replica<C> {
    /// Lower a delta onto the engine.
    ///
    /// The walk collects one remove set, one insert map, and one attribute
    /// map against current weave positions, then applies remove before
    /// insert — so insert anchors still resolve to live or freshly
    /// tombstoned ids — and attribute changes last. Returns the applied ops
    /// in application order for broadcast.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<Vec<OpEnvelope>, WeaveError> {
        let mut cursor = 1usize;
        let mut ins: IndexMap<Id, InsertRun> = IndexMap::new();
        let mut rm: BTreeSet<Id> = BTreeSet::new();
        let mut styles: IndexMap<Id, AttrMap> = IndexMap::new();
        for rec in delta {
            match rec {
                DeltaOp::Retain {
                    retain,
                    attributes: None,
                } => cursor += retain,
                DeltaOp::Retain {
                    retain,
                    attributes: Some(attrs),
                } => {
                    for j in 0..*retain {
                        let atom = self.weave().get_char(cursor + j)?;
                        // Replacement is wholesale, so merge the record over
                        // the atom's current attributes; nulls drop keys at
                        // normalization.
                        let mut merged = atom.attrs.clone().unwrap_or_default();
                        for (k, v) in attrs {
                            merged.insert(k.clone(), v.clone());
                        }
                        styles.insert(atom.id.clone(), merged);
                    }
                    cursor += retain;
                }
                DeltaOp::Insert { insert, attributes } => {
                    let anchor = self.weave().get_char(cursor - 1)?.id.clone();
                    match ins.entry(anchor) {
                        Entry::Occupied(mut entry) => entry.get_mut().value.push_str(insert),
                        Entry::Vacant(entry) => {
                            entry.insert(InsertRun {
                                value: insert.clone(),
                                attributes: attributes.clone(),
                            });
                        }
                    }
                }
                DeltaOp::Delete { delete } => {
                    for j in 0..*delete {
                        rm.insert(self.weave().get_char(cursor + j)?.id.clone());
                    }
                    cursor += delete;
                }
            }
        }

        let mut applied = Vec::new();
        if !rm.is_empty() {
            applied.push(self.rm_chars(rm)?);
        }
        if !ins.is_empty() {
            let spec = self.local_spec();
            self.insert(&spec, &ins)?;
            applied.push(OpEnvelope {
                spec,
                op: Op::Insert { refs: ins },
            });
        }
        if !styles.is_empty() {
            applied.push(self.format_chars(styles)?);
        }
        Ok(applied)
    }

    // ── Ops → delta ────────────────────────────────────────────────────────

    /// Derive the mirror delta for any just-applied op envelope.
    pub fn delta_from_op(&self, envelope: &OpEnvelope) -> Delta {
        match &envelope.op {
            Op::Insert { refs } => self.delta_from_insert(&envelope.spec, refs),
            Op::Remove { ids } => self.delta_from_remove(ids),
            Op::SetAttributes { entries } => self.delta_from_set_attributes(entries),
        }
    }

    /// Derive the delta mirroring a just-applied insert op: a retain /
    /// insert pair per inserted run, in weave order. Values and attributes
    /// are read off the weave, so partially applied ops yield exactly what
    /// landed.
    pub fn delta_from_insert(&self, spec: &OpSpec, refs: &IndexMap<Id, InsertRun>) -> Delta {
        let total: usize = refs.values().map(|run| run.value.chars().count()).sum();
        let mut ids = IdSequence::new(&spec.body, &spec.ext);
        let generated: HashSet<Id> = (0..total).map(|_| ids.next_id()).collect();

        let atoms = self.weave().atoms();
        let mut delta = Delta::new();
        let mut gap = 0usize;
        let mut emitted = 0usize;
        let mut p = 1;
        while p < atoms.len() && emitted < total {
            if generated.contains(&atoms[p].id) {
                let attrs = atoms[p].attrs.clone();
                let mut value = String::new();
                while p < atoms.len() && generated.contains(&atoms[p].id) && atoms[p].attrs == attrs
                {
                    value.extend(atoms[p].ch);
                    emitted += 1;
                    p += 1;
                }
                if gap > 0 {
                    append(&mut delta, DeltaOp::retain(gap));
                    gap = 0;
                }
                append(
                    &mut delta,
                    DeltaOp::Insert {
                        insert: value,
                        attributes: attrs,
                    },
                );
            } else {
                gap += 1;
                p += 1;
            }
        }
        delta
    }

    /// Derive the delta mirroring a just-applied remove op. The removed ids
    /// are found in tombstone buckets; each bucket hit deletes as many
    /// visible positions as it matched.
    pub fn delta_from_remove(&self, ids: &BTreeSet<Id>) -> Delta {
        let total = ids.len();
        let mut delta = Delta::new();
        let mut gap = 0usize;
        let mut found = 0usize;
        for p in 0..self.weave().len() {
            if p > 0 {
                gap += 1;
            }
            let count = self.weave().match_count(p, ids, true);
            if count > 0 {
                if gap > 0 {
                    append(&mut delta, DeltaOp::retain(gap));
                    gap = 0;
                }
                append(&mut delta, DeltaOp::delete(count));
                found += count;
                if found >= total {
                    break;
                }
            }
        }
        delta
    }

    /// Derive the delta mirroring a just-applied setAttributes op. Entries
    /// pass through raw, so explicit nulls reach merge-based editors as
    /// removals.
    pub fn delta_from_set_attributes(&self, entries: &IndexMap<Id, AttrMap>) -> Delta {
        let mut delta = Delta::new();
        let mut gap = 0usize;
        let mut found = 0usize;
        for atom in &self.weave().atoms()[1..] {
            match entries.get(&atom.id) {
                Some(attrs) => {
                    if gap > 0 {
                        append(&mut delta, DeltaOp::retain(gap));
                        gap = 0;
                    }
                    append(
                        &mut delta,
                        DeltaOp::Retain {
                            retain: 1,
                            attributes: Some(attrs.clone()),
                        },
                    );
                    found += 1;
                    if found == entries.len() {
                        break;
                    }
                }
                None => gap += 1,
            }
        }
        delta
    }
}
