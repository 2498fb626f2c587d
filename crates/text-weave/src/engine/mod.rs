//! The operation engine: a single replica applying replicated ops against
//! its weave.
//!
//! Local mutators mint a fresh op spec from the clock, apply through the
//! same entry points remote delivery uses, and return the applied
//! [`OpEnvelope`] for the caller's replication layer to broadcast. Final
//! weave state depends only on the set of ops applied, not their delivery
//! order, provided each op's referenced ids are already present — live or
//! tombstoned — when it is applied.

pub mod operations;

pub use operations::{InsertRun, Op, OpEnvelope, OpSpec};

use crate::clock::{ClockSource, Id, IdSequence, LamportClock};
use crate::weave::{Atom, AttrMap, CharRef, Located, Weave, WeaveError, Wrap};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;

// ── Replica ────────────────────────────────────────────────────────────────

/// One collaborating replica: a weave plus the clock that mints its ids.
#[derive(Debug, Clone)]
pub struct Replica<C: ClockSource = LamportClock> {
    weave: Weave,
    clock: C,
    source: String,
}

impl Replica<LamportClock> {
    /// A replica with a fresh Lamport clock.
    pub fn new(source: impl Into<String>) -> Self {
        Replica::with_clock(source, LamportClock::new())
    }
}

impl<C: ClockSource> Replica<C> {
    pub fn with_clock(source: impl Into<String>, clock: C) -> Self {
        Replica {
            weave: Weave::new(),
            clock,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn weave(&self) -> &Weave {
        &self.weave
    }

    /// Concatenation of all live characters.
    pub fn text(&self) -> String {
        self.weave.text()
    }

    /// Number of live atoms, the base atom included.
    pub fn len(&self) -> usize {
        self.weave.len()
    }

    // ── Observation queries ────────────────────────────────────────────────

    pub fn get_char_at(&self, p: usize) -> Result<&Atom, WeaveError> {
        self.weave.get_char(p)
    }

    pub fn index_of(&self, id: &Id, include_deleted: bool) -> Option<usize> {
        self.weave.index_of(id, include_deleted)
    }

    pub fn get_char_relative_to(
        &self,
        char_ref: &CharRef,
        relative: i64,
        wrap: Wrap,
    ) -> Result<Located<'_>, WeaveError> {
        self.weave.get_char_relative_to(char_ref, relative, wrap)
    }

    pub fn get_text_range(
        &self,
        from: &CharRef,
        to: Option<&CharRef>,
    ) -> Result<Vec<&Atom>, WeaveError> {
        self.weave.get_text_range(from, to)
    }

    pub fn compare_char_pos(&self, a: &CharRef, b: &CharRef) -> Result<Ordering, WeaveError> {
        self.weave.compare_char_pos(a, b)
    }

    // ── Replicated entry points ────────────────────────────────────────────

    /// Deliver a remote op envelope through the matching entry point.
    pub fn apply(&mut self, envelope: &OpEnvelope) -> Result<(), WeaveError> {
        match &envelope.op {
            Op::Insert { refs } => self.insert(&envelope.spec, refs),
            Op::Remove { ids } => self.remove(&envelope.spec, ids),
            Op::SetAttributes { entries } => self.set_attributes(&envelope.spec, entries),
        }
    }

    /// Apply an insert op: for each reference id, splice the run's
    /// characters after the referenced atom, live or tombstoned.
    ///
    /// Among sibling runs anchored at the same predecessor, the run whose op
    /// id compares greater sits closer to the anchor; because ids are
    /// globally unique and a run's own ids ascend from its op id, this
    /// totals the order identically on every replica. Reference ids with no
    /// match are skipped with a warning; the matched ones commit. Generated
    /// ids already present are skipped, so redelivery is a no-op.
    pub fn insert(
        &mut self,
        spec: &OpSpec,
        refs: &IndexMap<Id, InsertRun>,
    ) -> Result<(), WeaveError> {
        let pivot = spec.id();
        let mut ids = IdSequence::new(&spec.body, &spec.ext);
        let mut pending: Vec<&Id> = refs.keys().collect();
        let mut max_generated: Option<Id> = None;
        let mut i = 0;
        while i < self.weave.len() && !pending.is_empty() {
            let Some(slot) = pending
                .iter()
                .position(|&key| self.weave.matches_one(i, key, true))
            else {
                i += 1;
                continue;
            };
            let key = pending.remove(slot);
            let run = &refs[key];
            let mut at = i + 1;
            while at < self.weave.len() && self.weave.atoms()[at].id > pivot {
                at += 1;
            }
            for ch in run.value.chars() {
                let id = ids.next_id();
                if self.weave.contains_id(&id) {
                    continue;
                }
                self.weave
                    .insert_char(at, ch, id.clone(), run.attributes.as_ref())?;
                at += 1;
                max_generated = Some(id);
            }
        }
        for key in pending {
            log::warn!("insert ref {key} not found; skipping");
        }
        match max_generated {
            Some(id) => self.clock.check_timestamp(id.body()),
            None => self.clock.check_timestamp(&spec.body),
        }
        Ok(())
    }

    /// Apply a remove op: delete every live atom whose primary id is in
    /// `ids`, folding each into its predecessor's bucket. Ids that are
    /// absent or already tombstoned are left alone, so redelivery and
    /// concurrent deletion of the same id are no-ops.
    pub fn remove(&mut self, spec: &OpSpec, ids: &BTreeSet<Id>) -> Result<(), WeaveError> {
        let mut remaining = ids.len();
        let mut i = 1;
        while i < self.weave.len() && remaining > 0 {
            if self.weave.matches_any(i, ids, false) {
                self.weave.delete_char(i)?;
                remaining -= 1;
            } else {
                i += 1;
            }
        }
        self.clock.check_timestamp(&spec.body);
        Ok(())
    }

    /// Apply a setAttributes op: replace the attributes of each referenced
    /// live atom with a normalized copy of its entry. Tombstoned ids are
    /// ignored. Replacement is wholesale; callers merge old and new before
    /// building the op.
    pub fn set_attributes(
        &mut self,
        spec: &OpSpec,
        entries: &IndexMap<Id, AttrMap>,
    ) -> Result<(), WeaveError> {
        for (id, attrs) in entries {
            match self.weave.index_of(id, false) {
                Some(0) => log::warn!("setAttributes ref {id} is the base atom; skipping"),
                Some(p) => self.weave.set_char_attr(p, Some(attrs))?,
                None => {}
            }
        }
        self.clock.check_timestamp(&spec.body);
        Ok(())
    }

    // ── Local surface ──────────────────────────────────────────────────────

    pub(crate) fn local_spec(&mut self) -> OpSpec {
        OpSpec::new(self.clock.new_timestamp(), self.source.clone())
    }

    /// Insert `value` after the atom `after` (live or tombstoned) and
    /// return the applied op for broadcast.
    pub fn insert_chars_at(
        &mut self,
        after: &Id,
        value: &str,
        attributes: Option<AttrMap>,
    ) -> Result<OpEnvelope, WeaveError> {
        let spec = self.local_spec();
        let mut refs = IndexMap::new();
        refs.insert(
            after.clone(),
            InsertRun {
                value: value.to_string(),
                attributes,
            },
        );
        self.insert(&spec, &refs)?;
        Ok(OpEnvelope {
            spec,
            op: Op::Insert { refs },
        })
    }

    /// Delete the given atoms and return the applied op for broadcast.
    pub fn rm_chars<I>(&mut self, chars: I) -> Result<OpEnvelope, WeaveError>
    where
        I: IntoIterator<Item = Id>,
    {
        let ids: BTreeSet<Id> = chars.into_iter().collect();
        let spec = self.local_spec();
        self.remove(&spec, &ids)?;
        Ok(OpEnvelope {
            spec,
            op: Op::Remove { ids },
        })
    }

    /// Re-style the given atoms and return the applied op for broadcast.
    /// Entries replace attributes wholesale; merge old and new first.
    pub fn format_chars(
        &mut self,
        entries: IndexMap<Id, AttrMap>,
    ) -> Result<OpEnvelope, WeaveError> {
        let spec = self.local_spec();
        self.set_attributes(&spec, &entries)?;
        Ok(OpEnvelope {
            spec,
            op: Op::SetAttributes { entries },
        })
    }

    /// Replace the whole document: remove every live atom, then insert
    /// `text` anchored at the base atom. Returns the applied ops in order.
    pub fn set(
        &mut self,
        text: &str,
        attributes: Option<AttrMap>,
    ) -> Result<Vec<OpEnvelope>, WeaveError> {
        let ids: Vec<Id> = self.weave.atoms()[1..]
            .iter()
            .map(|atom| atom.id.clone())
            .collect();
        let mut applied = Vec::new();
        if !ids.is_empty() {
            applied.push(self.rm_chars(ids)?);
        }
        if !text.is_empty() {
            applied.push(self.insert_chars_at(&Id::base(), text, attributes)?);
        }
        Ok(applied)
    }
}
