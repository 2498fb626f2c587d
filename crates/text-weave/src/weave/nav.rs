//! Navigation and comparison queries over the weave.

use super::{Atom, Weave, WeaveError};
use crate::clock::Id;
use std::cmp::Ordering;

// ── CharRef ────────────────────────────────────────────────────────────────

/// A character designator: an atom id (live or tombstoned) or the EOF
/// sentinel, which sits past the last live atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharRef {
    Id(Id),
    Eof,
}

impl From<Id> for CharRef {
    fn from(id: Id) -> Self {
        CharRef::Id(id)
    }
}

impl From<&Atom> for CharRef {
    fn from(atom: &Atom) -> Self {
        CharRef::Id(atom.id.clone())
    }
}

// ── Wrap ───────────────────────────────────────────────────────────────────

/// How [`Weave::get_char_relative_to`] reconciles an out-of-range target
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    /// Modular reduction into `[0, len())`.
    Wrap,
    /// Clamp into `[0, len() - 1]`.
    Limit,
    /// Clamp low to 0; past the end resolves to the EOF sentinel.
    Eof,
    /// Fail on out-of-range.
    Error,
}

/// Result of a navigation query: a live atom, or the EOF sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Located<'a> {
    Atom(&'a Atom),
    Eof,
}

impl<'a> Located<'a> {
    pub fn atom(self) -> Option<&'a Atom> {
        match self {
            Located::Atom(atom) => Some(atom),
            Located::Eof => None,
        }
    }

    pub fn is_eof(self) -> bool {
        matches!(self, Located::Eof)
    }
}

impl Weave {
    /// Weave position of `char_ref`, with the EOF sentinel at `len()`.
    /// Tombstoned ids resolve to the position of the atom holding their
    /// bucket.
    fn position_of(&self, char_ref: &CharRef) -> Result<usize, WeaveError> {
        match char_ref {
            CharRef::Id(id) => self
                .index_of(id, true)
                .ok_or_else(|| WeaveError::UnknownRef(id.to_string())),
            CharRef::Eof => Ok(self.len()),
        }
    }

    /// Find `char_ref`, move `relative` positions, and reconcile the result
    /// per `wrap`. With `char_ref` at EOF, a non-positive `relative` counts
    /// back from past-the-end; a positive one is out of range.
    pub fn get_char_relative_to(
        &self,
        char_ref: &CharRef,
        relative: i64,
        wrap: Wrap,
    ) -> Result<Located<'_>, WeaveError> {
        let len = self.len() as i64;
        let target = self.position_of(char_ref)? as i64 + relative;
        let resolved = match wrap {
            Wrap::Wrap => target.rem_euclid(len),
            Wrap::Limit => target.clamp(0, len - 1),
            Wrap::Eof => {
                if target >= len {
                    return Ok(Located::Eof);
                }
                target.max(0)
            }
            Wrap::Error => {
                if target < 0 || target >= len {
                    return Err(WeaveError::OutOfBounds(target));
                }
                target
            }
        };
        Ok(Located::Atom(self.get_char(resolved as usize)?))
    }

    /// Atoms strictly after `from`, up to and including `to` (the last live
    /// atom when `to` is omitted). `from == to` yields the empty range;
    /// `to` preceding `from` fails.
    pub fn get_text_range(
        &self,
        from: &CharRef,
        to: Option<&CharRef>,
    ) -> Result<Vec<&Atom>, WeaveError> {
        let from_pos = self.position_of(from)?;
        let to_pos = match to {
            Some(char_ref) => self.position_of(char_ref)?,
            None => self.len() - 1,
        };
        if to_pos < from_pos {
            return Err(WeaveError::RangeOrder);
        }
        let end = to_pos.min(self.len() - 1);
        if from_pos >= end {
            return Ok(Vec::new());
        }
        Ok(self.atoms()[from_pos + 1..=end].iter().collect())
    }

    /// Compare two designators by weave position. The EOF sentinel is
    /// greater than every atom and equal to itself.
    pub fn compare_char_pos(&self, a: &CharRef, b: &CharRef) -> Result<Ordering, WeaveError> {
        let pa = self.position_of(a)?;
        let pb = self.position_of(b)?;
        Ok(pa.cmp(&pb))
    }
}
