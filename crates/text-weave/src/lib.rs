//! text-weave — a causal-tree weave CRDT for collaborative rich text.
//!
//! A replica holds a [`Weave`]: an ordered sequence of character atoms, each
//! carrying a globally unique id, optional rich-text attributes, and a
//! tombstone bucket of previously deleted ids. Three replicated operations —
//! insert, remove, setAttributes — converge to the same sequence on every
//! replica regardless of delivery order, given causal delivery of the ids an
//! op references. A bidirectional delta bridge converts between replicated
//! ops and the OT retain / insert / delete format rich-text editors speak,
//! so OT front-ends can collaborate through the CRDT.
//!
//! The transport is external: local mutators return the [`OpEnvelope`]s they
//! applied for the caller's replication layer to broadcast, and remote
//! envelopes are delivered through [`Replica::apply`].

pub mod clock;
pub mod delta;
pub mod engine;
pub mod weave;

pub use clock::{generate_source_id, ClockSource, Id, LamportClock};
pub use delta::{Delta, DeltaOp};
pub use engine::{InsertRun, Op, OpEnvelope, OpSpec, Replica};
pub use weave::{normalize_attrs, Atom, AttrMap, CharRef, Located, Weave, WeaveError, Wrap};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
