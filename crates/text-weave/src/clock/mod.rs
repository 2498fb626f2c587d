//! Atom ids and the logical clocks that mint them.
//!
//! An atom id is the pair `(timestamp, source)` serialized as `TTTTT+SRC`,
//! where `TTTTT` is a Lamport-style tick encoded in an ASCII-ordered base-64
//! alphabet and `SRC` names the originating replica. Ids are compared
//! lexicographically as strings; because the alphabet is ASCII-ordered,
//! numeric tick order and string order coincide. A timestamp body may carry a
//! 2-character sub-sequence suffix (`TTTTTss`) disambiguating ids minted
//! within a single tick for a run of inserted characters.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Base-64 digits ─────────────────────────────────────────────────────────

/// The 64 digits, in ASCII order.
const DIGITS: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz~";

/// Width of a timestamp body without a sub-sequence suffix.
pub const TS_WIDTH: usize = 5;

/// Width of a sub-sequence suffix.
pub const SEQ_WIDTH: usize = 2;

/// Separator between the timestamp body and the source of an id.
pub const ID_SEP: char = '+';

/// Source of the fixed base atom id.
pub const BASE_SOURCE: &str = "swarm";

/// Encode `value` into `width` base-64 digits, most significant first.
pub fn encode(value: u64, width: usize) -> String {
    let mut out = String::with_capacity(width);
    for i in (0..width).rev() {
        let digit = ((value >> (6 * i as u32)) & 0x3f) as usize;
        out.push(DIGITS[digit] as char);
    }
    out
}

/// Decode a string of base-64 digits. `None` on a character outside the
/// alphabet.
pub fn decode(s: &str) -> Option<u64> {
    let mut value = 0u64;
    for b in s.bytes() {
        value = (value << 6) | u64::from(digit_value(b)?);
    }
    Some(value)
}

fn digit_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'Z' => Some(b - b'A' + 10),
        b'_' => Some(36),
        b'a'..=b'z' => Some(b - b'a' + 37),
        b'~' => Some(63),
        _ => None,
    }
}

// ── Id ─────────────────────────────────────────────────────────────────────

/// A globally unique atom id, held in its wire form: `"TTTTT+SRC"`, or
/// `"TTTTTss+SRC"` when the timestamp carries a sub-sequence suffix.
///
/// Ordering is the lexicographic order of the serialized string. That order
/// is what the concurrent-insertion tie-break and every convergence argument
/// are defined over, so ids must round-trip bit-exactly; serialization is
/// transparent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Join a timestamp body and a source into an id.
    pub fn new(body: &str, ext: &str) -> Self {
        Id(format!("{body}{ID_SEP}{ext}"))
    }

    /// The fixed base atom id, `00000+swarm`. Every weave holds its own base
    /// atom keyed by this id.
    pub fn base() -> Self {
        Id::new(&encode(0, TS_WIDTH), BASE_SOURCE)
    }

    /// The wire string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp portion: everything before the first `+`, sub-sequence
    /// suffix included.
    pub fn body(&self) -> &str {
        match self.0.find(ID_SEP) {
            Some(i) => &self.0[..i],
            None => &self.0,
        }
    }

    /// Source portion: everything after the first `+`.
    pub fn ext(&self) -> &str {
        match self.0.find(ID_SEP) {
            Some(i) => &self.0[i + 1..],
            None => "",
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id(s)
    }
}

// ── IdSequence ─────────────────────────────────────────────────────────────

/// Mints the run of ids an op assigns to consecutively inserted characters.
///
/// A bare 5-character body names the first character itself; every later
/// character appends a 2-character sub-sequence suffix, counting up from
/// `01`. A body that already carries a suffix continues counting from it.
/// Suffixed ids compare greater than the bare body id, so a run's ids ascend
/// and the run is never split by the sibling tie-break.
#[derive(Debug, Clone)]
pub struct IdSequence {
    ts: String,
    ext: String,
    seq: u64,
}

impl IdSequence {
    pub fn new(body: &str, ext: &str) -> Self {
        let (ts, seq) = split_body(body);
        IdSequence {
            ts: ts.to_string(),
            ext: ext.to_string(),
            seq,
        }
    }

    /// The id `next_id` would mint, without advancing.
    pub fn peek_id(&self) -> Id {
        let body = if self.seq > 0 {
            format!("{}{}", self.ts, encode(self.seq, SEQ_WIDTH))
        } else {
            self.ts.clone()
        };
        Id::new(&body, &self.ext)
    }

    /// Mint the next id of the run.
    pub fn next_id(&mut self) -> Id {
        let id = self.peek_id();
        self.seq = if self.seq == 0 { 1 } else { self.seq + 1 };
        id
    }
}

/// Split a timestamp body into its 5-character tick and decoded sub-sequence
/// (0 when absent or unparseable).
pub fn split_body(body: &str) -> (&str, u64) {
    if body.len() > TS_WIDTH && body.is_char_boundary(TS_WIDTH) {
        let (ts, suffix) = body.split_at(TS_WIDTH);
        match decode(suffix) {
            Some(seq) => (ts, seq),
            None => {
                log::warn!("unparseable sub-sequence suffix in timestamp body {body:?}");
                (ts, 0)
            }
        }
    } else {
        (body, 0)
    }
}

// ── ClockSource ────────────────────────────────────────────────────────────

/// Supplier of fresh timestamp bodies and sink for externally observed ones.
pub trait ClockSource {
    /// A fresh, monotonically non-decreasing 5-character timestamp body.
    fn new_timestamp(&mut self) -> String;

    /// Raise the high-water mark to at least the tick of `body`.
    fn check_timestamp(&mut self, body: &str);
}

/// Lamport-style tick counter.
///
/// `new_timestamp` pre-increments, so every fresh body is strictly greater
/// than everything previously minted or observed.
#[derive(Debug, Clone, Default)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        LamportClock { time: 0 }
    }

    /// A clock resuming from a known tick.
    pub fn at(time: u64) -> Self {
        LamportClock { time }
    }

    pub fn time(&self) -> u64 {
        self.time
    }
}

impl ClockSource for LamportClock {
    fn new_timestamp(&mut self) -> String {
        self.time += 1;
        encode(self.time, TS_WIDTH)
    }

    fn check_timestamp(&mut self, body: &str) {
        let (ts, _) = split_body(body);
        match decode(ts) {
            Some(tick) => self.time = self.time.max(tick),
            None => log::warn!("ignoring unparseable timestamp body {body:?}"),
        }
    }
}

/// Generates a random 5-character replica source from the digit alphabet.
pub fn generate_source_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..TS_WIDTH)
        .map(|_| DIGITS[rng.gen_range(0..DIGITS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        for value in [0, 1, 63, 64, 4095, 1_000_000] {
            assert_eq!(decode(&encode(value, TS_WIDTH)), Some(value));
        }
        assert_eq!(encode(0, TS_WIDTH), "00000");
        assert_eq!(encode(1, TS_WIDTH), "00001");
    }

    #[test]
    fn encoding_preserves_order() {
        let mut prev = encode(0, TS_WIDTH);
        for value in 1..200 {
            let next = encode(value, TS_WIDTH);
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn decode_rejects_foreign_characters() {
        assert_eq!(decode("000+0"), None);
        assert_eq!(decode("0000 "), None);
    }

    #[test]
    fn id_parts() {
        let id = Id::new("10000", "A");
        assert_eq!(id.as_str(), "10000+A");
        assert_eq!(id.body(), "10000");
        assert_eq!(id.ext(), "A");
        assert_eq!(Id::base().as_str(), "00000+swarm");
    }

    #[test]
    fn id_order_is_string_order() {
        assert!(Id::new("10000", "B") > Id::new("10000", "A"));
        assert!(Id::new("1000001", "A") > Id::new("10000", "B"));
        assert!(Id::base() < Id::new("00001", "A"));
    }

    #[test]
    fn sequence_from_bare_body() {
        let mut seq = IdSequence::new("10000", "A");
        assert_eq!(seq.next_id().as_str(), "10000+A");
        assert_eq!(seq.next_id().as_str(), "1000001+A");
        assert_eq!(seq.next_id().as_str(), "1000002+A");
    }

    #[test]
    fn sequence_continues_a_suffixed_body() {
        let mut seq = IdSequence::new("1000005", "A");
        assert_eq!(seq.next_id().as_str(), "1000005+A");
        assert_eq!(seq.next_id().as_str(), "1000006+A");
    }

    #[test]
    fn sequence_ids_ascend() {
        let mut seq = IdSequence::new("10000", "A");
        let mut prev = seq.next_id();
        for _ in 0..70 {
            let next = seq.next_id();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn lamport_clock_is_strictly_increasing() {
        let mut clock = LamportClock::new();
        let a = clock.new_timestamp();
        let b = clock.new_timestamp();
        assert!(b > a);
    }

    #[test]
    fn lamport_clock_observes_high_water() {
        let mut clock = LamportClock::new();
        clock.check_timestamp("00010");
        assert_eq!(clock.time(), decode("00010").unwrap());
        assert!(clock.new_timestamp().as_str() > "00010");
        // Suffixed bodies observe their tick portion.
        clock.check_timestamp("0002003");
        assert_eq!(clock.time(), decode("00020").unwrap());
        // Stale observations never move the clock backwards.
        clock.check_timestamp("00001");
        assert_eq!(clock.time(), decode("00020").unwrap());
    }

    #[test]
    fn generated_sources_use_the_alphabet() {
        let src = generate_source_id();
        assert_eq!(src.len(), TS_WIDTH);
        assert!(src.bytes().all(|b| digit_value(b).is_some()));
    }
}
