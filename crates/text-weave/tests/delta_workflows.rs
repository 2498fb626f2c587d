//! End-to-end delta bridge workflows: an OT editor on one side, remote
//! replicas mirroring applied ops back into editor deltas on the other.

use proptest::prelude::*;
use serde_json::json;
use text_weave::{delta, Delta, DeltaOp, OpEnvelope, Replica};

fn replay(to: &mut Replica, ops: &[OpEnvelope]) {
    for envelope in ops {
        to.apply(envelope).unwrap();
    }
}

/// Deliver `ops` to `to` while mirroring each applied op into `editor`, the
/// plain-text shadow an OT front-end would keep.
fn replay_with_editor(to: &mut Replica, editor: &mut String, ops: &[OpEnvelope]) {
    for envelope in ops {
        to.apply(envelope).unwrap();
        let mirror = to.delta_from_op(envelope);
        *editor = delta::apply(editor, &mirror);
    }
}

#[test]
fn set_then_text_round_trips() {
    let mut replica = Replica::new("A");
    replica.set("Hello, weave!", None).unwrap();
    assert_eq!(replica.text(), "Hello, weave!");
    replica.set("shorter", None).unwrap();
    assert_eq!(replica.text(), "shorter");
    replica.set("", None).unwrap();
    assert_eq!(replica.text(), "");
}

#[test]
fn remote_insert_mirrors_through_a_delta() {
    let mut a = Replica::new("A");
    let mut b = Replica::new("B");
    replay(&mut b, &a.set("Hello", None).unwrap());

    let applied = a
        .apply_delta(&vec![DeltaOp::retain(5), DeltaOp::insert(" world")])
        .unwrap();
    assert_eq!(a.text(), "Hello world");

    let mut editor = b.text();
    replay_with_editor(&mut b, &mut editor, &applied);
    assert_eq!(b.text(), "Hello world");
    assert_eq!(editor, "Hello world");
}

#[test]
fn remote_removal_mirrors_through_a_delta() {
    let mut a = Replica::new("A");
    let mut b = Replica::new("B");
    replay(&mut b, &a.set("Hello world", None).unwrap());

    let applied = a
        .apply_delta(&vec![DeltaOp::retain(5), DeltaOp::delete(6)])
        .unwrap();
    assert_eq!(a.text(), "Hello");

    let mut editor = b.text();
    replay_with_editor(&mut b, &mut editor, &applied);
    assert_eq!(b.text(), "Hello");
    assert_eq!(editor, "Hello");
}

#[test]
fn remote_restyle_mirrors_through_a_delta() {
    let mut a = Replica::new("A");
    let mut b = Replica::new("B");
    replay(&mut b, &a.set("abc", None).unwrap());

    let bold = json!({"bold": true}).as_object().cloned();
    let applied = a
        .apply_delta(&vec![
            DeltaOp::retain(1),
            DeltaOp::Retain {
                retain: 2,
                attributes: bold.clone(),
            },
        ])
        .unwrap();

    replay(&mut b, &applied);
    assert_eq!(b.get_char_at(2).unwrap().attrs, bold);
    assert_eq!(b.get_char_at(3).unwrap().attrs, bold);
    assert_eq!(b.get_char_at(1).unwrap().attrs, None);
    assert_eq!(*a.weave(), *b.weave());

    let mirror = b.delta_from_op(&applied[0]);
    assert_eq!(
        mirror,
        vec![
            DeltaOp::retain(1),
            DeltaOp::Retain {
                retain: 2,
                attributes: json!({"bold": true}).as_object().cloned(),
            },
        ]
    );
}

#[test]
fn a_delta_arriving_before_its_mirror_converges_with_the_op() {
    // One editor edit, propagated two ways: as a delta re-applied locally on
    // a's side, and as replicated ops on b's side. Both must agree.
    let mut a = Replica::new("A");
    let mut b = Replica::new("B");
    replay(&mut b, &a.set("Hi", None).unwrap());

    let applied = a
        .apply_delta(&vec![DeltaOp::retain(2), DeltaOp::insert("!")])
        .unwrap();
    replay(&mut b, &applied);

    assert_eq!(a.text(), b.text());
    assert_eq!(
        a.weave().atoms().iter().map(|x| x.id.clone()).collect::<Vec<_>>(),
        b.weave().atoms().iter().map(|x| x.id.clone()).collect::<Vec<_>>(),
    );
}

#[test]
fn multi_run_delta_produces_one_insert_op() {
    let mut a = Replica::new("A");
    a.set("abcd", None).unwrap();
    let applied = a
        .apply_delta(&vec![
            DeltaOp::insert("x"),
            DeltaOp::retain(2),
            DeltaOp::insert("y"),
        ])
        .unwrap();
    assert_eq!(a.text(), "xabycd");
    assert_eq!(applied.len(), 1);

    // The mirror delta reproduces both runs with their gaps.
    let mirror = a.delta_from_op(&applied[0]);
    assert_eq!(
        mirror,
        vec![
            DeltaOp::insert("x"),
            DeltaOp::retain(2),
            DeltaOp::insert("y"),
        ]
    );
}

#[test]
fn snapshot_survives_a_delta_session() {
    let mut a = Replica::new("A");
    a.set("styled", json!({"font": "mono"}).as_object().cloned())
        .unwrap();
    a.apply_delta(&vec![DeltaOp::retain(3), DeltaOp::delete(3)])
        .unwrap();

    let encoded = serde_json::to_string(a.weave()).unwrap();
    let decoded: text_weave::Weave = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, *a.weave());
    assert_eq!(decoded.text(), "sty");
}

// ── Randomized round trips ─────────────────────────────────────────────────

fn splice(text: &str, pos: usize, delete: usize, insert: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out: String = chars[..pos].iter().collect();
    out.push_str(insert);
    out.extend(&chars[(pos + delete).min(chars.len())..]);
    out
}

proptest! {
    /// A single editor edit — expressed as retain / insert / delete — lands
    /// on the replica, round-trips through the op mirror on a second
    /// replica, and matches a plain string splice.
    #[test]
    fn delta_edits_round_trip_against_string_splices(
        base in "[a-z]{1,12}",
        pos_seed in any::<u8>(),
        del_seed in any::<u8>(),
        insert in "[a-z]{0,4}",
    ) {
        let mut a = Replica::new("A");
        let mut b = Replica::new("B");
        let seed = a.set(&base, None).unwrap();
        replay(&mut b, &seed);

        let len = base.chars().count();
        let pos = (pos_seed as usize) % (len + 1);
        let del = (del_seed as usize) % (len - pos + 1);

        let mut edit: Delta = Vec::new();
        if pos > 0 {
            edit.push(DeltaOp::retain(pos));
        }
        if !insert.is_empty() {
            edit.push(DeltaOp::insert(insert.clone()));
        }
        if del > 0 {
            edit.push(DeltaOp::delete(del));
        }
        let expected = splice(&base, pos, del, &insert);

        let applied = a.apply_delta(&edit).unwrap();
        prop_assert_eq!(a.text(), expected.clone());

        let mut editor = b.text();
        replay_with_editor(&mut b, &mut editor, &applied);
        prop_assert_eq!(b.text(), expected.clone());
        prop_assert_eq!(editor, expected);
    }
}
