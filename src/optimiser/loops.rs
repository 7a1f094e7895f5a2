//! Loop-idiom recognition, run every time a `]` closes a loop.
//!
//! The recognizer sees the loop as the last node of its parent block,
//! after the peephole pass has already canonicalized the body. Three
//! idioms are rewritten: `[>]`-style scans become [`OpKind::Skip`],
//! balanced counter loops become [`OpKind::Multiply`] fanout plus a
//! clearing set, and `[-]`/`[+]` is the zero-fanout case of the latter.

use crate::ir::{Block, Op, OpKind};
use crate::optimiser::peephole::{self, Entry};
use crate::Cell;

/// Rewrites the just-closed loop at the tail of `block` when it matches a
/// known idiom. The body is peephole-optimized first, under the
/// assumption that the cell is nonzero on entry (the loop was taken).
pub fn optimise_loop(block: &mut Block) {
    let last = block.len() - 1;
    {
        let OpKind::Loop { children, .. } = &mut block[last].kind else {
            unreachable!("optimise_loop called without a trailing loop");
        };
        peephole::optimise_block(children, Entry::Nonzero);
    }

    // [>>>] and friends: move until a zero cell is found.
    if let OpKind::Loop { children, .. } = &block[last].kind {
        if let [Op {
            kind: OpKind::Alter { offset, amount: 0 },
            ..
        }] = children.as_slice()
        {
            if *offset != 0 {
                block[last] = Op::skip(*offset);
                return;
            }
        }
    }

    make_loop_into_multiply(block);
}

/// Turns a balanced alter-only loop into multiply fanout.
///
/// The body must consist solely of alters whose offsets sum to zero, and
/// the net change to the counter cell (offset 0) must be exactly ±1; the
/// loop then runs once per count, so every other touched cell receives
/// `counter * net_amount`. Returns whether the rewrite happened.
fn make_loop_into_multiply(block: &mut Block) -> bool {
    let last = block.len() - 1;
    let OpKind::Loop { children, .. } = &block[last].kind else {
        return false;
    };

    // Net amount per absolute offset, in first-occurrence order.
    let mut entries: Vec<(isize, Cell)> = Vec::new();
    let mut pos: isize = 0;
    for child in children {
        let OpKind::Alter { offset, amount } = &child.kind else {
            return false;
        };
        pos += *offset;
        if let Some(entry) = entries.iter_mut().find(|(o, _)| *o == pos) {
            entry.1 = entry.1.wrapping_add(*amount);
        } else {
            entries.push((pos, *amount));
        }
    }

    if pos != 0 {
        // Unbalanced: the loop walks the tape, leave it alone.
        return false;
    }

    let counter = entries
        .iter()
        .find(|(o, _)| *o == 0)
        .map(|(_, a)| *a)
        .unwrap_or(0);
    if counter != -1 && counter != 1 {
        return false;
    }

    block.pop();
    for (offset, amount) in entries {
        if offset == 0 {
            continue;
        }
        // A +1 counter wraps around to zero, so the effective iteration
        // count is the negated cell value.
        let amount = if counter == 1 {
            amount.wrapping_neg()
        } else {
            amount
        };
        block.push(Op::multiply(offset, amount));
    }
    block.push(Op::set(0, 0));
    true
}
