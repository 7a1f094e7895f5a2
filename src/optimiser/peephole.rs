//! The peephole pass: rewrite rules over one linear block, driven to a
//! fixed point.
//!
//! Each visit of the cursor first refreshes the zero/nonzero knowledge of
//! the op under it, then tries the rules in order. A rule that fires
//! reports how far to rewind the cursor; a full pass with no firing ends
//! the pass. Loop bodies are not descended into here: every body got its
//! own pass when its `]` closed.

use crate::ir::{Block, Op, OpKind};
use crate::optimiser::helpers::{self, offset_might_be_accessed};

/// What is known about the current cell when the block is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// The whole tape is zero (program start).
    AllZero,
    /// The cell is nonzero (a loop body that was entered).
    Nonzero,
    /// Nothing is known.
    Unknown,
}

/// Runs rewrite rules over `block` until none fires.
pub fn optimise_block(block: &mut Block, entry: Entry) {
    loop {
        let mut fired = false;
        let mut i = 0;
        while i < block.len() {
            update_knowledge_at(block, i, entry);
            if let Some(rewind) = step(block, i) {
                fired = true;
                i = i.saturating_sub(rewind);
            } else {
                i += 1;
            }
        }
        if !fired {
            break;
        }
    }
}

/// Recomputes the knowledge flags of `block[i]` from its predecessor.
fn update_knowledge_at(block: &mut Block, i: usize, entry: Entry) {
    let (zero, nonzero) = if i == 0 {
        match entry {
            Entry::AllZero => (true, false),
            Entry::Nonzero => (false, true),
            Entry::Unknown => (false, false),
        }
    } else if entry == Entry::AllZero && block[..i].iter().all(|op| !helpers::writes_cell(op)) {
        // Nothing has written to any cell yet, so wherever the pointer
        // has wandered, it is still looking at a zero.
        (true, false)
    } else {
        let prev_zero = block[i - 1].definitely_zero;
        let prev_nonzero = block[i - 1].definitely_nonzero;
        let prev = &mut block[i - 1];
        if helpers::ensures_zero(prev) {
            (true, false)
        } else if helpers::ensures_nonzero(prev) {
            (false, true)
        } else if (prev_zero || prev_nonzero)
            && !helpers::writes_cell(prev)
            && !helpers::moves_tape(prev)
        {
            (prev_zero, prev_nonzero)
        } else {
            (false, false)
        }
    };
    block[i].definitely_zero = zero;
    block[i].definitely_nonzero = nonzero;
}

/// The shapes of ops rule 4/8 treats as a movable write.
#[derive(Clone, Copy)]
enum WriteShape {
    /// `Set { offset: 0, .. }`.
    SingleSet,
    /// `Alter { offset: 0, amount != 0 }`: the add can migrate forward.
    PureAdd,
    /// `Alter { offset != 0, amount != 0 }`: the movement must stay.
    MovingAdd,
}

/// Tries every rule at position `i`; returns the rewind distance of the
/// rule that fired, if any.
fn step(block: &mut Block, i: usize) -> Option<usize> {
    // Rule 1: an alter that neither moves nor adds.
    if matches!(
        block[i].kind,
        OpKind::Alter {
            offset: 0,
            amount: 0
        }
    ) {
        block.remove(i);
        return Some(1);
    }

    // Rule 2: ops that do nothing when the cell is zero. A loop or skip
    // is never entered, a multiply adds a zero product, and a clearing
    // single-cell set writes the value already there.
    if block[i].definitely_zero {
        let inert = matches!(
            block[i].kind,
            OpKind::Loop { .. }
                | OpKind::Skip { .. }
                | OpKind::Multiply { .. }
                | OpKind::Set {
                    offset: 0,
                    amount: 0
                }
        );
        if inert {
            block.remove(i);
            return Some(1);
        }
    }

    // Rule 3: a set whose whole span is rewritten by the next op.
    if i >= 1 {
        if let (OpKind::Set { offset: o1, .. }, OpKind::Set { offset: o2, .. }) =
            (&block[i - 1].kind, &block[i].kind)
        {
            if *o2 >= *o1 {
                block.remove(i - 1);
                return Some(1);
            }
        }
    }

    // Rules 4 and 8: look ahead for the next access to the cell this op
    // writes. If that access overwrites it, the write here is dead; if it
    // is a combinable alter, the two amounts merge.
    let shape = match &block[i].kind {
        OpKind::Set { offset: 0, .. } => Some(WriteShape::SingleSet),
        OpKind::Alter { offset: 0, amount } if *amount != 0 => Some(WriteShape::PureAdd),
        OpKind::Alter { amount, .. } if *amount != 0 => Some(WriteShape::MovingAdd),
        _ => None,
    };
    if let Some(shape) = shape {
        // A set directly after a multiply is the multiply's structural
        // trailer in the bytecode; it must not be deleted.
        let pinned_trailer = matches!(shape, WriteShape::SingleSet)
            && i > 0
            && matches!(block[i - 1].kind, OpKind::Multiply { .. });
        if !pinned_trailer {
            // The written cell sits under the pointer once this op is done.
            let access = offset_might_be_accessed(block, i + 1, 0);
            if !access.uncertain && access.write && !access.read {
                match shape {
                    WriteShape::SingleSet | WriteShape::PureAdd => {
                        block.remove(i);
                        return Some(1);
                    }
                    WriteShape::MovingAdd => {
                        let OpKind::Alter { amount, .. } = &mut block[i].kind else {
                            unreachable!();
                        };
                        *amount = 0;
                        return Some(1);
                    }
                }
            }
            if !access.uncertain && access.read && access.write {
                if matches!(block[access.pos].kind, OpKind::Alter { .. }) {
                    match shape {
                        // Rule 4: pull the later add back into this op.
                        WriteShape::SingleSet | WriteShape::MovingAdd => {
                            let OpKind::Alter { amount, .. } = &mut block[access.pos].kind
                            else {
                                unreachable!();
                            };
                            let add = *amount;
                            *amount = 0;
                            match &mut block[i].kind {
                                OpKind::Set { amount, .. } | OpKind::Alter { amount, .. } => {
                                    *amount = amount.wrapping_add(add);
                                }
                                _ => unreachable!(),
                            }
                            return Some(1);
                        }
                        // Rule 8: push this add forward and disappear.
                        WriteShape::PureAdd => {
                            let OpKind::Alter { amount: own, .. } = &block[i].kind else {
                                unreachable!();
                            };
                            let own = *own;
                            let OpKind::Alter { amount, .. } = &mut block[access.pos].kind
                            else {
                                unreachable!();
                            };
                            *amount = amount.wrapping_add(own);
                            block.remove(i);
                            return Some(1);
                        }
                    }
                }
            }
        }
    }

    // Rule 5: adjacent alters merge when the first does not add or the
    // second does not move.
    if i >= 1 {
        if let (
            OpKind::Alter {
                offset: o1,
                amount: a1,
            },
            OpKind::Alter {
                offset: o2,
                amount: a2,
            },
        ) = (&block[i - 1].kind, &block[i].kind)
        {
            if *a1 == 0 || *o2 == 0 {
                let merged = Op::alter(*o1 + *o2, a1.wrapping_add(*a2));
                block[i - 1] = merged;
                block.remove(i);
                return Some(1);
            }
        }
    }

    // Rule 6: a multiply onto its own source cell degenerates into the
    // loop it came from.
    if matches!(block[i].kind, OpKind::Multiply { offset: 0, .. }) {
        block[i] = Op::loop_of(Vec::new());
        return Some(1);
    }

    // Rule 7: adding to a known-zero cell is just setting it.
    if block[i].definitely_zero {
        if let OpKind::Alter { offset: 0, amount } = &block[i].kind {
            if *amount != 0 {
                let amount = *amount;
                block[i] = Op::set(0, amount);
                return Some(1);
            }
        }
    }

    // Rule 9: two sets of the same value bridged by one step of movement
    // collapse into a single wider set plus the residual move.
    if i >= 2 {
        if let (
            OpKind::Set {
                offset: o1,
                amount: v1,
            },
            OpKind::Alter { offset: oa, .. },
            OpKind::Set {
                offset: o3,
                amount: v3,
            },
        ) = (&block[i - 2].kind, &block[i - 1].kind, &block[i].kind)
        {
            if *oa == *o1 + 1 && v1 == v3 {
                let (o1, v, oa, o3) = (*o1, *v1, *oa, *o3);
                block[i - 2] = Op::set(o1 + o3 + 1, v);
                block[i - 1] = Op::alter(oa, 0);
                block.remove(i);
                return Some(2);
            }
        }
    }

    // Rule 10: a loop that is entered and cannot iterate twice is just
    // its body.
    if block[i].definitely_nonzero && matches!(block[i].kind, OpKind::Loop { .. }) {
        let info = helpers::get_loop_info(&mut block[i]);
        if info.loops_once_at_most {
            let OpKind::Loop { children, .. } =
                std::mem::replace(&mut block[i].kind, OpKind::In)
            else {
                unreachable!();
            };
            block.splice(i..=i, children);
            return Some(1);
        }
    }

    None
}
