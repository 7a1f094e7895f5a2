//! Pure analysis queries over IR nodes.
//!
//! Everything in here answers questions without rewriting anything; the
//! only mutation is the loop-info memo cached on `Loop` nodes.

use crate::ir::{LoopInfo, Op, OpKind};

/// Does executing this op guarantee the current cell ends up zero?
pub fn ensures_zero(op: &Op) -> bool {
    match &op.kind {
        OpKind::Loop { .. } | OpKind::Skip { .. } => true,
        OpKind::Set { amount, .. } => *amount == 0,
        _ => false,
    }
}

/// Does executing this op guarantee the current cell ends up nonzero?
pub fn ensures_nonzero(op: &Op) -> bool {
    match &op.kind {
        OpKind::Set { offset: _, amount } => *amount != 0,
        _ => false,
    }
}

/// Might this op change the value of the cell the pointer rests on after
/// it executes?
pub fn writes_cell(op: &Op) -> bool {
    match &op.kind {
        OpKind::Alter { amount, .. } => *amount != 0,
        OpKind::Loop { .. }
        | OpKind::Multiply { .. }
        | OpKind::In
        | OpKind::Set { .. } => true,
        _ => false,
    }
}

/// Might this op leave the pointer somewhere other than where it started?
pub fn moves_tape(op: &mut Op) -> bool {
    match &op.kind {
        OpKind::Skip { .. } => true,
        OpKind::Alter { offset, .. } => *offset != 0,
        OpKind::Loop { .. } => {
            let info = get_loop_info(op);
            info.uncertain_forwards || info.uncertain_backwards
        }
        _ => false,
    }
}

pub fn performs_io(op: &Op) -> bool {
    matches!(op.kind, OpKind::In | OpKind::Out)
}

/// The pointer delta after executing `op`, when statically known.
pub fn get_final_offset(op: &mut Op) -> Option<isize> {
    match &op.kind {
        OpKind::Alter { offset, .. } => Some(*offset),
        OpKind::Set { .. }
        | OpKind::Multiply { .. }
        | OpKind::In
        | OpKind::Out
        | OpKind::BoundsCheck { .. } => Some(0),
        OpKind::Loop { .. } => {
            let info = get_loop_info(op);
            if info.uncertain_forwards || info.uncertain_backwards {
                None
            } else {
                // A loop with a certain balance exits where it entered.
                Some(0)
            }
        }
        OpKind::Skip { .. } | OpKind::Once { .. } => None,
    }
}

/// Lowest pointer offset occupied or dereferenced by a straight-line op,
/// relative to its entry pointer. A move-only alter counts its landing
/// position: the interpreter's sanity check constrains the pointer at
/// every instruction boundary, not just at dereferences.
///
/// Not defined for `Loop`, `Skip` or `Once`.
pub fn get_min_offset(op: &Op) -> isize {
    match &op.kind {
        OpKind::Alter { offset, .. } => 0.min(*offset),
        OpKind::Set { .. } | OpKind::In | OpKind::Out | OpKind::BoundsCheck { .. } => 0,
        OpKind::Multiply { offset, .. } => 0.min(*offset),
        OpKind::Loop { .. } | OpKind::Skip { .. } | OpKind::Once { .. } => {
            unreachable!("offset span is undefined for loops and skips")
        }
    }
}

/// Highest pointer offset occupied or dereferenced by a straight-line op.
/// See [`get_min_offset`].
pub fn get_max_offset(op: &Op) -> isize {
    match &op.kind {
        OpKind::Alter { offset, .. } => 0.max(*offset),
        OpKind::Set { offset, .. } => *offset,
        OpKind::In | OpKind::Out | OpKind::BoundsCheck { .. } => 0,
        OpKind::Multiply { offset, .. } => 0.max(*offset),
        OpKind::Loop { .. } | OpKind::Skip { .. } | OpKind::Once { .. } => {
            unreachable!("offset span is undefined for loops and skips")
        }
    }
}

/// Computes (or fetches the memoized) movement summary of a loop.
///
/// # Panics
/// Panics if `op` is not a `Loop`.
pub fn get_loop_info(op: &mut Op) -> LoopInfo {
    let OpKind::Loop { children, info } = &mut op.kind else {
        panic!("get_loop_info called on a non-loop op");
    };

    if let Some(cached) = info {
        return *cached;
    }

    let mut computed = LoopInfo::default();

    // Net movement of one iteration, summed over alters only; skips and
    // uncertain child loops contribute uncertainty flags instead.
    let mut balance: isize = 0;
    // Running position while it can still be tracked, for the occupied span.
    let mut pos: isize = 0;
    let mut pos_known = true;

    for child in children.iter_mut() {
        if pos_known {
            match &child.kind {
                OpKind::Loop { .. } | OpKind::Skip { .. } => {}
                _ => {
                    computed.offset_lower = computed.offset_lower.min(pos + get_min_offset(child));
                    computed.offset_upper = computed.offset_upper.max(pos + get_max_offset(child));
                }
            }
        }

        match &mut child.kind {
            OpKind::Alter { offset, .. } => {
                balance += *offset;
                pos += *offset;
                if pos_known {
                    computed.offset_lower = computed.offset_lower.min(pos);
                    computed.offset_upper = computed.offset_upper.max(pos);
                }
            }
            OpKind::Skip { offset } => {
                if *offset > 0 {
                    computed.inner_uncertain_forwards = true;
                } else {
                    computed.inner_uncertain_backwards = true;
                }
                pos_known = false;
            }
            OpKind::Loop { .. } => {
                let child_info = get_loop_info(child);
                computed.inner_uncertain_forwards |= child_info.uncertain_forwards;
                computed.inner_uncertain_backwards |= child_info.uncertain_backwards;
                if child_info.uncertain_forwards || child_info.uncertain_backwards {
                    pos_known = false;
                } else if pos_known {
                    computed.offset_lower = computed.offset_lower.min(pos + child_info.offset_lower);
                    computed.offset_upper = computed.offset_upper.max(pos + child_info.offset_upper);
                }
            }
            _ => {}
        }
    }

    computed.balance = balance;
    computed.uncertain_forwards = computed.inner_uncertain_forwards || balance > 0;
    computed.uncertain_backwards = computed.inner_uncertain_backwards || balance < 0;
    computed.loops_once_at_most = loops_once_at_most(children);

    let OpKind::Loop { info, .. } = &mut op.kind else {
        unreachable!();
    };
    *info = Some(computed);
    computed
}

/// True when running the body once is guaranteed to leave the controlling
/// cell at zero.
fn loops_once_at_most(children: &mut [Op]) -> bool {
    let Some((last, _)) = children.split_last_mut() else {
        return false;
    };

    if ensures_zero(last) {
        return true;
    }
    last.definitely_zero && !writes_cell(last) && !moves_tape(last)
}

/// Result of a forward scan for accesses to one tracked cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetAccess {
    /// Index of the op the scan stopped at (`block.len()` if it ran off
    /// the end).
    pub pos: usize,
    /// The tracked cell's offset relative to the pointer at `pos`.
    pub offset: isize,
    /// The tracked cell is definitely read there.
    pub read: bool,
    /// The tracked cell is definitely written there.
    pub write: bool,
    /// The scan hit something it cannot see through (a skip, a loop it
    /// cannot rule out, or the end of the block).
    pub uncertain: bool,
}

/// Scans forward from `block[start]` for the first op that touches the
/// cell at `offset` (relative to the pointer as of `start`).
///
/// A certain one-shot loop that provably never touches the tracked cell
/// is stepped over; any other loop, a skip, or the end of the block stops
/// the scan with `uncertain` set.
pub fn offset_might_be_accessed(block: &mut [Op], start: usize, offset: isize) -> OffsetAccess {
    let mut off = offset;

    for pos in start..block.len() {
        let stop = move |read, write, uncertain| OffsetAccess {
            pos,
            offset: off,
            read,
            write,
            uncertain,
        };

        match &mut block[pos].kind {
            OpKind::Alter { offset: o, amount } => {
                if *amount != 0 && off == *o {
                    // += on the cell reads as well as writes.
                    return stop(true, true, false);
                }
                off -= *o;
            }
            OpKind::Set { offset: o, .. } => {
                if off >= 0 && off <= *o {
                    return stop(false, true, false);
                }
            }
            OpKind::Multiply { offset: o, .. } => {
                if off == 0 {
                    return stop(true, false, false);
                }
                if off == *o {
                    return stop(true, true, false);
                }
            }
            OpKind::In => {
                if off == 0 {
                    return stop(false, true, false);
                }
            }
            OpKind::Out => {
                if off == 0 {
                    return stop(true, false, false);
                }
            }
            OpKind::BoundsCheck { .. } => {}
            OpKind::Skip { .. } => return stop(false, false, true),
            OpKind::Loop { .. } => {
                if off == 0 {
                    // The loop condition reads its entry cell.
                    return stop(true, false, false);
                }
                let info = get_loop_info(&mut block[pos]);
                let certain_once = info.loops_once_at_most
                    && !info.uncertain_forwards
                    && !info.uncertain_backwards;
                if !certain_once {
                    return stop(false, false, true);
                }
                let OpKind::Loop { children, .. } = &mut block[pos].kind else {
                    unreachable!();
                };
                if block_may_touch(children, off) {
                    return stop(false, false, true);
                }
                // Certain loops exit where they entered; off is unchanged.
            }
            OpKind::Once { .. } => return stop(false, false, true),
        }
    }

    OffsetAccess {
        pos: block.len(),
        offset: off,
        read: false,
        write: false,
        uncertain: true,
    }
}

/// Conservative: could any op in this block touch the cell at `offset`?
fn block_may_touch(block: &mut [Op], offset: isize) -> bool {
    let mut off = offset;

    for op in block.iter_mut() {
        match &mut op.kind {
            OpKind::Alter { offset: o, amount } => {
                if *amount != 0 && off == *o {
                    return true;
                }
                off -= *o;
            }
            OpKind::Set { offset: o, .. } => {
                if off >= 0 && off <= *o {
                    return true;
                }
            }
            OpKind::Multiply { offset: o, .. } => {
                if off == 0 || off == *o {
                    return true;
                }
            }
            OpKind::In | OpKind::Out => {
                if off == 0 {
                    return true;
                }
            }
            OpKind::BoundsCheck { .. } => {}
            OpKind::Skip { .. } | OpKind::Once { .. } => return true,
            OpKind::Loop { .. } => {
                if off == 0 {
                    return true;
                }
                let info = get_loop_info(op);
                let certain_once = info.loops_once_at_most
                    && !info.uncertain_forwards
                    && !info.uncertain_backwards;
                if !certain_once {
                    return true;
                }
                let OpKind::Loop { children, .. } = &mut op.kind else {
                    unreachable!();
                };
                if block_may_touch(children, off) {
                    return true;
                }
            }
        }
    }

    false
}
