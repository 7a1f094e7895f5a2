//! Bounds-check insertion.
//!
//! The goal is an interpreter hot path with no per-op tape checks: every
//! straight-line segment is preceded by one [`OpKind::BoundsCheck`] per
//! direction covering the segment's farthest reach. Checks are tracked
//! per direction because an uncertainty (a skip, or a loop that can
//! drift) only invalidates tracking on the side it moves toward: if the
//! pointer is merely further forward than the static walk assumed, a
//! backward check computed from the stale offset still covers everything
//! it needs to.

use crate::ir::{Block, Op, OpKind};
use crate::optimiser::helpers;

/// One direction's pending check: where it would be inserted, the running
/// pointer offset since that point, and the farthest reach seen so far.
#[derive(Debug, Clone, Copy)]
struct Seg {
    anchor: usize,
    off: isize,
    bound: isize,
}

impl Seg {
    fn reset_at(anchor: usize) -> Seg {
        Seg {
            anchor,
            off: 0,
            bound: 0,
        }
    }
}

/// Inserts bounds checks into `block` and, recursively, into every loop
/// body inside it.
pub fn add_bounds_checks(block: &mut Block) {
    let mut fwd = Seg::reset_at(0);
    let mut bck = Seg::reset_at(0);

    let mut i = 0;
    while i < block.len() {
        match &block[i].kind {
            OpKind::Loop { .. } => {
                // Entering the loop reads the cell under the pointer.
                fwd.bound = fwd.bound.max(fwd.off);
                bck.bound = bck.bound.min(bck.off);

                {
                    let OpKind::Loop { children, .. } = &mut block[i].kind else {
                        unreachable!();
                    };
                    add_bounds_checks(children);
                }
                let info = helpers::get_loop_info(&mut block[i]);

                // Backward side.
                if !info.uncertain_backwards
                    || (!info.inner_uncertain_backwards && info.loops_once_at_most)
                {
                    let OpKind::Loop { children, .. } = &mut block[i].kind else {
                        unreachable!();
                    };
                    if let Some(offset) = take_leading_check(children, true) {
                        bck.bound = bck.bound.min(bck.off + offset);
                    }
                    if info.uncertain_backwards {
                        // Runs at most once, but that one pass may leave the
                        // pointer up to `balance` further back.
                        bck.off += info.balance.min(0);
                        bck.bound = bck.bound.min(bck.off);
                    }
                } else {
                    if let Some(at) = flush(block, &bck, true) {
                        if fwd.anchor >= at {
                            fwd.anchor += 1;
                        }
                        i += 1;
                    }
                    bck = Seg::reset_at(i + 1);
                }

                // Forward side, mirrored.
                let info = helpers::get_loop_info(&mut block[i]);
                if !info.uncertain_forwards
                    || (!info.inner_uncertain_forwards && info.loops_once_at_most)
                {
                    let OpKind::Loop { children, .. } = &mut block[i].kind else {
                        unreachable!();
                    };
                    if let Some(offset) = take_leading_check(children, false) {
                        fwd.bound = fwd.bound.max(fwd.off + offset);
                    }
                    if info.uncertain_forwards {
                        fwd.off += info.balance.max(0);
                        fwd.bound = fwd.bound.max(fwd.off);
                    }
                } else {
                    if let Some(at) = flush(block, &fwd, false) {
                        if bck.anchor >= at {
                            bck.anchor += 1;
                        }
                        i += 1;
                    }
                    fwd = Seg::reset_at(i + 1);
                }

                i += 1;
            }

            OpKind::Skip { offset } => {
                let offset = *offset;
                // The skip reads the cell it starts on; everything past
                // that is guaranteed by the interpreter's skip margin.
                fwd.bound = fwd.bound.max(fwd.off);
                bck.bound = bck.bound.min(bck.off);

                if offset > 0 {
                    if let Some(at) = flush(block, &fwd, false) {
                        if bck.anchor >= at {
                            bck.anchor += 1;
                        }
                        i += 1;
                    }
                    fwd = Seg::reset_at(i + 1);
                } else {
                    if let Some(at) = flush(block, &bck, true) {
                        if fwd.anchor >= at {
                            fwd.anchor += 1;
                        }
                        i += 1;
                    }
                    bck = Seg::reset_at(i + 1);
                }

                i += 1;
            }

            _ => {
                fwd.bound = fwd.bound.max(fwd.off + helpers::get_max_offset(&block[i]));
                bck.bound = bck.bound.min(bck.off + helpers::get_min_offset(&block[i]));
                if let OpKind::Alter { offset, .. } = &block[i].kind {
                    fwd.off += *offset;
                    bck.off += *offset;
                }
                i += 1;
            }
        }
    }

    // The block's final pointer position is occupied (and, in a loop
    // body, dereferenced by the back-jump) before any further check runs.
    fwd.bound = fwd.bound.max(fwd.off);
    bck.bound = bck.bound.min(bck.off);

    if let Some(at) = flush(block, &fwd, false) {
        if bck.anchor >= at {
            bck.anchor += 1;
        }
    }
    flush(block, &bck, true);
}

/// Emits a pending check, or widens one already sitting at the anchor and
/// pointing the same way. Returns the insertion index if a node was
/// actually inserted.
fn flush(block: &mut Block, seg: &Seg, backwards: bool) -> Option<usize> {
    let needed = if backwards {
        seg.bound < 0
    } else {
        seg.bound > 0
    };
    if !needed {
        return None;
    }

    if seg.anchor < block.len() {
        if let OpKind::BoundsCheck { offset } = &mut block[seg.anchor].kind {
            if (*offset < 0) == backwards {
                *offset = if backwards {
                    (*offset).min(seg.bound)
                } else {
                    (*offset).max(seg.bound)
                };
                return None;
            }
        }
    }

    block.insert(seg.anchor, Op::bounds_check(seg.bound));
    Some(seg.anchor)
}

/// Removes and returns the first leading bounds check pointing the given
/// way. Only the run of checks at the very head of the block is eligible:
/// anything later runs after real work and cannot be hoisted.
fn take_leading_check(children: &mut Block, backwards: bool) -> Option<isize> {
    for j in 0..children.len() {
        match children[j].kind {
            OpKind::BoundsCheck { offset } => {
                if (offset < 0) == backwards {
                    children.remove(j);
                    return Some(offset);
                }
            }
            _ => return None,
        }
    }
    None
}
