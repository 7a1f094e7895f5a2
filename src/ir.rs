//! The typed intermediate representation the optimiser works on.
//!
//! One source program becomes a tree of [`Op`]s rooted at an
//! [`OpKind::Once`] node. Loops own their children; nothing is shared.

use crate::Cell;

/// A block of IR nodes, executed in order.
pub type Block = Vec<Op>;

/// One IR node plus the knowledge annotations the peephole pass computes.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub kind: OpKind,
    /// The current cell is known to hold zero when this op is reached.
    pub definitely_zero: bool,
    /// The current cell is known to hold something other than zero when
    /// this op is reached. Never set together with `definitely_zero`.
    pub definitely_nonzero: bool,
}

/// What an IR node does.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Move the pointer by `offset`, then add `amount` to the cell there.
    Alter { offset: isize, amount: Cell },
    /// Read one byte into the current cell (EOF reads as 0).
    In,
    /// Write the current cell.
    Out,
    /// A standard `[` ... `]` loop.
    Loop {
        children: Block,
        /// Memoized analysis result; `Some` means final.
        info: Option<LoopInfo>,
    },
    /// Write `amount` to every cell from the pointer to `pointer + offset`
    /// inclusive. `offset` is never negative.
    Set { offset: isize, amount: Cell },
    /// Add `current cell * amount` to the cell at `offset`. The pointer
    /// does not move and `offset` is never zero.
    Multiply { offset: isize, amount: Cell },
    /// Move the pointer by `offset` until it lands on a zero cell.
    /// `offset` is never zero.
    Skip { offset: isize },
    /// Make sure the tape reaches from the pointer to `pointer + offset`.
    /// `offset` is never zero. Inserted by the optimiser, invisible to
    /// the source language.
    BoundsCheck { offset: isize },
    /// The program root, executed once.
    Once { children: Block },
}

/// What is known about a loop's pointer movement and termination.
///
/// The `inner_uncertain_*` flags record that some child on its own can
/// move the pointer arbitrarily in that direction (a skip, or a nested
/// uncertain loop). The `uncertain_*` flags additionally fold in the
/// per-iteration net balance: a loop that drifts by +1 each pass can end
/// up arbitrarily far forward even though no single child is uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopInfo {
    /// Lowest pointer offset occupied or dereferenced during one
    /// iteration, counting only the statically bounded part. Always <= 0.
    pub offset_lower: isize,
    /// Highest such offset. Always >= 0.
    pub offset_upper: isize,
    pub inner_uncertain_forwards: bool,
    pub inner_uncertain_backwards: bool,
    pub uncertain_forwards: bool,
    pub uncertain_backwards: bool,
    /// Net pointer movement of one iteration summed over the alters;
    /// skips and uncertain child loops only add movement in the
    /// direction they are flagged for, so this is a lower bound on net
    /// movement when only forward uncertainty is present (and an upper
    /// bound in the mirrored case).
    pub balance: isize,
    /// The body, run once, is guaranteed to leave the controlling cell
    /// at zero, so the loop cannot iterate twice.
    pub loops_once_at_most: bool,
}

impl Op {
    pub fn new(kind: OpKind) -> Op {
        Op {
            kind,
            definitely_zero: false,
            definitely_nonzero: false,
        }
    }

    pub fn alter(offset: isize, amount: Cell) -> Op {
        Op::new(OpKind::Alter { offset, amount })
    }

    pub fn set(offset: isize, amount: Cell) -> Op {
        debug_assert!(offset >= 0);
        Op::new(OpKind::Set { offset, amount })
    }

    pub fn multiply(offset: isize, amount: Cell) -> Op {
        debug_assert!(offset != 0);
        Op::new(OpKind::Multiply { offset, amount })
    }

    pub fn skip(offset: isize) -> Op {
        debug_assert!(offset != 0);
        Op::new(OpKind::Skip { offset })
    }

    pub fn bounds_check(offset: isize) -> Op {
        debug_assert!(offset != 0);
        Op::new(OpKind::BoundsCheck { offset })
    }

    pub fn loop_of(children: Block) -> Op {
        Op::new(OpKind::Loop {
            children,
            info: None,
        })
    }

    pub fn once(children: Block) -> Op {
        Op::new(OpKind::Once { children })
    }

    /// The children of a `Loop` or `Once` node.
    pub fn children(&self) -> Option<&Block> {
        match &self.kind {
            OpKind::Loop { children, .. } | OpKind::Once { children } => Some(children),
            _ => None,
        }
    }

    /// Clears both knowledge flags, keeping the payload.
    pub fn forget_knowledge(&mut self) {
        self.definitely_zero = false;
        self.definitely_nonzero = false;
    }

    /// Copies the knowledge flags from another node. Used when a deleted
    /// node's successor inherits its entry state.
    pub fn inherit_knowledge(&mut self, from: &Op) {
        self.definitely_zero = from.definitely_zero;
        self.definitely_nonzero = from.definitely_nonzero;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_flags_start_clear() {
        let op = Op::alter(2, -1);
        assert!(!op.definitely_zero);
        assert!(!op.definitely_nonzero);
    }

    #[test]
    fn knowledge_inheritance() {
        let mut a = Op::set(0, 0);
        a.definitely_zero = true;
        let mut b = Op::new(OpKind::Out);
        b.inherit_knowledge(&a);
        assert!(b.definitely_zero);
        b.forget_knowledge();
        assert!(!b.definitely_zero && !b.definitely_nonzero);
    }
}
