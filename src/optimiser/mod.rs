//! Module that implements `optimise`, which rewrites the IR tree into its
//! executable form.
//!
//! Loop bodies are already in shape by the time the tree reaches this
//! module: the parser runs [`loops::optimise_loop`] (which itself runs the
//! peephole pass over the body) every time a `]` closes. What remains is
//! the root block's own peephole pass, knowing that the tape starts out
//! all zero, and the bounds-check insertion walk over the whole tree.

mod bounds;
mod helpers;
mod loops;
mod peephole;

pub use bounds::add_bounds_checks;
pub use helpers::{
    ensures_nonzero, ensures_zero, get_final_offset, get_loop_info, get_max_offset,
    get_min_offset, moves_tape, offset_might_be_accessed, performs_io, writes_cell, OffsetAccess,
};
pub use loops::optimise_loop;
pub use peephole::{optimise_block, Entry};

use crate::ir::{Op, OpKind};

/// Optimizes a program tree in place: peephole over the root block, then
/// bounds checks everywhere.
pub fn optimise(root: &mut Op) {
    let OpKind::Once { children } = &mut root.kind else {
        unreachable!("the program root is always a once node");
    };
    peephole::optimise_block(children, Entry::AllZero);
    bounds::add_bounds_checks(children);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn optimised_root(source: &str) -> Vec<Op> {
        let mut root = parser::build_tree(source.as_bytes(), false).unwrap();
        optimise(&mut root);
        let OpKind::Once { children } = root.kind else {
            unreachable!();
        };
        children
    }

    #[test]
    fn clear_loop_at_start_vanishes() {
        // The tape is zero, the clear loop does nothing, and nothing is
        // left to bounds-check.
        let block = optimised_root("[-]");
        assert!(block.is_empty());
    }

    #[test]
    fn multiply_program_takes_its_final_shape() {
        // >+++++++[<+++++++++>-]<. from the end-to-end suite: the loop
        // body becomes a multiply fanout and the whole program is one
        // straight-line segment under a single forward check.
        let block = optimised_root(">+++++++[<+++++++++>-]<.");
        let kinds: Vec<_> = block.into_iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OpKind::BoundsCheck { offset: 1 },
                OpKind::Alter {
                    offset: 1,
                    amount: 7
                },
                OpKind::Multiply {
                    offset: -1,
                    amount: 9
                },
                OpKind::Set {
                    offset: 0,
                    amount: 0
                },
                OpKind::Alter {
                    offset: -1,
                    amount: 0
                },
                OpKind::Out,
            ]
        );
    }

    #[test]
    fn loops_remain_loops_when_unrecognized() {
        let block = optimised_root(",[.,]");
        assert!(block
            .iter()
            .any(|op| matches!(op.kind, OpKind::Loop { .. })));
    }
}
