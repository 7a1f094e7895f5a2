//! Builds the IR tree out of a byte source.
//!
//! Of the input only the eight operator bytes mean anything; everything
//! else is a comment. Runs of `+`/`-` and `<`/`>` are folded into single
//! [`OpKind::Alter`] nodes while reading, and every `]` hands the freshly
//! closed loop to the idiom recognizer before parsing continues.

use std::io::Read;

use crate::error::{self, BuildError};
use crate::ir::{Block, Op, OpKind};
use crate::optimiser;

/// Reads a whole program and returns its root node.
///
/// With `stop_at_bang` set (interactive input), an `!` outside any loop
/// ends the program; inside a loop it is ignored with a warning. An
/// unmatched `]` is an error, while loops left open at end of input are
/// closed implicitly.
pub fn build_tree<R: Read>(input: R, stop_at_bang: bool) -> Result<Op, BuildError> {
    let mut parents: Vec<Block> = Vec::new();
    let mut current: Block = Vec::new();

    for byte in input.bytes() {
        match byte? {
            b'+' => extend_amount(&mut current, 1),
            b'-' => extend_amount(&mut current, -1),
            b'>' => extend_offset(&mut current, 1),
            b'<' => extend_offset(&mut current, -1),
            b',' => current.push(Op::new(OpKind::In)),
            b'.' => current.push(Op::new(OpKind::Out)),
            b'[' => {
                parents.push(std::mem::take(&mut current));
            }
            b']' => {
                let Some(mut parent) = parents.pop() else {
                    return Err(BuildError::UnbalancedClose);
                };
                parent.push(Op::loop_of(current));
                optimiser::optimise_loop(&mut parent);
                current = parent;
            }
            b'!' if stop_at_bang => {
                if parents.is_empty() {
                    break;
                }
                error::warn("found a bang inside a loop; ignoring.");
            }
            _ => {}
        }
    }

    // Loops still open at end of input close as if the missing brackets
    // were right here.
    while let Some(mut parent) = parents.pop() {
        parent.push(Op::loop_of(current));
        optimiser::optimise_loop(&mut parent);
        current = parent;
    }

    Ok(Op::once(current))
}

/// `+`/`-` either bump the trailing alter or set, or start a new alter.
fn extend_amount(block: &mut Block, delta: crate::Cell) {
    match block.last_mut().map(|op| &mut op.kind) {
        Some(OpKind::Alter { amount, .. }) | Some(OpKind::Set { amount, .. }) => {
            *amount = amount.wrapping_add(delta);
        }
        _ => block.push(Op::alter(0, delta)),
    }
}

/// `<`/`>` extend the trailing alter only while it is still move-only.
fn extend_offset(block: &mut Block, delta: isize) {
    match block.last_mut().map(|op| &mut op.kind) {
        Some(OpKind::Alter { offset, amount: 0 }) => *offset += delta,
        _ => block.push(Op::alter(delta, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_block(source: &str) -> Block {
        let root = build_tree(source.as_bytes(), false).unwrap();
        let OpKind::Once { children } = root.kind else {
            unreachable!();
        };
        children
    }

    fn kinds(block: &Block) -> Vec<OpKind> {
        block.iter().map(|op| op.kind.clone()).collect()
    }

    #[test]
    fn folds_runs_while_reading() {
        // The movement run keeps absorbing +/- until an add breaks it.
        let block = root_block("+++>>--");
        assert_eq!(
            kinds(&block),
            vec![
                OpKind::Alter {
                    offset: 0,
                    amount: 3
                },
                OpKind::Alter {
                    offset: 2,
                    amount: -2
                },
            ]
        );

        let block = root_block("><+-");
        assert_eq!(
            kinds(&block),
            vec![OpKind::Alter {
                offset: 0,
                amount: 0
            }]
        );
    }

    #[test]
    fn everything_else_is_comment() {
        let block = root_block("hello + world - !");
        assert_eq!(
            kinds(&block),
            vec![OpKind::Alter {
                offset: 0,
                amount: 0
            }]
        );
    }

    #[test]
    fn plus_extends_a_fresh_set() {
        // [-] collapses to a clearing set, which the following pluses
        // then turn into a direct constant load.
        let block = root_block("[-]+++");
        assert_eq!(
            kinds(&block),
            vec![OpKind::Set {
                offset: 0,
                amount: 3
            }]
        );
    }

    #[test]
    fn unbalanced_close_is_an_error() {
        assert!(matches!(
            build_tree("]".as_bytes(), false),
            Err(BuildError::UnbalancedClose)
        ));
        assert!(matches!(
            build_tree("+[-]]".as_bytes(), false),
            Err(BuildError::UnbalancedClose)
        ));
    }

    #[test]
    fn unclosed_loop_is_tolerated() {
        let block = root_block("+[");
        assert_eq!(block.len(), 2);
        assert!(matches!(
            block[1].kind,
            OpKind::Loop { ref children, .. } if children.is_empty()
        ));

        // The implicit close still feeds the idiom recognizer.
        let block = root_block("+[-");
        assert_eq!(
            kinds(&block)[1],
            OpKind::Set {
                offset: 0,
                amount: 0
            }
        );
    }

    #[test]
    fn bang_ends_interactive_input_at_top_level_only() {
        let root = build_tree("+!+".as_bytes(), true).unwrap();
        let OpKind::Once { children } = root.kind else {
            unreachable!();
        };
        assert_eq!(
            kinds(&children),
            vec![OpKind::Alter {
                offset: 0,
                amount: 1
            }]
        );

        // Inside a loop the bang is ignored.
        let root = build_tree("+[!-]".as_bytes(), true).unwrap();
        let OpKind::Once { children } = root.kind else {
            unreachable!();
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(
            children[1].kind,
            OpKind::Set {
                offset: 0,
                amount: 0
            }
        ));
    }

    #[test]
    fn nested_loops_build_a_tree() {
        let block = root_block(",[>,[-.]<]");
        assert_eq!(block.len(), 2);
        let OpKind::Loop { children, .. } = &block[1].kind else {
            panic!("expected a loop");
        };
        assert!(matches!(children[2].kind, OpKind::Loop { .. }));
    }
}
