//! Flattens the IR tree into packed linear bytecode.
//!
//! Every instruction is one opcode byte followed by a fixed payload:
//! offsets and jump deltas are host-endian `isize`s, cell amounts a
//! single byte. Loops become a conditional jump pair patched with
//! relative deltas; runs of multiplies become one run-length record that
//! swallows the following clearing set as its trailer.

use crate::ir::{Op, OpKind};
use crate::optimiser;
use crate::Cell;

/// Payload width of an offset or jump delta.
pub const OFFSET_BYTES: usize = std::mem::size_of::<isize>();
/// Size of a whole jump instruction, opcode byte included.
pub const JUMP_BYTES: usize = 1 + OFFSET_BYTES;
/// Size of one `(offset, amount)` multiply record entry.
pub const MULTIPLY_ENTRY_BYTES: usize = OFFSET_BYTES + 1;

/// The bytecode opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Code {
    Alter = 0x00,
    AlterMoveonly = 0x01,
    AlterAddonly = 0x02,
    Set = 0x03,
    SetMulti = 0x04,
    Multiply = 0x05,
    Skip = 0x06,
    BoundsCheck = 0x07,
    In = 0x08,
    Out = 0x09,
    Die = 0x0a,
    JumpIfZero = 0x0b,
    JumpIfNonzero = 0x0c,
}

impl Code {
    /// Decodes an opcode byte; `None` for garbage.
    pub fn from_byte(byte: u8) -> Option<Code> {
        Some(match byte {
            0x00 => Code::Alter,
            0x01 => Code::AlterMoveonly,
            0x02 => Code::AlterAddonly,
            0x03 => Code::Set,
            0x04 => Code::SetMulti,
            0x05 => Code::Multiply,
            0x06 => Code::Skip,
            0x07 => Code::BoundsCheck,
            0x08 => Code::In,
            0x09 => Code::Out,
            0x0a => Code::Die,
            0x0b => Code::JumpIfZero,
            0x0c => Code::JumpIfNonzero,
            _ => return None,
        })
    }
}

/// Summary values the interpreter needs before it starts: the extreme
/// skip strides, which size the tape margins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramMeta {
    /// Most negative `Skip` offset emitted, or 0 if none.
    pub lowest_negative_skip: isize,
    /// Most positive `Skip` offset emitted, or 0 if none.
    pub highest_positive_skip: isize,
}

/// A flattened program: read-only bytecode plus its margins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub code: Vec<u8>,
    pub meta: ProgramMeta,
}

/// Reads an `isize` payload at `at`.
pub fn read_offset(code: &[u8], at: usize) -> isize {
    let mut buf = [0u8; OFFSET_BYTES];
    buf.copy_from_slice(&code[at..at + OFFSET_BYTES]);
    isize::from_le_bytes(buf)
}

/// Reads a cell payload at `at`.
pub fn read_cell(code: &[u8], at: usize) -> Cell {
    code[at] as Cell
}

/// Serializes an optimized tree. The root's loops must have been through
/// the optimiser so their info memos and knowledge flags are in place.
pub fn flatten(root: &mut Op) -> Program {
    let mut flattener = Flattener {
        out: Vec::with_capacity(128),
        meta: ProgramMeta::default(),
        previous_op: None,
        tail_is_loop_jump: false,
    };
    flattener.flatten_op(root);
    Program {
        code: flattener.out,
        meta: flattener.meta,
    }
}

struct Flattener {
    out: Vec<u8>,
    meta: ProgramMeta,
    /// Start of the previous instruction when it may merge with the next
    /// one (multiply record extension, set-trailer fusion).
    previous_op: Option<usize>,
    /// The last emitted instruction is a loop-closing `JumpIfNonzero`;
    /// an enclosing loop ending here needs no back-jump of its own.
    tail_is_loop_jump: bool,
}

impl Flattener {
    fn push_code(&mut self, code: Code) {
        self.out.push(code as u8);
    }

    fn push_offset(&mut self, offset: isize) {
        self.out.extend_from_slice(&offset.to_le_bytes());
    }

    fn push_cell(&mut self, amount: Cell) {
        self.out.push(amount as u8);
    }

    fn patch_offset(&mut self, at: usize, offset: isize) {
        self.out[at..at + OFFSET_BYTES].copy_from_slice(&offset.to_le_bytes());
    }

    fn flatten_op(&mut self, op: &mut Op) {
        let mut op_start = Some(self.out.len());
        self.tail_is_loop_jump = false;

        match &mut op.kind {
            OpKind::Alter { offset, amount } => {
                let (offset, amount) = (*offset, *amount);
                if offset != 0 && amount != 0 {
                    self.push_code(Code::Alter);
                    self.push_offset(offset);
                    self.push_cell(amount);
                } else if offset != 0 {
                    self.push_code(Code::AlterMoveonly);
                    self.push_offset(offset);
                } else {
                    self.push_code(Code::AlterAddonly);
                    self.push_cell(amount);
                }
            }

            OpKind::Set { offset, amount } => {
                let (offset, amount) = (*offset, *amount);
                let was_multiply = self
                    .previous_op
                    .is_some_and(|p| self.out[p] == Code::Multiply as u8);
                let is_multi = offset != 0;
                if was_multiply {
                    // The record's trailing set byte clears (or loads) the
                    // source cell without a separate instruction.
                    self.push_cell(amount);
                    if is_multi {
                        // A multi-set still needs its own instruction; the
                        // trailer it just fed only covers the source cell.
                        op_start = Some(self.out.len());
                    } else {
                        op_start = None;
                    }
                }
                if is_multi {
                    self.push_code(Code::SetMulti);
                    self.push_offset(offset);
                    self.push_cell(amount);
                } else if !was_multiply {
                    self.push_code(Code::Set);
                    self.push_cell(amount);
                }
            }

            OpKind::Multiply { offset, amount } => {
                let (offset, amount) = (*offset, *amount);
                let extendable = self.previous_op.filter(|&p| {
                    self.out[p] == Code::Multiply as u8 && self.out[p + 1] != 0xFF
                });
                if let Some(p) = extendable {
                    self.out[p + 1] += 1;
                    self.push_offset(offset);
                    self.push_cell(amount);
                    op_start = Some(p);
                } else {
                    self.push_code(Code::Multiply);
                    self.out.push(0);
                    self.push_offset(offset);
                    self.push_cell(amount);
                }
            }

            OpKind::Skip { offset } => {
                let offset = *offset;
                self.push_code(Code::Skip);
                self.push_offset(offset);
                self.meta.lowest_negative_skip = self.meta.lowest_negative_skip.min(offset);
                self.meta.highest_positive_skip = self.meta.highest_positive_skip.max(offset);
            }

            OpKind::BoundsCheck { offset } => {
                let offset = *offset;
                self.push_code(Code::BoundsCheck);
                self.push_offset(offset);
            }

            OpKind::In => self.push_code(Code::In),
            OpKind::Out => self.push_code(Code::Out),

            OpKind::Loop { .. } => {
                let info = optimiser::get_loop_info(op);
                let OpKind::Loop { children, .. } = &mut op.kind else {
                    unreachable!();
                };

                let have_initial_jump = !op.definitely_nonzero;
                let jump_from = self.out.len() + 1;
                if have_initial_jump {
                    self.push_code(Code::JumpIfZero);
                    self.push_offset(0);
                }
                let body_start = self.out.len();

                self.previous_op = None;
                for child in children {
                    self.flatten_op(child);
                }

                let body_ends_with_jump = self.tail_is_loop_jump;
                let have_final_jump = !info.loops_once_at_most && !body_ends_with_jump;
                if have_final_jump {
                    self.push_code(Code::JumpIfNonzero);
                    self.push_offset(0);
                }

                let jump_distance = (self.out.len() - body_start) as isize;
                if have_initial_jump {
                    self.patch_offset(jump_from, jump_distance);
                }

                if have_final_jump {
                    // The back edge can never land on a jump-if-zero: the
                    // cell was just seen nonzero. Walk past any chain of
                    // them left by nested loop heads.
                    let mut shortened = jump_distance;
                    while self.out[self.out.len() - shortened as usize]
                        == Code::JumpIfZero as u8
                    {
                        shortened -= JUMP_BYTES as isize;
                    }
                    let patch_at = self.out.len() - OFFSET_BYTES;
                    self.patch_offset(patch_at, -shortened);
                    self.tail_is_loop_jump = true;
                } else {
                    self.tail_is_loop_jump = body_ends_with_jump;
                }

                // Jumps never merge with what follows.
                op_start = None;
            }

            OpKind::Once { children } => {
                self.previous_op = None;
                for child in children {
                    self.flatten_op(child);
                }
                self.tail_is_loop_jump = false;
                self.push_code(Code::Die);
                op_start = None;
            }
        }

        self.previous_op = op_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Op, OpKind};
    use crate::optimiser;

    fn flatten_block(block: Vec<Op>) -> Program {
        let mut root = Op::once(block);
        flatten(&mut root)
    }

    /// Decodes the instruction starting at `at`, returning its mnemonic
    /// and the address just past it.
    fn decode_one(code: &[u8], at: usize) -> (Code, usize) {
        let op = Code::from_byte(code[at]).unwrap();
        let next = match op {
            Code::Alter => at + 1 + OFFSET_BYTES + 1,
            Code::AlterMoveonly
            | Code::Skip
            | Code::BoundsCheck
            | Code::JumpIfZero
            | Code::JumpIfNonzero => at + JUMP_BYTES,
            Code::AlterAddonly | Code::Set => at + 2,
            Code::SetMulti => at + 1 + OFFSET_BYTES + 1,
            Code::Multiply => {
                let repeat = code[at + 1] as usize;
                at + 2 + (repeat + 1) * MULTIPLY_ENTRY_BYTES + 1
            }
            Code::In | Code::Out | Code::Die => at + 1,
        };
        (op, next)
    }

    fn disassemble(code: &[u8]) -> Vec<(usize, Code)> {
        let mut listing = Vec::new();
        let mut at = 0;
        loop {
            let (op, next) = decode_one(code, at);
            listing.push((at, op));
            if op == Code::Die {
                break;
            }
            at = next;
        }
        listing
    }

    #[test]
    fn picks_the_narrowest_alter_variant() {
        let program = flatten_block(vec![Op::alter(2, 3), Op::alter(2, 0), Op::alter(0, 3)]);
        let ops: Vec<Code> = disassemble(&program.code)
            .into_iter()
            .map(|(_, c)| c)
            .collect();
        assert_eq!(
            ops,
            vec![Code::Alter, Code::AlterMoveonly, Code::AlterAddonly, Code::Die]
        );
    }

    #[test]
    fn multiply_run_is_one_record_with_trailer() {
        let block = vec![
            Op::multiply(1, 2),
            Op::multiply(2, 3),
            Op::multiply(-1, 5),
            Op::set(0, 0),
        ];
        let program = flatten_block(block);

        let code = &program.code;
        assert_eq!(code[0], Code::Multiply as u8);
        assert_eq!(code[1], 2, "repeat byte counts entries beyond the first");
        let mut at = 2;
        for (offset, amount) in [(1isize, 2), (2, 3), (-1, 5)] {
            assert_eq!(read_offset(code, at), offset);
            assert_eq!(read_cell(code, at + OFFSET_BYTES), amount);
            at += MULTIPLY_ENTRY_BYTES;
        }
        // The set collapsed into the record trailer.
        assert_eq!(read_cell(code, at), 0);
        assert_eq!(code[at + 1], Code::Die as u8);
    }

    #[test]
    fn multi_set_after_multiply_keeps_its_instruction() {
        let block = vec![Op::multiply(1, 2), Op::set(3, 4)];
        let program = flatten_block(block);

        let code = &program.code;
        assert_eq!(code[0], Code::Multiply as u8);
        let trailer_at = 2 + MULTIPLY_ENTRY_BYTES;
        assert_eq!(read_cell(code, trailer_at), 4);
        assert_eq!(code[trailer_at + 1], Code::SetMulti as u8);
    }

    #[test]
    fn loop_jumps_round_trip() {
        // ,[.,] — a loop nobody optimizes away.
        let mut root = crate::parser::build_tree(",[.,]".as_bytes(), false).unwrap();
        optimiser::optimise(&mut root);
        let program = flatten(&mut root);
        let code = &program.code;

        // IN, then the loop head.
        assert_eq!(code[0], Code::In as u8);
        assert_eq!(code[1], Code::JumpIfZero as u8);
        let forward = read_offset(code, 2);
        let body_start = 2 + OFFSET_BYTES;

        // The body is OUT, IN, then the back jump.
        assert_eq!(code[body_start], Code::Out as u8);
        assert_eq!(code[body_start + 1], Code::In as u8);
        assert_eq!(code[body_start + 2], Code::JumpIfNonzero as u8);
        let backward = read_offset(code, body_start + 3);
        let after_loop = body_start + 2 + JUMP_BYTES;

        // Forward lands just past the back jump's operand; backward lands
        // on the first byte of the body.
        assert_eq!(body_start as isize + forward, after_loop as isize);
        assert_eq!(after_loop as isize + backward, body_start as isize);
        assert_eq!(code[after_loop], Code::Die as u8);
    }

    #[test]
    fn back_jump_skips_nested_loop_heads() {
        // [[-],] — the outer back edge would land on the inner loop's
        // JumpIfZero; since the cell was just seen nonzero, shortening
        // moves it past, straight into the inner body.
        let body = vec![Op::loop_of(vec![Op::alter(0, -1)]), Op::new(OpKind::In)];
        let mut root = Op::once(vec![Op::loop_of(body)]);
        let program = flatten(&mut root);
        let code = &program.code;

        assert_eq!(code[0], Code::JumpIfZero as u8);
        let outer_body = JUMP_BYTES;
        assert_eq!(code[outer_body], Code::JumpIfZero as u8);
        let inner_body = outer_body + JUMP_BYTES;
        assert_eq!(code[inner_body], Code::AlterAddonly as u8);

        // The outer back jump is the last instruction before DIE.
        let listing = disassemble(code);
        let &(back_at, op) = listing.iter().rev().nth(1).unwrap();
        assert_eq!(op, Code::JumpIfNonzero);
        let delta = read_offset(code, back_at + 1);
        let target = (back_at + JUMP_BYTES) as isize + delta;
        assert_eq!(target, inner_body as isize);
    }

    #[test]
    fn once_at_most_loop_has_no_back_jump() {
        // [[-]] — the inner loop guarantees a zero cell, so the outer
        // loop cannot iterate twice and needs no JumpIfNonzero.
        let body = vec![Op::loop_of(vec![Op::alter(0, -1)])];
        let mut root = Op::once(vec![Op::loop_of(body)]);
        let program = flatten(&mut root);
        let ops: Vec<Code> = disassemble(&program.code)
            .into_iter()
            .map(|(_, c)| c)
            .collect();
        assert_eq!(
            ops,
            vec![
                Code::JumpIfZero,
                Code::JumpIfZero,
                Code::AlterAddonly,
                Code::JumpIfNonzero,
                Code::Die,
            ]
        );
    }

    #[test]
    fn nonzero_entry_elides_the_forward_jump() {
        let body = vec![Op::new(OpKind::Out), Op::new(OpKind::In)];
        let mut lp = Op::loop_of(body);
        lp.definitely_nonzero = true;
        let mut root = Op::once(vec![lp]);
        let program = flatten(&mut root);

        assert_eq!(program.code[0], Code::Out as u8);
        assert_eq!(program.code[1], Code::In as u8);
        assert_eq!(program.code[2], Code::JumpIfNonzero as u8);
    }

    #[test]
    fn skip_extremes_reach_the_meta() {
        let block = vec![Op::skip(3), Op::skip(-2), Op::skip(1)];
        let mut root = Op::once(block);
        let program = flatten(&mut root);
        assert_eq!(program.meta.highest_positive_skip, 3);
        assert_eq!(program.meta.lowest_negative_skip, -2);
    }
}
