//! Human-readable dumps of the optimized tree and the flattened
//! bytecode, behind `--dump-tree` and `--dump-opcodes`.

use std::io::{self, Write};

use crate::flattener::{read_cell, read_offset, Code, Program, OFFSET_BYTES};
use crate::ir::{Op, OpKind};

/// Prints the IR tree, loops indented, one uncertainty tag per loop.
pub fn print_tree(root: &Op, out: &mut impl Write) -> io::Result<()> {
    print_op(root, 0, out)?;
    writeln!(out)
}

fn print_op(op: &Op, indent: usize, out: &mut impl Write) -> io::Result<()> {
    match &op.kind {
        OpKind::Once { children } => {
            for child in children {
                print_op(child, indent, out)?;
            }
        }

        OpKind::BoundsCheck { offset } => write!(out, "BOUND[{offset}] ")?,

        OpKind::Alter { offset, amount } => {
            if *offset > 0 {
                write!(out, ">{offset}")?;
            } else if *offset < 0 {
                write!(out, "<{}", -offset)?;
            }
            if *amount != 0 && *offset != 0 {
                write!(out, "_")?;
            }
            if *amount != 0 {
                write!(out, "{amount:+}")?;
            }
            write!(out, " ")?;
        }

        OpKind::Set { offset: 0, amount } => write!(out, "SET{amount} ")?,
        OpKind::Set { offset, amount } => write!(out, "SET{amount}@0..{offset} ")?,

        OpKind::Multiply { offset, amount } => write!(out, "*{amount}_@{offset} ")?,

        OpKind::In => write!(out, ", ")?,
        OpKind::Out => write!(out, ". ")?,

        OpKind::Skip { offset } => write!(out, "S{offset} ")?,

        OpKind::Loop { children, info } => {
            writeln!(out, "[")?;
            write!(out, "{:indent$}", "", indent = indent + 2)?;
            for child in children {
                print_op(child, indent + 2, out)?;
            }
            writeln!(out)?;
            write!(out, "{:indent$}] (uncertainties: ", "")?;
            if let Some(info) = info {
                if info.uncertain_backwards {
                    write!(out, "<")?;
                }
                if info.uncertain_forwards {
                    write!(out, ">")?;
                }
            }
            writeln!(out, ")")?;
            write!(out, "{:indent$}", "")?;
        }
    }
    Ok(())
}

/// Prints a disassembly of the bytecode, one instruction per line with
/// its byte address; jump targets are resolved to absolute addresses.
pub fn print_flattened(program: &Program, out: &mut impl Write) -> io::Result<()> {
    let code = &program.code;
    let mut address = 0;

    loop {
        let start = address;
        let Some(op) = Code::from_byte(code[address]) else {
            writeln!(out, "{start:08x}: ??? {:#04x}", code[address])?;
            return Ok(());
        };
        address += 1;

        match op {
            Code::Alter => {
                let offset = read_offset(code, address);
                address += OFFSET_BYTES;
                let amount = read_cell(code, address);
                address += 1;
                writeln!(out, "{start:08x}: ALTER >{offset} {amount:+}")?;
            }

            Code::AlterMoveonly => {
                let offset = read_offset(code, address);
                address += OFFSET_BYTES;
                writeln!(out, "{start:08x}: ALTER_MOVEONLY >{offset}")?;
            }

            Code::AlterAddonly => {
                let amount = read_cell(code, address);
                address += 1;
                writeln!(out, "{start:08x}: ALTER_ADDONLY {amount:+}")?;
            }

            Code::Set => {
                let amount = read_cell(code, address);
                address += 1;
                writeln!(out, "{start:08x}: SET {amount}")?;
            }

            Code::SetMulti => {
                let offset = read_offset(code, address);
                address += OFFSET_BYTES;
                let amount = read_cell(code, address);
                address += 1;
                writeln!(out, "{start:08x}: SET_MULTI 0..{offset} {amount}")?;
            }

            Code::Multiply => {
                let repeat = code[address] as usize;
                address += 1;
                writeln!(out, "{start:08x}: MULTIPLY {{")?;
                for _ in 0..=repeat {
                    let entry_at = address;
                    let offset = read_offset(code, address);
                    address += OFFSET_BYTES;
                    let amount = read_cell(code, address);
                    address += 1;
                    writeln!(out, "{entry_at:08x}: \t@{offset} *{amount}")?;
                }
                writeln!(out, "{address:08x}: }}")?;
                // The record trailer doubles as a set of the source cell.
                let amount = read_cell(code, address);
                address += 1;
                writeln!(out, "{:08x}: SET {amount}", address - 1)?;
            }

            Code::Skip => {
                let offset = read_offset(code, address);
                address += OFFSET_BYTES;
                writeln!(out, "{start:08x}: SKIP >{offset}")?;
            }

            Code::BoundsCheck => {
                let offset = read_offset(code, address);
                address += OFFSET_BYTES;
                writeln!(out, "{start:08x}: BOUNDS_CHECK {offset}")?;
            }

            Code::In => writeln!(out, "{start:08x}: IN")?,
            Code::Out => writeln!(out, "{start:08x}: OUT")?,

            Code::JumpIfZero => {
                let delta = read_offset(code, address);
                address += OFFSET_BYTES;
                let target = address as isize + delta;
                writeln!(out, "{start:08x}: JUMPIFZERO {delta:+} ({target:x})")?;
            }

            Code::JumpIfNonzero => {
                let delta = read_offset(code, address);
                address += OFFSET_BYTES;
                let target = address as isize + delta;
                writeln!(out, "{start:08x}: JUMPIFNONZERO {delta:+} ({target:x})")?;
            }

            Code::Die => {
                writeln!(out, "{start:08x}: DIE")?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::parser;

    #[test]
    fn tree_dump_shows_rewritten_ops() {
        let mut root = parser::build_tree(">+++++++[<+++++++++>-]<.".as_bytes(), false).unwrap();
        crate::optimiser::optimise(&mut root);
        let mut out = Vec::new();
        print_tree(&root, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("BOUND[1]"));
        assert!(text.contains(">1_+7"));
        assert!(text.contains("*9_@-1"));
        assert!(text.contains("SET0"));
    }

    #[test]
    fn opcode_dump_lists_every_instruction() {
        let program = compile(",[.,]").unwrap();
        let mut out = Vec::new();
        print_flattened(&program, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("IN"));
        assert!(text.contains("OUT"));
        assert!(text.contains("JUMPIFZERO"));
        assert!(text.contains("JUMPIFNONZERO"));
        assert!(text.trim_end().ends_with("DIE"));
    }

    #[test]
    fn multiply_dump_walks_the_record() {
        let program = compile("+++[->++>+<<]").unwrap();
        let mut out = Vec::new();
        print_flattened(&program, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("MULTIPLY {"));
        assert!(text.contains("@1 *2"));
        assert!(text.contains("@2 *1"));
    }
}
