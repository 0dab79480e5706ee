//! A plain-text instruction listing for a compiled program image, reachable
//! from the CLI behind `--disasm`. Grounded in the corpus's own program
//! lifecycle disassembler, but without its JSON-export half: there is no
//! external visualizer consuming this toolchain's output, so it is just a
//! `Display`-style dump.

use core::bytecode::{unpack_instruction, OpCode};
use core::image;
use num_traits::FromPrimitive;
use std::fmt::Write as _;

/// Renders `image` as a column-aligned listing: one line per instruction,
/// its absolute offset, mnemonic, and decoded payload.
pub fn disassemble(image: &[u8]) -> String {
  let mut out = String::new();
  let constants_size = image::constants_size(image);
  writeln!(out, "; constants_size = {} bytes", constants_size).ok();

  let code_start = image::code_start(image);
  let mut offset = code_start;
  while offset + 4 <= image.len() {
    let word = u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap());
    let (op_byte, payload) = unpack_instruction(word);
    match OpCode::from_u8(op_byte) {
      Some(opcode) => {
        writeln!(out, "{:06x}  {:<12}{}", offset, opcode.mnemonic(), describe_payload(opcode, payload)).ok();
      }
      None => {
        writeln!(out, "{:06x}  <unknown opcode 0x{:02x}>", offset, op_byte).ok();
      }
    }
    offset += 4;
  }
  out
}

fn describe_payload(opcode: OpCode, payload: u32) -> String {
  match opcode {
    OpCode::IPush | OpCode::FPush | OpCode::BPush | OpCode::SPush => format!("const@{}", payload),
    OpCode::LoadGlobal | OpCode::StoreGlobal => format!("sym#{}", payload),
    OpCode::Jmp | OpCode::Jmpz => format!("-> {:06x}", payload),
    _ => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use compiler::compile;
  use lexer::lex;
  use parser::parse;

  #[test]
  fn disassembles_a_simple_program() {
    let tokens = lex("x := 1\nprintln x").unwrap();
    let (arena, root) = parse(&tokens).unwrap();
    let image = compile(&arena, root).unwrap();
    let listing = disassemble(&image);
    assert!(listing.contains("IPUSH"));
    assert!(listing.contains("STORE_GLOBAL"));
    assert!(listing.contains("PRINTLN"));
    assert!(listing.contains("HALT"));
  }
}
