use num_derive::FromPrimitive;

/// The set of instructions supported by the virtual machine. Every
/// instruction is exactly 4 bytes: the opcode occupies the low byte, and the
/// high 24 bits carry a payload (a constant-pool offset, a symbol id, or a
/// target code address) when the instruction needs one.
///
/// **NOTE:** changing the discriminant values changes the on-disk meaning of
/// a program image; keep them in sync with `SPEC_FULL.md`'s opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum OpCode {
  NPush = 0x00,
  IPush = 0x01,
  FPush = 0x02,
  BPush = 0x03,
  SPush = 0x04,

  Add = 0x10,
  Sub = 0x11,
  Mul = 0x12,
  Div = 0x13,
  Or = 0x14,
  And = 0x15,
  NumNeg = 0x16,
  BoolNeg = 0x17,
  Exp = 0x18,
  Mod = 0x19,
  Eq = 0x1a,
  Ne = 0x1b,
  Gt = 0x1c,
  Ge = 0x1d,
  Lt = 0x1e,
  Le = 0x1f,

  LoadGlobal = 0x20,
  StoreGlobal = 0x21,

  Jmp = 0x40,
  Jmpz = 0x41,

  Halt = 0x69,

  Print = 0x80,
  Println = 0x81,
}

impl OpCode {
  /// The opcode's disassembly mnemonic.
  pub fn mnemonic(self) -> &'static str {
    match self {
      OpCode::NPush => "NPUSH",
      OpCode::IPush => "IPUSH",
      OpCode::FPush => "FPUSH",
      OpCode::BPush => "BPUSH",
      OpCode::SPush => "SPUSH",
      OpCode::Add => "ADD",
      OpCode::Sub => "SUB",
      OpCode::Mul => "MUL",
      OpCode::Div => "DIV",
      OpCode::Or => "OR",
      OpCode::And => "AND",
      OpCode::NumNeg => "NUMNEG",
      OpCode::BoolNeg => "BOOLNEG",
      OpCode::Exp => "EXP",
      OpCode::Mod => "MOD",
      OpCode::Eq => "EQ",
      OpCode::Ne => "NE",
      OpCode::Gt => "GT",
      OpCode::Ge => "GE",
      OpCode::Lt => "LT",
      OpCode::Le => "LE",
      OpCode::LoadGlobal => "LOAD_GLOBAL",
      OpCode::StoreGlobal => "STORE_GLOBAL",
      OpCode::Jmp => "JMP",
      OpCode::Jmpz => "JMPZ",
      OpCode::Halt => "HALT",
      OpCode::Print => "PRINT",
      OpCode::Println => "PRINTLN",
    }
  }

  /// Whether this opcode's payload is a jump target, i.e. needs patching
  /// from a label id to an absolute program-image address.
  pub fn is_jump(self) -> bool {
    matches!(self, OpCode::Jmp | OpCode::Jmpz)
  }
}

/// Packs an opcode and a 24-bit payload into the 4-byte little-endian word
/// the VM fetches each cycle.
pub fn pack_instruction(opcode: OpCode, payload: u32) -> [u8; 4] {
  debug_assert!(payload <= 0x00ff_ffff, "instruction payload does not fit in 24 bits");
  let word = (opcode as u32) | (payload << 8);
  word.to_le_bytes()
}

/// Splits a fetched instruction word into its opcode byte and 24-bit
/// payload.
pub fn unpack_instruction(word: u32) -> (u8, u32) {
  ((word & 0xff) as u8, word >> 8)
}

#[cfg(test)]
mod tests {
  use super::*;
  use num_traits::FromPrimitive;

  #[test]
  fn pack_and_unpack_round_trip() {
    let bytes = pack_instruction(OpCode::LoadGlobal, 0x00ab_cdef & 0x00ff_ffff);
    let word = u32::from_le_bytes(bytes);
    let (op, payload) = unpack_instruction(word);
    assert_eq!(OpCode::from_u8(op), Some(OpCode::LoadGlobal));
    assert_eq!(payload, 0x00ab_cdef & 0x00ff_ffff);
  }

  #[test]
  fn opcode_byte_is_low_byte() {
    let bytes = pack_instruction(OpCode::Halt, 0);
    assert_eq!(bytes[0], OpCode::Halt as u8);
  }
}
