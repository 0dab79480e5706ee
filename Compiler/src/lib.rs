use core::ast::{ASTArena, ASTForNode, ASTNodeIdx, ASTNodeKind};
use core::bytecode::{pack_instruction, unpack_instruction, OpCode};
use core::errors::SourceError;
use core::tokens::TokenKind;
use hashbrown::HashMap;

/// Compiles a parsed program into a packed program image: an 8-byte header,
/// an aligned constant pool, and a code section of 4-byte instruction words.
///
/// Symbol resolution happens inline, in the same single walk that emits
/// code — there is no separate resolver pass, since this language has only
/// one scope (globals). Forward jumps are emitted against a label id and
/// patched to their final absolute address only once the whole program has
/// been walked, because a label allocated early in the walk can still be
/// followed by more constants, which would otherwise shift every address
/// computed before the constant pool's final size is known.
pub fn compile(arena: &ASTArena, root: ASTNodeIdx) -> Result<Vec<u8>, SourceError> {
  let mut compiler = Compiler::new(arena);
  compiler.lower_stmt(root)?;
  compiler.emit(OpCode::Halt, 0);
  compiler.assemble()
}

struct Compiler<'a> {
  arena: &'a ASTArena,
  constants: Vec<u8>,
  code: Vec<u8>,
  labels: Vec<Option<u32>>,
  symbols: HashMap<Box<str>, u32>,
  num_symbols: u32,
  hidden_counter: u32,
}

impl<'a> Compiler<'a> {
  fn new(arena: &'a ASTArena) -> Self {
    Compiler {
      arena,
      constants: Vec::new(),
      code: Vec::new(),
      labels: Vec::new(),
      symbols: HashMap::new(),
      num_symbols: 0,
      hidden_counter: 0,
    }
  }

  // ---- constant pool -----------------------------------------------------

  fn pad_constants_to(&mut self, align: usize) {
    while self.constants.len() % align != 0 {
      self.constants.push(0);
    }
  }

  fn push_i32(&mut self, value: i32) -> u32 {
    self.pad_constants_to(4);
    let offset = self.constants.len() as u32;
    self.constants.extend_from_slice(&value.to_le_bytes());
    offset
  }

  fn push_f64(&mut self, value: f64) -> u32 {
    self.pad_constants_to(8);
    let offset = self.constants.len() as u32;
    self.constants.extend_from_slice(&value.to_le_bytes());
    offset
  }

  fn push_bool(&mut self, value: bool) -> u32 {
    let offset = self.constants.len() as u32;
    self.constants.push(value as u8);
    offset
  }

  fn push_str(&mut self, value: &str) -> u32 {
    self.pad_constants_to(4);
    let offset = self.constants.len() as u32;
    self.constants.extend_from_slice(&(value.len() as u32).to_le_bytes());
    self.constants.extend_from_slice(value.as_bytes());
    offset
  }

  // ---- code buffer --------------------------------------------------------

  fn emit(&mut self, opcode: OpCode, payload: u32) {
    self.code.extend_from_slice(&pack_instruction(opcode, payload));
  }

  fn new_label(&mut self) -> u32 {
    self.labels.push(None);
    self.labels.len() as u32 - 1
  }

  fn place_label(&mut self, id: u32) {
    self.labels[id as usize] = Some(self.code.len() as u32);
  }

  // ---- symbols --------------------------------------------------------

  fn symbol_id(&mut self, name: &str) -> u32 {
    if let Some(id) = self.symbols.get(name) {
      return *id;
    }
    let id = self.num_symbols;
    self.symbols.insert(name.into(), id);
    self.num_symbols += 1;
    id
  }

  fn existing_symbol_id(&self, name: &str, line: u32) -> Result<u32, SourceError> {
    self
      .symbols
      .get(name)
      .copied()
      .ok_or_else(|| SourceError::compiler(line, format!("use of undeclared identifier '{}'", name)))
  }

  fn hidden_symbol(&mut self) -> u32 {
    let name = format!("@for_stop#{}", self.hidden_counter);
    self.hidden_counter += 1;
    self.symbol_id(&name)
  }

  // ---- lowering ------------------------------------------------------

  fn lower_stmt(&mut self, idx: ASTNodeIdx) -> Result<(), SourceError> {
    let node = self.arena.get(idx);
    let line = node.line;
    match &node.kind {
      ASTNodeKind::StatementList(stmts) => {
        for stmt in stmts {
          self.lower_stmt(*stmt)?;
        }
        Ok(())
      }
      ASTNodeKind::Print(print) => {
        self.lower_expr(print.expr)?;
        self.emit(if print.break_line { OpCode::Println } else { OpCode::Print }, 0);
        Ok(())
      }
      ASTNodeKind::Assignment(assign) => {
        self.lower_expr(assign.rhs)?;
        let name = self.identifier_name(assign.lhs);
        let sym_id = self.symbol_id(&name);
        self.emit(OpCode::StoreGlobal, sym_id);
        Ok(())
      }
      ASTNodeKind::If(if_node) => {
        self.lower_expr(if_node.condition)?;
        let else_label = self.new_label();
        let exit_label = self.new_label();
        self.emit(OpCode::Jmpz, else_label);
        self.lower_stmt(if_node.then_branch)?;
        self.emit(OpCode::Jmp, exit_label);
        self.place_label(else_label);
        if let Some(else_branch) = if_node.else_branch {
          self.lower_stmt(else_branch)?;
        }
        self.place_label(exit_label);
        Ok(())
      }
      ASTNodeKind::While(while_node) => {
        let top_label = self.new_label();
        let end_label = self.new_label();
        self.place_label(top_label);
        self.lower_expr(while_node.condition)?;
        self.emit(OpCode::Jmpz, end_label);
        self.lower_stmt(while_node.body)?;
        self.emit(OpCode::Jmp, top_label);
        self.place_label(end_label);
        Ok(())
      }
      ASTNodeKind::For(for_node) => self.lower_for(line, for_node),
      _ => {
        // A bare expression statement: evaluated for side effects, result discarded.
        // There is no POP opcode, so the compiler instead routes it through a
        // throwaway global slot rather than leaving the stack unbalanced.
        self.lower_expr(idx)?;
        let sym_id = self.hidden_symbol();
        self.emit(OpCode::StoreGlobal, sym_id);
        Ok(())
      }
    }
  }

  fn lower_for(&mut self, line: u32, for_node: &ASTForNode) -> Result<(), SourceError> {
    self.lower_stmt(for_node.init)?;
    let var_name = match &self.arena.get(for_node.init).kind {
      ASTNodeKind::Assignment(a) => self.identifier_name(a.lhs),
      _ => return Err(SourceError::compiler(line, "'for' initializer must be an assignment")),
    };
    let var_id = self.symbol_id(&var_name);

    self.lower_expr(for_node.stop)?;
    let stop_id = self.hidden_symbol();
    self.emit(OpCode::StoreGlobal, stop_id);

    let top_label = self.new_label();
    let end_label = self.new_label();
    self.place_label(top_label);

    self.emit(OpCode::LoadGlobal, var_id);
    self.emit(OpCode::LoadGlobal, stop_id);
    self.emit(OpCode::Lt, 0);
    self.emit(OpCode::Jmpz, end_label);

    self.lower_stmt(for_node.body)?;

    self.emit(OpCode::LoadGlobal, var_id);
    match for_node.step {
      Some(step) => self.lower_expr(step)?,
      None => {
        let offset = self.push_i32(1);
        self.emit(OpCode::IPush, offset);
      }
    }
    self.emit(OpCode::Add, 0);
    self.emit(OpCode::StoreGlobal, var_id);
    self.emit(OpCode::Jmp, top_label);
    self.place_label(end_label);
    Ok(())
  }

  fn identifier_name(&self, idx: ASTNodeIdx) -> String {
    match &self.arena.get(idx).kind {
      ASTNodeKind::Identifier(name) => name.to_string(),
      _ => unreachable!("parser guarantees assignment/for targets are identifiers"),
    }
  }

  fn lower_expr(&mut self, idx: ASTNodeIdx) -> Result<(), SourceError> {
    let node = self.arena.get(idx);
    let line = node.line;
    match &node.kind {
      ASTNodeKind::IntegerLit(v) => {
        let offset = self.push_i32(*v);
        self.emit(OpCode::IPush, offset);
        Ok(())
      }
      ASTNodeKind::FloatLit(v) => {
        let offset = self.push_f64(*v);
        self.emit(OpCode::FPush, offset);
        Ok(())
      }
      ASTNodeKind::BoolLit(v) => {
        let offset = self.push_bool(*v);
        self.emit(OpCode::BPush, offset);
        Ok(())
      }
      ASTNodeKind::StringLit(s) => {
        let offset = self.push_str(s);
        self.emit(OpCode::SPush, offset);
        Ok(())
      }
      ASTNodeKind::Identifier(name) => {
        let sym_id = self.existing_symbol_id(name, line)?;
        self.emit(OpCode::LoadGlobal, sym_id);
        Ok(())
      }
      ASTNodeKind::Grouping(inner) => self.lower_expr(*inner),
      ASTNodeKind::UnOp(unop) => {
        self.lower_expr(unop.operand)?;
        match unop.op {
          TokenKind::Minus => self.emit(OpCode::NumNeg, 0),
          TokenKind::Not => self.emit(OpCode::BoolNeg, 0),
          TokenKind::Plus => {}
          _ => unreachable!("parser only produces +/-/~ unary operators"),
        }
        Ok(())
      }
      ASTNodeKind::BinOp(binop) => {
        self.lower_expr(binop.left)?;
        self.lower_expr(binop.right)?;
        let opcode = match binop.op {
          TokenKind::Plus => OpCode::Add,
          TokenKind::Minus => OpCode::Sub,
          TokenKind::Star => OpCode::Mul,
          TokenKind::Slash => OpCode::Div,
          TokenKind::Or => OpCode::Or,
          TokenKind::And => OpCode::And,
          TokenKind::Caret => OpCode::Exp,
          TokenKind::Mod => OpCode::Mod,
          TokenKind::EqEq => OpCode::Eq,
          TokenKind::Ne => OpCode::Ne,
          TokenKind::Gt => OpCode::Gt,
          TokenKind::Ge => OpCode::Ge,
          TokenKind::Lt => OpCode::Lt,
          TokenKind::Le => OpCode::Le,
          _ => unreachable!("parser only produces binary operator tokens here"),
        };
        self.emit(opcode, 0);
        Ok(())
      }
      _ => Err(SourceError::compiler(line, format!("'{}' cannot appear in expression position", node.kind.name()))),
    }
  }

  // ---- assembly ------------------------------------------------------

  fn assemble(mut self) -> Result<Vec<u8>, SourceError> {
    self.pad_constants_to(4);
    let constants_size = self.constants.len() as u32;

    self.patch_labels(constants_size)?;

    let mut image = Vec::with_capacity(8 + self.constants.len() + self.code.len());
    image.extend_from_slice(&constants_size.to_le_bytes());
    image.extend_from_slice(&[0u8; 4]);
    image.extend_from_slice(&self.constants);
    image.extend_from_slice(&self.code);
    Ok(image)
  }

  fn patch_labels(&mut self, constants_size: u32) -> Result<(), SourceError> {
    let mut offset = 0usize;
    while offset < self.code.len() {
      let word = u32::from_le_bytes(self.code[offset..offset + 4].try_into().unwrap());
      let (op_byte, payload) = unpack_instruction(word);
      if op_byte == OpCode::Jmp as u8 || op_byte == OpCode::Jmpz as u8 {
        let label_id = payload as usize;
        let addr = self.labels[label_id].expect("every allocated label must be placed before assembly");
        let absolute = addr + 8 + constants_size;
        let op = if op_byte == OpCode::Jmp as u8 { OpCode::Jmp } else { OpCode::Jmpz };
        let patched = pack_instruction(op, absolute);
        self.code[offset..offset + 4].copy_from_slice(&patched);
      }
      offset += 4;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use core::image;
  use lexer::lex;
  use parser::parse;

  fn compile_source(source: &str) -> Vec<u8> {
    let tokens = lex(source).expect("lexing should succeed");
    let (arena, root) = parse(&tokens).expect("parsing should succeed");
    compile(&arena, root).expect("compiling should succeed")
  }

  #[test]
  fn constants_size_is_four_byte_aligned() {
    let img = compile_source("x := 1\nprintln x");
    assert_eq!(image::constants_size(&img) % 4, 0);
  }

  #[test]
  fn ends_in_halt() {
    let img = compile_source("x := 1");
    let code_start = image::code_start(&img);
    let last_word = u32::from_le_bytes(img[img.len() - 4..].try_into().unwrap());
    let (op, _) = unpack_instruction(last_word);
    assert_eq!(op, OpCode::Halt as u8);
    assert!(code_start <= img.len());
  }

  #[test]
  fn undeclared_identifier_is_a_compiler_error() {
    let tokens = lex("println y").unwrap();
    let (arena, root) = parse(&tokens).unwrap();
    assert!(compile(&arena, root).is_err());
  }

  #[test]
  fn if_stmt_patches_both_labels() {
    let img = compile_source("if true then x := 1 else x := 2 end");
    let code_start = image::code_start(&img);
    let mut offset = code_start;
    let mut saw_jmpz = false;
    let mut saw_jmp = false;
    while offset < img.len() {
      let word = u32::from_le_bytes(img[offset..offset + 4].try_into().unwrap());
      let (op, payload) = unpack_instruction(word);
      if op == OpCode::Jmpz as u8 {
        saw_jmpz = true;
        assert!(payload as usize >= code_start);
      }
      if op == OpCode::Jmp as u8 {
        saw_jmp = true;
        assert!(payload as usize >= code_start);
      }
      offset += 4;
    }
    assert!(saw_jmpz && saw_jmp);
  }
}
