use core::ast::{
  ASTArena, ASTAssignmentNode, ASTBinOpNode, ASTForNode, ASTIfNode, ASTNodeIdx, ASTNodeKind, ASTPrintNode, ASTUnOpNode,
  ASTWhileNode,
};
use core::errors::SourceError;
use core::tokens::{Token, TokenKind};

/// Parses a full token stream into an AST arena plus the root statement
/// list's handle.
///
/// Parsing is recursive-descent with one dedicated function per grammar
/// production, following the precedence chain
/// `or -> and -> equality -> comparison -> addition -> multiplication ->
/// modulo -> exponent -> unary -> primary`. `exponent` alone recurses on its
/// own right-hand side rather than looping, which is what makes `^`
/// right-associative while every other binary operator is left-associative.
pub fn parse<'src>(tokens: &[Token<'src>]) -> Result<(ASTArena, ASTNodeIdx), SourceError> {
  let mut parser = Parser { tokens, pos: 0, arena: ASTArena::new() };
  let root = parser.stmts(&[TokenKind::Eof])?;
  parser.expect(TokenKind::Eof, "expected end of program")?;
  Ok((parser.arena, root))
}

struct Parser<'src> {
  tokens: &'src [Token<'src>],
  pos: usize,
  arena: ASTArena,
}

impl<'src> Parser<'src> {
  fn peek(&self) -> &Token<'src> {
    &self.tokens[self.pos]
  }

  fn previous(&self) -> &Token<'src> {
    &self.tokens[self.pos - 1]
  }

  fn check(&self, kind: TokenKind) -> bool {
    self.peek().kind == kind
  }

  fn is_next_one_of(&self, kinds: &[TokenKind]) -> bool {
    kinds.contains(&self.peek().kind)
  }

  fn advance(&mut self) -> Token<'src> {
    let tok = *self.peek();
    if tok.kind != TokenKind::Eof {
      self.pos += 1;
    }
    tok
  }

  fn matches(&mut self, kind: TokenKind) -> bool {
    if self.check(kind) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token<'src>, SourceError> {
    if self.check(kind) {
      Ok(self.advance())
    } else {
      Err(SourceError::syntax(self.peek().line, format!("{}, found '{}'", message, self.peek().lexeme)))
    }
  }

  /// Parses statements until a token in `terminators` is reached. Used both
  /// for the program's top level (terminates on `Eof`) and for the bodies of
  /// `if`/`while`/`for` (terminate on `else` or `end`).
  fn stmts(&mut self, terminators: &[TokenKind]) -> Result<ASTNodeIdx, SourceError> {
    let line = self.peek().line;
    let mut statements = Vec::new();
    while !self.is_next_one_of(terminators) {
      if self.check(TokenKind::Eof) {
        return Err(SourceError::syntax(self.peek().line, "unexpected end of input while parsing statements"));
      }
      statements.push(self.stmt()?);
    }
    Ok(self.arena.push(line, ASTNodeKind::StatementList(statements)))
  }

  fn stmt(&mut self) -> Result<ASTNodeIdx, SourceError> {
    match self.peek().kind {
      TokenKind::Print | TokenKind::Println => self.print_stmt(),
      TokenKind::If => self.if_stmt(),
      TokenKind::While => self.while_stmt(),
      TokenKind::For => self.for_stmt(),
      _ => self.assignment_or_expr(),
    }
  }

  fn print_stmt(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let tok = self.advance();
    let break_line = tok.kind == TokenKind::Println;
    let expr = self.expr()?;
    Ok(self.arena.push(tok.line, ASTNodeKind::Print(ASTPrintNode { break_line, expr })))
  }

  fn if_stmt(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let tok = self.advance();
    let condition = self.expr()?;
    self.expect(TokenKind::Then, "expected 'then' after 'if' condition")?;
    let then_branch = self.stmts(&[TokenKind::Else, TokenKind::End])?;
    let else_branch = if self.matches(TokenKind::Else) {
      Some(self.stmts(&[TokenKind::End])?)
    } else {
      None
    };
    self.expect(TokenKind::End, "expected 'end' to close 'if'")?;
    Ok(self.arena.push(tok.line, ASTNodeKind::If(ASTIfNode { condition, then_branch, else_branch })))
  }

  fn while_stmt(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let tok = self.advance();
    let condition = self.expr()?;
    self.expect(TokenKind::Do, "expected 'do' after 'while' condition")?;
    let body = self.stmts(&[TokenKind::End])?;
    self.expect(TokenKind::End, "expected 'end' to close 'while'")?;
    Ok(self.arena.push(tok.line, ASTNodeKind::While(ASTWhileNode { condition, body })))
  }

  fn for_stmt(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let tok = self.advance();
    let init = self.required_assignment()?;
    self.expect(TokenKind::Comma, "expected ',' after 'for' initializer")?;
    let stop = self.expr()?;
    let step = if self.matches(TokenKind::Comma) { Some(self.expr()?) } else { None };
    self.expect(TokenKind::Do, "expected 'do' after 'for' header")?;
    let body = self.stmts(&[TokenKind::End])?;
    self.expect(TokenKind::End, "expected 'end' to close 'for'")?;
    Ok(self.arena.push(tok.line, ASTNodeKind::For(ASTForNode { init, stop, step, body })))
  }

  /// `expr (ASSIGN expr)?`: a statement is either a bare expression (kept
  /// only for its side effects, since this language has no function calls)
  /// or an assignment. The left-hand side is parsed through the full
  /// expression grammar like any other operand, then checked for being an
  /// `Identifier` node at construction time — mirroring how the reference
  /// design validates an assignment target's supertype/kind only after it
  /// has already been built, rather than restricting the grammar up front.
  fn assignment_or_expr(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let line = self.peek().line;
    let lhs = self.expr()?;
    if self.matches(TokenKind::Assign) {
      self.finish_assignment(line, lhs)
    } else {
      Ok(lhs)
    }
  }

  /// Used by `for_stmt`, where the initializer must be an assignment, not
  /// merely an expression.
  fn required_assignment(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let line = self.peek().line;
    let lhs = self.expr()?;
    self.expect(TokenKind::Assign, "expected ':=' in 'for' initializer")?;
    self.finish_assignment(line, lhs)
  }

  fn finish_assignment(&mut self, line: u32, lhs: ASTNodeIdx) -> Result<ASTNodeIdx, SourceError> {
    if !matches!(self.arena.get(lhs).kind, ASTNodeKind::Identifier(_)) {
      return Err(SourceError::syntax(line, "left-hand side of ':=' must be an identifier"));
    }
    let rhs = self.expr()?;
    Ok(self.arena.push(line, ASTNodeKind::Assignment(ASTAssignmentNode { lhs, rhs })))
  }

  fn expr(&mut self) -> Result<ASTNodeIdx, SourceError> {
    self.or_logical()
  }

  fn or_logical(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.and_logical()?;
    while self.check(TokenKind::Or) {
      let op_tok = self.advance();
      let right = self.and_logical()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  fn and_logical(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.equality()?;
    while self.check(TokenKind::And) {
      let op_tok = self.advance();
      let right = self.equality()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  fn equality(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.comparison()?;
    while self.is_next_one_of(&[TokenKind::EqEq, TokenKind::Ne]) {
      let op_tok = self.advance();
      let right = self.comparison()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  fn comparison(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.addition()?;
    while self.is_next_one_of(&[TokenKind::Gt, TokenKind::Ge, TokenKind::Lt, TokenKind::Le]) {
      let op_tok = self.advance();
      let right = self.addition()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  fn addition(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.multiplication()?;
    while self.is_next_one_of(&[TokenKind::Plus, TokenKind::Minus]) {
      let op_tok = self.advance();
      let right = self.multiplication()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  fn multiplication(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.modulo()?;
    while self.is_next_one_of(&[TokenKind::Star, TokenKind::Slash]) {
      let op_tok = self.advance();
      let right = self.modulo()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  fn modulo(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let mut left = self.exponent()?;
    while self.check(TokenKind::Mod) {
      let op_tok = self.advance();
      let right = self.exponent()?;
      left = self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right }));
    }
    Ok(left)
  }

  /// Right-associative: the right operand is another `exponent()` call, not
  /// `unary()`, so `2^3^2` parses as `2^(3^2)`.
  fn exponent(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let left = self.unary()?;
    if self.check(TokenKind::Caret) {
      let op_tok = self.advance();
      let right = self.exponent()?;
      return Ok(self.arena.push(op_tok.line, ASTNodeKind::BinOp(ASTBinOpNode { op: op_tok.kind, left, right })));
    }
    Ok(left)
  }

  fn unary(&mut self) -> Result<ASTNodeIdx, SourceError> {
    if self.is_next_one_of(&[TokenKind::Plus, TokenKind::Minus, TokenKind::Not]) {
      let op_tok = self.advance();
      let operand = self.unary()?;
      return Ok(self.arena.push(op_tok.line, ASTNodeKind::UnOp(ASTUnOpNode { op: op_tok.kind, operand })));
    }
    self.primary()
  }

  fn primary(&mut self) -> Result<ASTNodeIdx, SourceError> {
    let tok = self.advance();
    match tok.kind {
      TokenKind::Integer => {
        let value: i32 = tok
          .lexeme
          .parse()
          .map_err(|_| SourceError::syntax(tok.line, format!("integer literal '{}' out of range", tok.lexeme)))?;
        Ok(self.arena.push(tok.line, ASTNodeKind::IntegerLit(value)))
      }
      TokenKind::Float => {
        let value: f64 = tok
          .lexeme
          .parse()
          .map_err(|_| SourceError::syntax(tok.line, format!("invalid float literal '{}'", tok.lexeme)))?;
        Ok(self.arena.push(tok.line, ASTNodeKind::FloatLit(value)))
      }
      TokenKind::True => Ok(self.arena.push(tok.line, ASTNodeKind::BoolLit(true))),
      TokenKind::False => Ok(self.arena.push(tok.line, ASTNodeKind::BoolLit(false))),
      TokenKind::String => {
        let inner = &tok.lexeme[1..tok.lexeme.len() - 1];
        Ok(self.arena.push(tok.line, ASTNodeKind::StringLit(inner.into())))
      }
      TokenKind::Identifier => Ok(self.arena.push(tok.line, ASTNodeKind::Identifier(tok.lexeme.into()))),
      TokenKind::LParen => {
        let inner = self.expr()?;
        self.expect(TokenKind::RParen, "expected ')' to close '('")?;
        Ok(self.arena.push(tok.line, ASTNodeKind::Grouping(inner)))
      }
      _ => Err(SourceError::syntax(tok.line, format!("unexpected token '{}' in expression", tok.lexeme))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use core::ast::ASTNodeKind::*;
  use lexer::lex;

  fn parse_source(source: &str) -> (ASTArena, ASTNodeIdx) {
    let tokens = lex(source).expect("lexing should succeed");
    parse(&tokens).expect("parsing should succeed")
  }

  #[test]
  fn parses_an_assignment_and_print() {
    let (arena, root) = parse_source("x := 1 + 2\nprintln x");
    match &arena.get(root).kind {
      StatementList(stmts) => assert_eq!(stmts.len(), 2),
      _ => panic!("expected statement list"),
    }
  }

  #[test]
  fn exponent_is_right_associative() {
    let (arena, root) = parse_source("x := 2 ^ 3 ^ 2");
    let stmts = match &arena.get(root).kind {
      StatementList(s) => s,
      _ => panic!("expected statement list"),
    };
    let assign = match &arena.get(stmts[0]).kind {
      Assignment(a) => a,
      _ => panic!("expected assignment"),
    };
    let top = match &arena.get(assign.rhs).kind {
      BinOp(b) => b,
      _ => panic!("expected BinOp"),
    };
    match &arena.get(top.right).kind {
      BinOp(_) => {}
      other => panic!("expected nested BinOp on the right, got {:?}", other.name()),
    }
  }

  #[test]
  fn parses_if_while_for() {
    let (_, _) = parse_source("if x then println 1 else println 2 end");
    let (_, _) = parse_source("while x do x := x - 1 end");
    let (_, _) = parse_source("for i := 0, 10, 1 do println i end");
  }

  #[test]
  fn rejects_unterminated_if() {
    let tokens = lex("if x then println 1").unwrap();
    assert!(parse(&tokens).is_err());
  }
}
