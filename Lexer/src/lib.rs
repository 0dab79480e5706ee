use core::errors::SourceError;
use core::tokens::{Token, TokenKind};

/// Scans a full source buffer into an ordered token list, then hands back
/// an implicit `Eof` sentinel token so the parser's cursor never needs to
/// bounds-check `peek()` against the end of the list.
///
/// Lexing is fatal-on-first-error: an unexpected character or an
/// unterminated string literal stops scanning immediately and returns the
/// error, matching the "no error recovery" contract every stage of this
/// toolchain follows.
pub fn lex(source: &str) -> Result<Vec<Token<'_>>, SourceError> {
  let mut lexer = Lexer::new(source);
  lexer.run()?;
  lexer.tokens.push(Token::new(TokenKind::Eof, lexer.line, lexer.column, ""));
  Ok(lexer.tokens)
}

struct Lexer<'src> {
  source: &'src str,
  bytes: &'src [u8],
  start: usize,
  curr: usize,
  line: u32,
  column: u32,
  tokens: Vec<Token<'src>>,
}

impl<'src> Lexer<'src> {
  fn new(source: &'src str) -> Self {
    Lexer { source, bytes: source.as_bytes(), start: 0, curr: 0, line: 1, column: 1, tokens: Vec::new() }
  }

  fn is_at_end(&self) -> bool {
    self.curr >= self.bytes.len()
  }

  fn advance(&mut self) -> u8 {
    let ch = self.bytes[self.curr];
    self.curr += 1;
    self.column += 1;
    ch
  }

  fn peek(&self) -> u8 {
    if self.is_at_end() {
      0
    } else {
      self.bytes[self.curr]
    }
  }

  fn lookahead(&self, n: usize) -> u8 {
    if self.curr + n >= self.bytes.len() {
      0
    } else {
      self.bytes[self.curr + n]
    }
  }

  fn matches(&mut self, expected: u8) -> bool {
    if self.is_at_end() || self.bytes[self.curr] != expected {
      return false;
    }
    self.curr += 1;
    self.column += 1;
    true
  }

  fn lexeme(&self) -> &'src str {
    &self.source[self.start..self.curr]
  }

  fn add_token(&mut self, kind: TokenKind) {
    let lexeme = self.lexeme();
    self.tokens.push(Token::new(kind, self.line, self.column, lexeme));
  }

  fn run(&mut self) -> Result<(), SourceError> {
    while !self.is_at_end() {
      self.start = self.curr;
      let ch = self.advance();

      match ch {
        b'\n' => {
          self.line += 1;
          self.column = 0;
        }
        b'\r' | b' ' | b'\t' => {}

        b'-' => {
          if self.matches(b'-') {
            while self.peek() != b'\n' && !self.is_at_end() {
              self.advance();
            }
          } else {
            self.add_token(TokenKind::Minus);
          }
        }

        b'(' => self.add_token(TokenKind::LParen),
        b')' => self.add_token(TokenKind::RParen),
        b'{' => self.add_token(TokenKind::LCurly),
        b'}' => self.add_token(TokenKind::RCurly),
        b'[' => self.add_token(TokenKind::LSquare),
        b']' => self.add_token(TokenKind::RSquare),
        b',' => self.add_token(TokenKind::Comma),
        b'+' => self.add_token(TokenKind::Plus),
        b'*' => self.add_token(TokenKind::Star),
        b'/' => self.add_token(TokenKind::Slash),
        b'^' => self.add_token(TokenKind::Caret),
        b'%' => self.add_token(TokenKind::Mod),
        b';' => self.add_token(TokenKind::Semicolon),
        b'?' => self.add_token(TokenKind::Question),

        b'=' => {
          let kind = if self.matches(b'=') { TokenKind::EqEq } else { TokenKind::Eq };
          self.add_token(kind);
        }
        b'~' => {
          let kind = if self.matches(b'=') { TokenKind::Ne } else { TokenKind::Not };
          self.add_token(kind);
        }
        b':' => {
          let kind = if self.matches(b'=') { TokenKind::Assign } else { TokenKind::Colon };
          self.add_token(kind);
        }
        b'>' => {
          let kind = if self.matches(b'=') { TokenKind::Ge } else { TokenKind::Gt };
          self.add_token(kind);
        }
        b'<' => {
          let kind = if self.matches(b'=') { TokenKind::Le } else { TokenKind::Lt };
          self.add_token(kind);
        }

        b'0'..=b'9' => self.number(),
        b'.' if self.peek().is_ascii_digit() => self.number_from_dot(),
        b'.' => self.add_token(TokenKind::Dot),

        b'"' => self.string(b'"')?,
        b'\'' => self.string(b'\'')?,

        _ if ch.is_ascii_alphabetic() || ch == b'_' => self.identifier_or_keyword(),

        _ => return Err(SourceError::lexer(self.line, self.column, format!("unexpected character '{}'", ch as char))),
      }
    }

    Ok(())
  }

  fn number(&mut self) {
    while self.peek().is_ascii_digit() {
      self.advance();
    }
    if self.peek() == b'.' && self.lookahead(1).is_ascii_digit() {
      self.advance();
      while self.peek().is_ascii_digit() {
        self.advance();
      }
      self.add_token(TokenKind::Float);
    } else {
      self.add_token(TokenKind::Integer);
    }
  }

  /// Handles floats spelled with a leading dot, e.g. `.5`. The leading `.`
  /// has already been consumed by `advance()` in the caller.
  fn number_from_dot(&mut self) {
    self.advance();
    while self.peek().is_ascii_digit() {
      self.advance();
    }
    self.add_token(TokenKind::Float);
  }

  fn string(&mut self, quote: u8) -> Result<(), SourceError> {
    loop {
      if self.is_at_end() {
        return Err(SourceError::lexer(self.line, self.column, "unterminated string literal"));
      }
      let ch = self.peek();
      if ch == quote {
        break;
      }
      if ch == b'\n' {
        return Err(SourceError::lexer(self.line, self.column, "unterminated string literal"));
      }
      self.advance();
    }
    self.advance();
    self.add_token(TokenKind::String);
    Ok(())
  }

  fn identifier_or_keyword(&mut self) {
    while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
      self.advance();
    }
    let lexeme = self.lexeme();
    let kind = TokenKind::keyword_from_lexeme(lexeme).unwrap_or(TokenKind::Identifier);
    self.add_token(kind);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source)
      .expect("lexing should succeed")
      .into_iter()
      .map(|t| t.kind)
      .filter(|k| *k != TokenKind::Eof)
      .collect()
  }

  #[test]
  fn lexes_arithmetic_expression() {
    assert_eq!(
      kinds("1 + 2 * 3"),
      vec![TokenKind::Integer, TokenKind::Plus, TokenKind::Integer, TokenKind::Star, TokenKind::Integer]
    );
  }

  #[test]
  fn lexes_keywords_and_identifiers() {
    assert_eq!(kinds("if x then"), vec![TokenKind::If, TokenKind::Identifier, TokenKind::Then]);
  }

  #[test]
  fn skips_line_comments() {
    assert_eq!(kinds("1 -- a comment\n2"), vec![TokenKind::Integer, TokenKind::Integer]);
  }

  #[test]
  fn lexes_float_literals_with_and_without_leading_digit() {
    assert_eq!(kinds("4.20"), vec![TokenKind::Float]);
    assert_eq!(kinds(".5"), vec![TokenKind::Float]);
  }

  #[test]
  fn lexes_string_literals_with_either_quote_style() {
    let toks = lex(r#""foo" 'bar'"#).expect("lexing should succeed");
    assert_eq!(toks[0].kind, TokenKind::String);
    assert_eq!(toks[0].lexeme, "\"foo\"");
    assert_eq!(toks[1].kind, TokenKind::String);
    assert_eq!(toks[1].lexeme, "'bar'");
  }

  #[test]
  fn unterminated_string_is_fatal() {
    assert!(lex("\"unterminated").is_err());
  }

  #[test]
  fn unexpected_character_is_fatal() {
    assert!(lex("@").is_err());
  }

  #[test]
  fn two_char_operators_are_greedy() {
    assert_eq!(kinds(":= == ~= >= <="), vec![
      TokenKind::Assign,
      TokenKind::EqEq,
      TokenKind::Ne,
      TokenKind::Ge,
      TokenKind::Le,
    ]);
  }
}
