use std::fmt;

/// Which pipeline stage raised a [`SourceError`]. Each stage gets a distinct
/// diagnostic prefix; see `§7` of the design for the full list of error
/// kinds each stage is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Lexer,
  Syntax,
  Compiler,
  Runtime,
}

impl Stage {
  fn prefix(self) -> &'static str {
    match self {
      Stage::Lexer => "LexerError",
      Stage::Syntax => "SyntaxError",
      Stage::Compiler => "CompilerError",
      Stage::Runtime => "RuntimeError",
    }
  }
}

/// A fatal, user-facing error from one of the toolchain's stages. There is
/// no error recovery anywhere in this toolchain (see Non-goals), so a
/// `SourceError` is always the first and only error produced by a given run:
/// stages short-circuit on `Err` rather than accumulating a list of them.
#[derive(Debug, Clone)]
pub struct SourceError {
  pub stage: Stage,
  pub line: u32,
  pub column: Option<u32>,
  pub message: String,
}

impl SourceError {
  pub fn lexer(line: u32, column: u32, message: impl Into<String>) -> Self {
    SourceError { stage: Stage::Lexer, line, column: Some(column), message: message.into() }
  }

  pub fn syntax(line: u32, message: impl Into<String>) -> Self {
    SourceError { stage: Stage::Syntax, line, column: None, message: message.into() }
  }

  pub fn compiler(line: u32, message: impl Into<String>) -> Self {
    SourceError { stage: Stage::Compiler, line, column: None, message: message.into() }
  }

  pub fn runtime(line: u32, message: impl Into<String>) -> Self {
    SourceError { stage: Stage::Runtime, line, column: None, message: message.into() }
  }
}

impl fmt::Display for SourceError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.column {
      Some(col) => write!(f, "{} (line {}, column {}): {}", self.stage.prefix(), self.line, col, self.message),
      None => write!(f, "{} (line {}): {}", self.stage.prefix(), self.line, self.message),
    }
  }
}

impl std::error::Error for SourceError {}
