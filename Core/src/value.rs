use std::fmt;

/// The kind half of a [`Value`], used as the key into the VM's operator
/// dispatch `match`es. Declared in the same order the distilled design's
/// 5x5 dispatch tables are indexed in, so the two stay easy to cross-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
  None,
  Int,
  Float,
  Bool,
  Str,
}

/// A runtime value. Where the C design hand-manages a heap buffer for
/// `String` payloads (acquire on `SPUSH`/concatenation, free on pop or
/// overwrite), `Value::Str` just owns a `String` — Rust's move semantics and
/// `Drop` give single ownership and automatic release for free, so there is
/// no manual free call anywhere in this toolchain.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  None,
  Int(i32),
  Float(f64),
  Bool(bool),
  Str(String),
}

impl Value {
  pub fn kind(&self) -> ValueKind {
    match self {
      Value::None => ValueKind::None,
      Value::Int(_) => ValueKind::Int,
      Value::Float(_) => ValueKind::Float,
      Value::Bool(_) => ValueKind::Bool,
      Value::Str(_) => ValueKind::Str,
    }
  }

  /// Casts to bool per the casting rules: `None -> false`, `Int -> i != 0`,
  /// `Float -> f >= 0`, `Bool -> self`, `String -> length != 0`.
  ///
  /// The float rule is intentionally `>= 0`, not `!= 0` — that is how the
  /// reference implementation does it, bug or not, and this implementation
  /// preserves it for behavioral parity.
  pub fn to_bool(&self) -> bool {
    match self {
      Value::None => false,
      Value::Int(i) => *i != 0,
      Value::Float(f) => *f >= 0.0,
      Value::Bool(b) => *b,
      Value::Str(s) => !s.is_empty(),
    }
  }

  /// Casts to its display string per the casting rules: floats use the
  /// default six-fractional-digit formatting, matching the reference
  /// implementation's `%f`-style stringification.
  pub fn to_display_string(&self) -> String {
    match self {
      Value::None => "none".to_string(),
      Value::Int(i) => i.to_string(),
      Value::Float(f) => format!("{:.6}", f),
      Value::Bool(b) => b.to_string(),
      Value::Str(s) => s.clone(),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_display_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn float_to_bool_uses_ge_not_ne() {
    assert!(Value::Float(0.0).to_bool());
    assert!(!Value::Float(-0.5).to_bool());
    assert!(Value::Float(0.5).to_bool());
  }

  #[test]
  fn display_strings_match_casting_rules() {
    assert_eq!(Value::None.to_display_string(), "none");
    assert_eq!(Value::Int(42).to_display_string(), "42");
    assert_eq!(Value::Bool(true).to_display_string(), "true");
    assert_eq!(Value::Str("hi".to_string()).to_display_string(), "hi");
  }
}
