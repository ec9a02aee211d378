use std::fmt;

/// Resolved type of an expression. Every value occupies one 4-byte cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
  Int,
  Float,
  Pointer,
  #[default]
  Unresolved,
}

impl ValueType {
  pub const CELL_SIZE: u32 = 4;

  /// Int and pointer cells share the integer register paths.
  pub fn is_integral(self) -> bool {
    matches!(self, ValueType::Int | ValueType::Pointer)
  }

  pub fn is_float(self) -> bool {
    matches!(self, ValueType::Float)
  }

  pub fn is_resolved(self) -> bool {
    !matches!(self, ValueType::Unresolved)
  }

  /// Result type of `+ - * /`: pointer dominates, then float, then int.
  pub fn promote(lhs: ValueType, rhs: ValueType) -> ValueType {
    if lhs == ValueType::Pointer || rhs == ValueType::Pointer {
      ValueType::Pointer
    } else if lhs == ValueType::Float || rhs == ValueType::Float {
      ValueType::Float
    } else {
      ValueType::Int
    }
  }
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ValueType::Int => "INT",
      ValueType::Float => "FLOAT",
      ValueType::Pointer => "POINTER",
      ValueType::Unresolved => "NONE",
    };
    f.write_str(name)
  }
}
