//! Bottom-up type inference over the AST.
//!
//! Every node gets a resolved [`ValueType`]; assignments are tallied per type
//! so code generation can size the single stack frame up front.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::parser::{AstNode, Literal, NodeKind, UnaryOp};
use crate::ty::ValueType;

/// Number of assignments seen per value type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
  pub int: u32,
  pub float: u32,
  pub pointer: u32,
}

impl SlotCounts {
  fn record(&mut self, ty: ValueType) {
    match ty {
      ValueType::Int => self.int += 1,
      ValueType::Float => self.float += 1,
      ValueType::Pointer => self.pointer += 1,
      ValueType::Unresolved => {}
    }
  }

  pub fn total(&self) -> u32 {
    self.int + self.float + self.pointer
  }

  /// Frame bytes: one 4-byte cell per counted assignment.
  pub fn alloc_size(&self) -> u32 {
    ValueType::CELL_SIZE * self.total()
  }
}

/// Flat, compilation-wide variable → type mapping.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
  types: FxHashMap<String, ValueType>,
}

impl SymbolTable {
  pub fn get(&self, name: &str) -> Option<ValueType> {
    self.types.get(name).copied()
  }

  /// Record `name` with `ty`, replacing any earlier type.
  pub fn define(&mut self, name: &str, ty: ValueType) {
    self.types.insert(name.to_string(), ty);
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }
}

#[derive(Debug, Clone, Default)]
pub struct TypeChecker {
  symbols: SymbolTable,
  counts: SlotCounts,
}

impl TypeChecker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn counts(&self) -> SlotCounts {
    self.counts
  }

  pub fn alloc_size(&self) -> u32 {
    self.counts.alloc_size()
  }

  pub fn symbols(&self) -> &SymbolTable {
    &self.symbols
  }

  /// Resolve `node` and all of its children, storing each result in the
  /// node's `value_type`.
  pub fn check(&mut self, node: &mut AstNode) -> CompileResult<ValueType> {
    let ty = match &mut node.kind {
      NodeKind::Root { statements } => {
        for stmt in statements.iter_mut() {
          self.check(stmt)?;
        }
        debug!(
          statements = statements.len(),
          alloc_size = self.alloc_size(),
          "type check complete"
        );
        ValueType::Unresolved
      }
      NodeKind::Num {
        value: Literal::Int(_),
      } => ValueType::Int,
      NodeKind::Num {
        value: Literal::Float(_),
      } => ValueType::Float,
      NodeKind::Binary { op, lhs, rhs } => {
        // Both sides are always visited so their own types get recorded.
        let lhs_ty = self.check(lhs)?;
        let rhs_ty = self.check(rhs)?;
        if op.is_arithmetic() {
          ValueType::promote(lhs_ty, rhs_ty)
        } else {
          ValueType::Int
        }
      }
      NodeKind::Unary { op, operand } => {
        let operand_ty = self.check(operand)?;
        match op {
          UnaryOp::Not => ValueType::Int,
          UnaryOp::Neg => operand_ty,
        }
      }
      NodeKind::Assign { name, value } => {
        let ty = self.check(value)?;
        self.counts.record(ty);
        self.symbols.define(name, ty);
        ty
      }
      NodeKind::Access { name } => self.symbols.get(name).ok_or_else(|| {
        CompileError::at(
          ErrorKind::UndefinedVariable,
          format!("'{name}' is used before it is assigned"),
          node.start,
          node.end,
        )
      })?,
    };

    trace!(node = %node, ty = %ty, "resolved type");
    node.value_type = ty;
    Ok(ty)
  }
}
