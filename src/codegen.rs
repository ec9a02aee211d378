//! Code generation: lower the type-checked AST into 32-bit NASM x86.
//!
//! The emitter uses a simple stack machine on top of the hardware stack:
//! every expression leaves exactly one 4-byte cell on the stack, whether it
//! holds an int, a pointer or a single-precision float. Operators branch on
//! the resolved types of their operands. Variables live in fixed slots below
//! `ebp` and are addressed as `[ebp-offset]`.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::asm::{
  DataItem, DefineMem, DefineSize, Instruction, MemAccess, Module, Opcode, Operand, Register,
  ReserveMem, ReserveSize, Section, SubLabel,
};
use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::parser::{AstNode, BinaryOp, Literal, NodeKind, UnaryOp};
use crate::ty::ValueType;

use Register::*;

pub const ENTRY_LABEL: &str = "main";
pub const PRINTF: &str = "printf";
pub const PRINT_FLOAT: &str = "print_float";
/// Runtime allocator entry points.
pub const HEAP_INIT: &str = "alloc_heap";
pub const HEAP_BOX_INT: &str = "heap_alloc_int";
pub const HEAP_PTR: &str = "heap_ptr";
pub const INT_FORMAT: &str = "int_format";
pub const HEX_FORMAT: &str = "hex_format";
pub const FLOAT_FORMAT: &str = "double_format";

const PTR_SIZE: u32 = 4;
const SLOT_BASE: i32 = 4;
const EXIT_STATUS: i32 = 0;
const SYS_EXIT: i32 = 1;
const FLOAT_SIGN_MASK: i32 = i32::MIN;

/// Where a variable lives in the frame and what it currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
  pub offset: i32,
  pub value_type: ValueType,
}

/// Holds all mutable state of one compilation. [`CodeGenerator::generate`]
/// resets it first, so an instance may be reused sequentially.
#[derive(Debug)]
pub struct CodeGenerator {
  label: String,
  next_sub_label: u32,
  slots: FxHashMap<String, StackSlot>,
  frame_cursor: i32,
  module: Module,
}

impl Default for CodeGenerator {
  fn default() -> Self {
    Self {
      label: String::new(),
      next_sub_label: 0,
      slots: FxHashMap::default(),
      frame_cursor: SLOT_BASE,
      module: Module::new(),
    }
  }
}

impl CodeGenerator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }

  pub fn slot(&self, name: &str) -> Option<StackSlot> {
    self.slots.get(name).copied()
  }

  /// Emit the whole program for `root`, reserving `frame_size` bytes of
  /// variable storage. A non-root node is treated as a single statement.
  pub fn generate(&mut self, root: &AstNode, frame_size: u32) -> CompileResult<Module> {
    self.reset();

    let statements = match &root.kind {
      NodeKind::Root { statements } => statements.as_slice(),
      _ => std::slice::from_ref(root),
    };
    debug!(
      statements = statements.len(),
      frame_size, "generating module"
    );

    self.emit_header();

    self.label = ENTRY_LABEL.to_string();
    self.op2(Opcode::And, Esp, -16);
    self.op1(Opcode::Push, Ebp);
    self.op2(Opcode::Mov, Ebp, Esp);
    if frame_size > 0 {
      self.op2(Opcode::Sub, Esp, frame_size as i32);
    }
    self.op1(Opcode::Call, MemAccess::label(HEAP_INIT));
    self.op2(Opcode::Mov, MemAccess::dword_label(HEAP_PTR, 0), Eax);

    for stmt in statements {
      self.emit_expr(stmt)?;
      self.emit_print(resolved(stmt));
    }

    self.op2(Opcode::Mov, Esp, Ebp);
    self.op1(Opcode::Pop, Ebp);
    self.op2(Opcode::Mov, Eax, SYS_EXIT);
    self.op2(Opcode::Mov, Ebx, EXIT_STATUS);
    self.op1(Opcode::Int, 0x80);

    let module = std::mem::take(&mut self.module);
    debug!(
      instructions = module.len(),
      sub_labels = self.next_sub_label,
      "code generation complete"
    );
    Ok(module)
  }

  fn emit_header(&mut self) {
    self.label.clear();
    self.op1(Opcode::Global, MemAccess::label(ENTRY_LABEL));
    for symbol in [PRINTF, PRINT_FLOAT, HEAP_INIT, HEAP_BOX_INT] {
      self.op1(Opcode::Extern, MemAccess::label(symbol));
    }

    self.write(Instruction::Section(Section::Data));
    for (name, format) in [
      (INT_FORMAT, "%d"),
      (HEX_FORMAT, "%#06x"),
      (FLOAT_FORMAT, "%f"),
    ] {
      self.write(Instruction::Define(DefineMem {
        name: name.to_string(),
        size: DefineSize::Db,
        items: vec![
          DataItem::Text(format.to_string()),
          DataItem::Int(10),
          DataItem::Int(0),
        ],
      }));
    }

    self.write(Instruction::Section(Section::Bss));
    self.write(Instruction::Reserve(ReserveMem {
      name: HEAP_PTR.to_string(),
      size: ReserveSize::Resb,
      count: PTR_SIZE,
    }));

    self.write(Instruction::Section(Section::Text));
  }

  fn write(&mut self, inst: Instruction) {
    self.module.push(&self.label, inst);
  }

  fn op1(&mut self, opcode: Opcode, first: impl Into<Operand>) {
    self.write(Instruction::op1(opcode, first));
  }

  fn op2(&mut self, opcode: Opcode, first: impl Into<Operand>, second: impl Into<Operand>) {
    self.write(Instruction::op2(opcode, first, second));
  }

  fn place(&mut self, label: SubLabel) {
    self.write(Instruction::SubLabel(label));
  }

  /// Reserve `count` consecutive sub-labels and return the first.
  fn sub_labels(&mut self, count: u32) -> u32 {
    let first = self.next_sub_label;
    self.next_sub_label += count;
    first
  }

  fn emit_expr(&mut self, node: &AstNode) -> CompileResult<()> {
    match &node.kind {
      NodeKind::Num {
        value: Literal::Int(v),
      } => self.op1(Opcode::Push, *v),
      NodeKind::Num {
        value: Literal::Float(v),
      } => self.op1(Opcode::Push, *v),
      NodeKind::Binary { op, lhs, rhs } => match op {
        BinaryOp::And => self.emit_and(lhs, rhs)?,
        BinaryOp::Or => self.emit_or(lhs, rhs)?,
        op if op.is_comparison() => self.emit_compare(*op, lhs, rhs)?,
        op => self.emit_arith(*op, lhs, rhs)?,
      },
      NodeKind::Unary {
        op: UnaryOp::Neg,
        operand,
      } => self.emit_neg(operand)?,
      NodeKind::Unary {
        op: UnaryOp::Not,
        operand,
      } => self.emit_not(operand)?,
      NodeKind::Assign { name, value } => self.emit_assign(name, value, resolved(node))?,
      NodeKind::Access { name } => {
        let slot = self.slot(name).ok_or_else(|| {
          CompileError::at(
            ErrorKind::UndefinedVariable,
            format!("'{name}' has no stack slot"),
            node.start,
            node.end,
          )
        })?;
        self.op1(Opcode::Push, MemAccess::dword(Ebp, -slot.offset));
      }
      NodeKind::Root { .. } => unreachable!("nested root node"),
    }
    Ok(())
  }

  fn emit_print(&mut self, ty: ValueType) {
    match ty {
      ValueType::Int => {
        self.op1(Opcode::Push, MemAccess::label(INT_FORMAT));
        self.op1(Opcode::Call, MemAccess::label(PRINTF));
        self.op2(Opcode::Add, Esp, 8);
      }
      ValueType::Float => {
        self.op1(Opcode::Call, MemAccess::label(PRINT_FLOAT));
        self.op2(Opcode::Add, Esp, 4);
      }
      ValueType::Pointer => {
        self.op1(Opcode::Push, MemAccess::label(HEX_FORMAT));
        self.op1(Opcode::Call, MemAccess::label(PRINTF));
        self.op2(Opcode::Add, Esp, 8);
      }
      ValueType::Unresolved => unreachable!("printing an unresolved value"),
    }
  }

  /// Pop the top cell and set ZF iff it is zero.
  fn emit_zero_test(&mut self, ty: ValueType) {
    if ty.is_float() {
      self.op2(Opcode::Pxor, Xmm0, Xmm0);
      self.op2(Opcode::Add, Esp, 4);
      self.op2(Opcode::Ucomiss, Xmm0, MemAccess::dword(Esp, -4));
    } else {
      self.op1(Opcode::Pop, Ecx);
      self.op2(Opcode::Test, Ecx, Ecx);
    }
  }

  fn emit_arith(&mut self, op: BinaryOp, lhs: &AstNode, rhs: &AstNode) -> CompileResult<()> {
    self.emit_expr(lhs)?;
    self.emit_expr(rhs)?;

    match (resolved(lhs).is_float(), resolved(rhs).is_float()) {
      (false, false) => {
        self.op1(Opcode::Pop, Ecx);
        self.op1(Opcode::Pop, Eax);
        match op {
          BinaryOp::Add => self.op2(Opcode::Add, Eax, Ecx),
          BinaryOp::Sub => self.op2(Opcode::Sub, Eax, Ecx),
          BinaryOp::Mul => self.op1(Opcode::Mul, Ecx),
          BinaryOp::Div => {
            self.op2(Opcode::Mov, Edx, 0);
            self.op1(Opcode::Div, Ecx);
          }
          _ => unreachable!("{op} is not arithmetic"),
        }
        self.op1(Opcode::Push, Eax);
      }
      (lhs_float, rhs_float) => {
        let load = |is_float: bool| {
          if is_float {
            Opcode::Movss
          } else {
            Opcode::Cvtsi2ss
          }
        };
        self.op2(load(lhs_float), Xmm0, MemAccess::dword(Esp, 4));
        self.op2(load(rhs_float), Xmm1, MemAccess::dword(Esp, 0));
        self.op2(Opcode::Add, Esp, 8);

        let opcode = match op {
          BinaryOp::Add => Opcode::Addss,
          BinaryOp::Sub => Opcode::Subss,
          BinaryOp::Mul => Opcode::Mulss,
          BinaryOp::Div => Opcode::Divss,
          _ => unreachable!("{op} is not arithmetic"),
        };
        self.op2(opcode, Xmm0, Xmm1);
        // The result is in a register; store it just below esp and grow the
        // stack over it.
        self.op2(Opcode::Movss, MemAccess::dword(Esp, -4), Xmm0);
        self.op2(Opcode::Sub, Esp, 4);
      }
    }
    Ok(())
  }

  fn emit_and(&mut self, lhs: &AstNode, rhs: &AstNode) -> CompileResult<()> {
    let first = self.sub_labels(2);
    let (is_false, done) = (SubLabel(first), SubLabel(first + 1));

    self.emit_expr(lhs)?;
    self.emit_zero_test(resolved(lhs));
    self.op1(Opcode::Je, is_false);

    self.emit_expr(rhs)?;
    self.emit_zero_test(resolved(rhs));
    self.op1(Opcode::Je, is_false);

    self.op2(Opcode::Mov, Eax, 1);
    self.op1(Opcode::Jmp, done);
    self.place(is_false);
    self.op2(Opcode::Mov, Eax, 0);
    self.place(done);
    self.op1(Opcode::Push, Eax);
    Ok(())
  }

  fn emit_or(&mut self, lhs: &AstNode, rhs: &AstNode) -> CompileResult<()> {
    let first = self.sub_labels(3);
    let (is_true, is_false, done) = (SubLabel(first), SubLabel(first + 1), SubLabel(first + 2));

    self.emit_expr(lhs)?;
    self.emit_zero_test(resolved(lhs));
    self.op1(Opcode::Jne, is_true);

    self.emit_expr(rhs)?;
    self.emit_zero_test(resolved(rhs));
    self.op1(Opcode::Je, is_false);

    self.place(is_true);
    self.op2(Opcode::Mov, Eax, 1);
    self.op1(Opcode::Jmp, done);
    self.place(is_false);
    self.op2(Opcode::Mov, Eax, 0);
    self.place(done);
    self.op1(Opcode::Push, Eax);
    Ok(())
  }

  fn emit_compare(&mut self, op: BinaryOp, lhs: &AstNode, rhs: &AstNode) -> CompileResult<()> {
    self.emit_expr(lhs)?;
    self.emit_expr(rhs)?;

    match (resolved(lhs).is_float(), resolved(rhs).is_float()) {
      (false, false) => self.emit_int_compare(op),
      (true, false) => {
        self.op2(Opcode::Cvtsi2ss, Xmm0, MemAccess::dword(Esp, 0));
        self.op2(Opcode::Movss, MemAccess::dword(Esp, 0), Xmm0);
        self.emit_float_compare(op);
      }
      (false, true) => {
        self.op2(Opcode::Cvtsi2ss, Xmm0, MemAccess::dword(Esp, 4));
        self.op2(Opcode::Movss, MemAccess::dword(Esp, 4), Xmm0);
        self.emit_float_compare(op);
      }
      (true, true) => self.emit_float_compare(op),
    }
    Ok(())
  }

  /// Left operand at `[esp+4]`, right at `[esp]`.
  fn emit_int_compare(&mut self, op: BinaryOp) {
    let set = match op {
      BinaryOp::Equal => Opcode::Sete,
      BinaryOp::Less => Opcode::Setl,
      BinaryOp::LessEq => Opcode::Setle,
      BinaryOp::Greater => Opcode::Setg,
      BinaryOp::GreaterEq => Opcode::Setge,
      _ => unreachable!("{op} is not a comparison"),
    };
    self.op2(Opcode::Mov, Eax, MemAccess::dword(Esp, 4));
    self.op2(Opcode::Cmp, Eax, MemAccess::dword(Esp, 0));
    self.op1(set, Al);
    self.finish_compare();
  }

  /// `fcomip` only exposes "above" and "not below" of st0 against st1, so
  /// less-than forms load the right operand last and greater-than forms
  /// load the left operand last.
  fn emit_float_compare(&mut self, op: BinaryOp) {
    let (top, set) = match op {
      BinaryOp::Less => (0, Opcode::Seta),
      BinaryOp::LessEq => (0, Opcode::Setnb),
      BinaryOp::Greater => (4, Opcode::Seta),
      BinaryOp::GreaterEq => (4, Opcode::Setnb),
      BinaryOp::Equal => (4, Opcode::Sete),
      _ => unreachable!("{op} is not a comparison"),
    };
    self.op1(Opcode::Fld, MemAccess::dword(Esp, 4 - top));
    self.op1(Opcode::Fld, MemAccess::dword(Esp, top));
    self.op2(Opcode::Fcomip, St0, St1);
    self.op1(Opcode::Fstp, St0);
    self.op1(set, Al);
    self.finish_compare();
  }

  fn finish_compare(&mut self) {
    self.op2(Opcode::Movzx, Eax, Al);
    self.op2(Opcode::Add, Esp, 8);
    self.op1(Opcode::Push, Eax);
  }

  fn emit_neg(&mut self, operand: &AstNode) -> CompileResult<()> {
    self.emit_expr(operand)?;

    if resolved(operand).is_float() {
      self.op2(Opcode::Movss, Xmm0, MemAccess::dword(Esp, 0));
      self.op2(Opcode::Mov, Eax, FLOAT_SIGN_MASK);
      self.op2(Opcode::Movd, Xmm1, Eax);
      self.op2(Opcode::Pxor, Xmm0, Xmm1);
      self.op2(Opcode::Movss, MemAccess::dword(Esp, 0), Xmm0);
    } else {
      self.op1(Opcode::Pop, Ecx);
      self.op1(Opcode::Neg, Ecx);
      self.op1(Opcode::Push, Ecx);
    }
    Ok(())
  }

  fn emit_not(&mut self, operand: &AstNode) -> CompileResult<()> {
    self.emit_expr(operand)?;
    self.emit_zero_test(resolved(operand));
    self.op1(Opcode::Sete, Cl);
    self.op2(Opcode::Movzx, Ecx, Cl);
    self.op1(Opcode::Push, Ecx);
    Ok(())
  }

  fn emit_assign(&mut self, name: &str, value: &AstNode, ty: ValueType) -> CompileResult<()> {
    self.emit_expr(value)?;

    let offset = match self.slots.get_mut(name) {
      Some(slot) => {
        slot.value_type = ty;
        slot.offset
      }
      None => {
        let offset = self.frame_cursor;
        self.frame_cursor += ValueType::CELL_SIZE as i32;
        self.slots.insert(name.to_string(), StackSlot {
          offset,
          value_type: ty,
        });
        offset
      }
    };

    // The assigned value stays on the stack as the expression's result.
    self.op2(Opcode::Mov, Eax, MemAccess::dword(Esp, 0));
    self.op2(Opcode::Mov, MemAccess::dword(Ebp, -offset), Eax);
    Ok(())
  }
}

/// Codegen only runs on checked trees; an unresolved node is a compiler bug.
fn resolved(node: &AstNode) -> ValueType {
  match node.value_type {
    ValueType::Unresolved => panic!("codegen reached an unresolved node: {node}"),
    ty => ty,
  }
}
