//! Structured 32-bit x86 instructions and their NASM rendering.
//!
//! Code generation only ever builds these values; turning them into text is a
//! pure function of the [`Module`] so the two concerns never mix.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
  Eax,
  Ebx,
  Ecx,
  Edx,
  Esp,
  Ebp,
  Al,
  Cl,
  Xmm0,
  Xmm1,
  St0,
  St1,
}

impl fmt::Display for Register {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Register::Eax => "eax",
      Register::Ebx => "ebx",
      Register::Ecx => "ecx",
      Register::Edx => "edx",
      Register::Esp => "esp",
      Register::Ebp => "ebp",
      Register::Al => "al",
      Register::Cl => "cl",
      Register::Xmm0 => "xmm0",
      Register::Xmm1 => "xmm1",
      Register::St0 => "st0",
      Register::St1 => "st1",
    };
    f.write_str(name)
  }
}

/// Compiler-generated local jump target, scoped to the enclosing label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubLabel(pub u32);

impl fmt::Display for SubLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, ".L{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
  Register(Register),
  Label(String),
  SubLabel(SubLabel),
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Address::Register(reg) => write!(f, "{reg}"),
      Address::Label(name) => f.write_str(name),
      Address::SubLabel(label) => write!(f, "{label}"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefSize {
  Byte,
  Word,
  Dword,
  Qword,
}

impl fmt::Display for DerefSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DerefSize::Byte => "BYTE",
      DerefSize::Word => "WORD",
      DerefSize::Dword => "DWORD",
      DerefSize::Qword => "QWORD",
    };
    f.write_str(name)
  }
}

/// A register, label or sub-label, optionally dereferenced at an offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemAccess {
  pub address: Address,
  pub offset: i32,
  pub size: Option<DerefSize>,
}

impl MemAccess {
  pub fn label(name: impl Into<String>) -> Self {
    Self {
      address: Address::Label(name.into()),
      offset: 0,
      size: None,
    }
  }

  /// `DWORD [reg+offset]`
  pub fn dword(reg: Register, offset: i32) -> Self {
    Self {
      address: Address::Register(reg),
      offset,
      size: Some(DerefSize::Dword),
    }
  }

  /// `DWORD [label+offset]`
  pub fn dword_label(name: impl Into<String>, offset: i32) -> Self {
    Self {
      address: Address::Label(name.into()),
      offset,
      size: Some(DerefSize::Dword),
    }
  }
}

impl From<Register> for MemAccess {
  fn from(reg: Register) -> Self {
    Self {
      address: Address::Register(reg),
      offset: 0,
      size: None,
    }
  }
}

impl From<SubLabel> for MemAccess {
  fn from(label: SubLabel) -> Self {
    Self {
      address: Address::SubLabel(label),
      offset: 0,
      size: None,
    }
  }
}

impl fmt::Display for MemAccess {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(size) = self.size {
      write!(f, "{size} [")?;
    }
    write!(f, "{}", self.address)?;
    if self.offset > 0 {
      write!(f, "+{}", self.offset)?;
    } else if self.offset < 0 {
      write!(f, "{}", self.offset)?;
    }
    if self.size.is_some() {
      write!(f, "]")?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
  Mem(MemAccess),
  Int(i32),
  Float(f32),
}

impl From<MemAccess> for Operand {
  fn from(mem: MemAccess) -> Self {
    Operand::Mem(mem)
  }
}

impl From<Register> for Operand {
  fn from(reg: Register) -> Self {
    Operand::Mem(reg.into())
  }
}

impl From<SubLabel> for Operand {
  fn from(label: SubLabel) -> Self {
    Operand::Mem(label.into())
  }
}

impl From<i32> for Operand {
  fn from(value: i32) -> Self {
    Operand::Int(value)
  }
}

impl From<f32> for Operand {
  fn from(value: f32) -> Self {
    Operand::Float(value)
  }
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Mem(mem) => write!(f, "{mem}"),
      Operand::Int(v) => write!(f, "{v:#x}"),
      Operand::Float(v) => write!(f, "__float32__({v:?})"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
  Global,
  Extern,
  Push,
  Pop,
  Mov,
  Movzx,
  Movd,
  Movss,
  Add,
  Sub,
  Mul,
  Div,
  Neg,
  And,
  Cmp,
  Test,
  Call,
  Jmp,
  Je,
  Jne,
  Sete,
  Setl,
  Setle,
  Setg,
  Setge,
  Seta,
  Setnb,
  Addss,
  Subss,
  Mulss,
  Divss,
  Cvtsi2ss,
  Pxor,
  Ucomiss,
  Fld,
  Fcomip,
  Fstp,
  Int,
}

impl Opcode {
  pub fn is_directive(self) -> bool {
    matches!(self, Opcode::Global | Opcode::Extern)
  }

  pub fn is_jump(self) -> bool {
    matches!(self, Opcode::Jmp | Opcode::Je | Opcode::Jne)
  }

  pub fn is_conditional_jump(self) -> bool {
    matches!(self, Opcode::Je | Opcode::Jne)
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Opcode::Global => "global",
      Opcode::Extern => "extern",
      Opcode::Push => "push",
      Opcode::Pop => "pop",
      Opcode::Mov => "mov",
      Opcode::Movzx => "movzx",
      Opcode::Movd => "movd",
      Opcode::Movss => "movss",
      Opcode::Add => "add",
      Opcode::Sub => "sub",
      Opcode::Mul => "mul",
      Opcode::Div => "div",
      Opcode::Neg => "neg",
      Opcode::And => "and",
      Opcode::Cmp => "cmp",
      Opcode::Test => "test",
      Opcode::Call => "call",
      Opcode::Jmp => "jmp",
      Opcode::Je => "je",
      Opcode::Jne => "jne",
      Opcode::Sete => "sete",
      Opcode::Setl => "setl",
      Opcode::Setle => "setle",
      Opcode::Setg => "setg",
      Opcode::Setge => "setge",
      Opcode::Seta => "seta",
      Opcode::Setnb => "setnb",
      Opcode::Addss => "addss",
      Opcode::Subss => "subss",
      Opcode::Mulss => "mulss",
      Opcode::Divss => "divss",
      Opcode::Cvtsi2ss => "cvtsi2ss",
      Opcode::Pxor => "pxor",
      Opcode::Ucomiss => "ucomiss",
      Opcode::Fld => "fld",
      Opcode::Fcomip => "fcomip",
      Opcode::Fstp => "fstp",
      Opcode::Int => "int",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  Data,
  Bss,
  Text,
}

impl fmt::Display for Section {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Section::Data => f.write_str("section .data"),
      Section::Bss => f.write_str("section .bss"),
      Section::Text => f.write_str("section .text"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveSize {
  Resb,
  Resw,
  Resd,
  Resq,
}

/// `name: resb count`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveMem {
  pub name: String,
  pub size: ReserveSize,
  pub count: u32,
}

impl fmt::Display for ReserveMem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let size = match self.size {
      ReserveSize::Resb => "resb",
      ReserveSize::Resw => "resw",
      ReserveSize::Resd => "resd",
      ReserveSize::Resq => "resq",
    };
    write!(f, "{}: {size} {:#x}", self.name, self.count)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineSize {
  Db,
  Dw,
  Dd,
  Dq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem {
  Text(String),
  Int(i32),
}

/// `name db "text", 0xa, 0x0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineMem {
  pub name: String,
  pub size: DefineSize,
  pub items: Vec<DataItem>,
}

impl fmt::Display for DefineMem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let size = match self.size {
      DefineSize::Db => "db",
      DefineSize::Dw => "dw",
      DefineSize::Dd => "dd",
      DefineSize::Dq => "dq",
    };
    write!(f, "{} {size} ", self.name)?;
    for (i, item) in self.items.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      match item {
        DataItem::Text(text) => write!(f, "\"{text}\"")?,
        DataItem::Int(v) => write!(f, "{v:#x}")?,
      }
    }
    Ok(())
  }
}

/// An opcode with up to two operands.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicInst {
  pub opcode: Opcode,
  pub first: Option<Operand>,
  pub second: Option<Operand>,
}

impl fmt::Display for BasicInst {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.opcode)?;
    if let Some(first) = &self.first {
      write!(f, " {first}")?;
    }
    if let Some(second) = &self.second {
      write!(f, ", {second}")?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
  Basic(BasicInst),
  Reserve(ReserveMem),
  Define(DefineMem),
  Section(Section),
  SubLabel(SubLabel),
}

impl Instruction {
  pub fn op0(opcode: Opcode) -> Self {
    Instruction::Basic(BasicInst {
      opcode,
      first: None,
      second: None,
    })
  }

  pub fn op1(opcode: Opcode, first: impl Into<Operand>) -> Self {
    Instruction::Basic(BasicInst {
      opcode,
      first: Some(first.into()),
      second: None,
    })
  }

  pub fn op2(opcode: Opcode, first: impl Into<Operand>, second: impl Into<Operand>) -> Self {
    Instruction::Basic(BasicInst {
      opcode,
      first: Some(first.into()),
      second: Some(second.into()),
    })
  }

  pub fn opcode(&self) -> Option<Opcode> {
    match self {
      Instruction::Basic(inst) => Some(inst.opcode),
      _ => None,
    }
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Instruction::Basic(inst) => write!(f, "{inst}"),
      Instruction::Reserve(res) => write!(f, "{res}"),
      Instruction::Define(def) => write!(f, "{def}"),
      Instruction::Section(section) => write!(f, "{section}"),
      Instruction::SubLabel(label) => write!(f, "{label}:"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
  pub label: String,
  pub instructions: Vec<Instruction>,
}

/// Label → instructions, in insertion order. The unlabeled block is always
/// present and always rendered first.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
  blocks: Vec<Block>,
}

impl Default for Module {
  fn default() -> Self {
    Self {
      blocks: vec![Block {
        label: String::new(),
        instructions: Vec::new(),
      }],
    }
  }
}

impl Module {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, label: &str, inst: Instruction) {
    match self.blocks.iter_mut().find(|block| block.label == label) {
      Some(block) => block.instructions.push(inst),
      None => self.blocks.push(Block {
        label: label.to_string(),
        instructions: vec![inst],
      }),
    }
  }

  pub fn block(&self, label: &str) -> Option<&[Instruction]> {
    self
      .blocks
      .iter()
      .find(|block| block.label == label)
      .map(|block| block.instructions.as_slice())
  }

  pub fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  /// Every instruction in emission order.
  pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
    self.blocks.iter().flat_map(|block| block.instructions.iter())
  }

  pub fn len(&self) -> usize {
    self.blocks.iter().map(|block| block.instructions.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// NASM source text for the whole module.
  pub fn render(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for block in &self.blocks {
      if !block.label.is_empty() {
        writeln!(f, "{}:", block.label)?;
      }
      for inst in &block.instructions {
        match inst {
          Instruction::Section(_) | Instruction::SubLabel(_) => writeln!(f, "{inst}")?,
          Instruction::Basic(basic) if basic.opcode.is_directive() => writeln!(f, "{inst}")?,
          _ => writeln!(f, "    {inst}")?,
        }
      }
    }
    Ok(())
  }
}
