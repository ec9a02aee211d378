//! A tiny 32-bit x86 machine that runs the generated `main` block directly
//! from the structured instruction model. It only knows the instructions the
//! code generator emits; the runtime entry points are stubbed and record what
//! would have been printed.
#![allow(dead_code)]

use std::collections::HashMap;

use chronos::Program;
use chronos::asm::{Address, BasicInst, Instruction, MemAccess, Module, Opcode, Operand, Register, SubLabel};
use chronos::codegen::{ENTRY_LABEL, FLOAT_FORMAT, HEAP_INIT, HEAP_PTR, HEX_FORMAT, INT_FORMAT, PRINT_FLOAT, PRINTF};

const MEMORY_SIZE: usize = 0x1_0000;
const STACK_TOP: u32 = 0xF004;
const HEAP_HANDLE: u32 = 0x4000;
const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Printed {
  Int(i32),
  Float(f32),
  Hex(u32),
}

#[derive(Debug, Default)]
struct Flags {
  zero: bool,
  carry: bool,
  less: bool,
}

pub struct Machine {
  eax: u32,
  ebx: u32,
  ecx: u32,
  edx: u32,
  esp: u32,
  ebp: u32,
  xmm0: u32,
  xmm1: u32,
  x87: Vec<f64>,
  flags: Flags,
  memory: Vec<u8>,
  labels: HashMap<&'static str, u32>,
  output: Vec<Printed>,
  exit_status: Option<u32>,
}

impl Default for Machine {
  fn default() -> Self {
    let labels = HashMap::from([
      (INT_FORMAT, 0x100),
      (HEX_FORMAT, 0x110),
      (FLOAT_FORMAT, 0x120),
      (HEAP_PTR, 0x130),
    ]);
    Self {
      eax: 0,
      ebx: 0,
      ecx: 0,
      edx: 0,
      esp: STACK_TOP,
      ebp: 0,
      xmm0: 0,
      xmm1: 0,
      x87: Vec::new(),
      flags: Flags::default(),
      memory: vec![0; MEMORY_SIZE],
      labels,
      output: Vec::new(),
      exit_status: None,
    }
  }
}

impl Machine {
  pub fn output(&self) -> &[Printed] {
    &self.output
  }

  pub fn exit_status(&self) -> Option<u32> {
    self.exit_status
  }

  pub fn esp(&self) -> u32 {
    self.esp
  }

  pub fn heap_ptr(&self) -> u32 {
    self.load(self.labels[HEAP_PTR])
  }

  /// Execute the entry block until the exit syscall.
  pub fn run(&mut self, module: &Module) {
    let code = module.block(ENTRY_LABEL).expect("module has an entry block");
    let targets: HashMap<SubLabel, usize> = code
      .iter()
      .enumerate()
      .filter_map(|(i, inst)| match inst {
        Instruction::SubLabel(label) => Some((*label, i)),
        _ => None,
      })
      .collect();

    let mut pc = 0;
    for _ in 0..STEP_LIMIT {
      let Some(inst) = code.get(pc) else {
        panic!("fell off the end of {ENTRY_LABEL}");
      };
      pc += 1;
      let Instruction::Basic(inst) = inst else {
        continue;
      };
      if let Some(target) = self.step(inst) {
        pc = targets[&target];
      }
      if self.exit_status.is_some() {
        return;
      }
    }
    panic!("program did not exit within {STEP_LIMIT} steps");
  }

  fn load(&self, addr: u32) -> u32 {
    let at = addr as usize;
    let bytes: [u8; 4] = self.memory[at..at + 4].try_into().expect("4 bytes");
    u32::from_le_bytes(bytes)
  }

  fn store(&mut self, addr: u32, value: u32) {
    let at = addr as usize;
    self.memory[at..at + 4].copy_from_slice(&value.to_le_bytes());
  }

  fn push(&mut self, value: u32) {
    self.esp -= 4;
    self.store(self.esp, value);
  }

  fn pop(&mut self) -> u32 {
    let value = self.load(self.esp);
    self.esp += 4;
    value
  }

  fn register(&self, reg: Register) -> u32 {
    match reg {
      Register::Eax => self.eax,
      Register::Ebx => self.ebx,
      Register::Ecx => self.ecx,
      Register::Edx => self.edx,
      Register::Esp => self.esp,
      Register::Ebp => self.ebp,
      Register::Al => self.eax & 0xff,
      Register::Cl => self.ecx & 0xff,
      Register::Xmm0 => self.xmm0,
      Register::Xmm1 => self.xmm1,
      Register::St0 | Register::St1 => panic!("x87 registers are not addressable"),
    }
  }

  fn set_register(&mut self, reg: Register, value: u32) {
    match reg {
      Register::Eax => self.eax = value,
      Register::Ebx => self.ebx = value,
      Register::Ecx => self.ecx = value,
      Register::Edx => self.edx = value,
      Register::Esp => self.esp = value,
      Register::Ebp => self.ebp = value,
      Register::Al => self.eax = (self.eax & !0xff) | (value & 0xff),
      Register::Cl => self.ecx = (self.ecx & !0xff) | (value & 0xff),
      Register::Xmm0 => self.xmm0 = value,
      Register::Xmm1 => self.xmm1 = value,
      Register::St0 | Register::St1 => panic!("x87 registers are not addressable"),
    }
  }

  fn base(&self, address: &Address) -> u32 {
    match address {
      Address::Register(reg) => self.register(*reg),
      Address::Label(name) => *self
        .labels
        .get(name.as_str())
        .unwrap_or_else(|| panic!("unknown data label {name}")),
      Address::SubLabel(label) => panic!("{label} is not data"),
    }
  }

  fn effective(&self, mem: &MemAccess) -> u32 {
    self.base(&mem.address).wrapping_add_signed(mem.offset)
  }

  fn read(&self, operand: &Operand) -> u32 {
    match operand {
      Operand::Int(v) => *v as u32,
      Operand::Float(v) => v.to_bits(),
      Operand::Mem(mem) if mem.size.is_some() => self.load(self.effective(mem)),
      Operand::Mem(mem) => self.effective(mem),
    }
  }

  fn write(&mut self, operand: &Operand, value: u32) {
    match operand {
      Operand::Mem(mem) if mem.size.is_some() => {
        let addr = self.effective(mem);
        self.store(addr, value);
      }
      Operand::Mem(MemAccess {
        address: Address::Register(reg),
        ..
      }) => self.set_register(*reg, value),
      other => panic!("cannot write to {other}"),
    }
  }

  fn float_pair(&self, inst: &BasicInst) -> (f32, f32) {
    let (dst, src) = operands(inst);
    (f32::from_bits(self.read(dst)), f32::from_bits(self.read(src)))
  }

  fn call(&mut self, target: &Operand) {
    let Operand::Mem(MemAccess {
      address: Address::Label(name),
      ..
    }) = target
    else {
      panic!("indirect call to {target}");
    };
    match name.as_str() {
      HEAP_INIT => self.eax = HEAP_HANDLE,
      PRINTF => {
        let format = self.load(self.esp);
        let value = self.load(self.esp + 4);
        let printed = if format == self.labels[INT_FORMAT] {
          Printed::Int(value as i32)
        } else if format == self.labels[HEX_FORMAT] {
          Printed::Hex(value)
        } else {
          panic!("printf with unknown format at {format:#x}")
        };
        self.output.push(printed);
      }
      PRINT_FLOAT => {
        let value = f32::from_bits(self.load(self.esp));
        self.output.push(Printed::Float(value));
      }
      other => panic!("call to unknown routine {other}"),
    }
  }

  fn set_flag(&mut self, inst: &BasicInst, on: bool) {
    self.write(first(inst), on as u32);
  }

  /// Run one instruction; returns a jump target when control transfers.
  fn step(&mut self, inst: &BasicInst) -> Option<SubLabel> {
    match inst.opcode {
      Opcode::Global | Opcode::Extern => {}
      Opcode::Push => {
        let value = self.read(first(inst));
        self.push(value);
      }
      Opcode::Pop => {
        let value = self.pop();
        self.write(first(inst), value);
      }
      Opcode::Mov | Opcode::Movss | Opcode::Movd => {
        let (dst, src) = operands(inst);
        let value = self.read(src);
        self.write(dst, value);
      }
      Opcode::Movzx => {
        let (dst, src) = operands(inst);
        let value = self.read(src) & 0xff;
        self.write(dst, value);
      }
      Opcode::Add | Opcode::Sub | Opcode::And | Opcode::Pxor => {
        let (dst, src) = operands(inst);
        let (a, b) = (self.read(dst), self.read(src));
        let value = match inst.opcode {
          Opcode::Add => a.wrapping_add(b),
          Opcode::Sub => a.wrapping_sub(b),
          Opcode::And => a & b,
          _ => a ^ b,
        };
        self.write(dst, value);
      }
      Opcode::Mul => {
        let product = self.eax as u64 * self.read(first(inst)) as u64;
        self.eax = product as u32;
        self.edx = (product >> 32) as u32;
      }
      Opcode::Div => {
        let divisor = self.read(first(inst)) as u64;
        assert!(divisor != 0, "division by zero");
        let dividend = ((self.edx as u64) << 32) | self.eax as u64;
        self.eax = (dividend / divisor) as u32;
        self.edx = (dividend % divisor) as u32;
      }
      Opcode::Neg => {
        let value = self.read(first(inst)).wrapping_neg();
        self.write(first(inst), value);
      }
      Opcode::Cmp | Opcode::Test => {
        let (dst, src) = operands(inst);
        let (a, b) = (self.read(dst), self.read(src));
        if inst.opcode == Opcode::Cmp {
          self.flags = Flags {
            zero: a == b,
            carry: a < b,
            less: (a as i32) < (b as i32),
          };
        } else {
          self.flags = Flags {
            zero: a & b == 0,
            carry: false,
            less: ((a & b) as i32) < 0,
          };
        }
      }
      Opcode::Ucomiss => {
        let (a, b) = self.float_pair(inst);
        self.flags = Flags {
          zero: a == b,
          carry: a < b,
          less: false,
        };
      }
      Opcode::Sete => self.set_flag(inst, self.flags.zero),
      Opcode::Setl => self.set_flag(inst, self.flags.less),
      Opcode::Setle => self.set_flag(inst, self.flags.less || self.flags.zero),
      Opcode::Setg => self.set_flag(inst, !self.flags.less && !self.flags.zero),
      Opcode::Setge => self.set_flag(inst, !self.flags.less),
      Opcode::Seta => self.set_flag(inst, !self.flags.carry && !self.flags.zero),
      Opcode::Setnb => self.set_flag(inst, !self.flags.carry),
      Opcode::Addss | Opcode::Subss | Opcode::Mulss | Opcode::Divss => {
        let (a, b) = self.float_pair(inst);
        let value = match inst.opcode {
          Opcode::Addss => a + b,
          Opcode::Subss => a - b,
          Opcode::Mulss => a * b,
          _ => a / b,
        };
        self.write(first(inst), value.to_bits());
      }
      Opcode::Cvtsi2ss => {
        let (dst, src) = operands(inst);
        let value = self.read(src) as i32 as f32;
        self.write(dst, value.to_bits());
      }
      Opcode::Fld => {
        let value = f32::from_bits(self.read(first(inst)));
        self.x87.push(value as f64);
      }
      Opcode::Fcomip => {
        let st0 = self.x87.pop().expect("st0 loaded");
        let st1 = *self.x87.last().expect("st1 loaded");
        self.flags = Flags {
          zero: st0 == st1,
          carry: st0 < st1,
          less: false,
        };
      }
      Opcode::Fstp => {
        self.x87.pop().expect("st0 loaded");
      }
      Opcode::Call => self.call(first(inst)),
      Opcode::Jmp | Opcode::Je | Opcode::Jne => {
        let taken = match inst.opcode {
          Opcode::Je => self.flags.zero,
          Opcode::Jne => !self.flags.zero,
          _ => true,
        };
        if taken {
          return Some(jump_target(first(inst)));
        }
      }
      Opcode::Int => {
        assert_eq!(self.read(first(inst)), 0x80, "only the exit syscall is supported");
        assert_eq!(self.eax, 1, "syscall number");
        self.exit_status = Some(self.ebx);
      }
    }
    None
  }
}

fn first(inst: &BasicInst) -> &Operand {
  inst.first.as_ref().unwrap_or_else(|| panic!("{inst} needs an operand"))
}

fn operands(inst: &BasicInst) -> (&Operand, &Operand) {
  let second = inst.second.as_ref().unwrap_or_else(|| panic!("{inst} needs two operands"));
  (first(inst), second)
}

fn jump_target(operand: &Operand) -> SubLabel {
  match operand {
    Operand::Mem(MemAccess {
      address: Address::SubLabel(label),
      ..
    }) => *label,
    other => panic!("jump to non-label {other}"),
  }
}

/// Compile `source` and execute it, returning the machine after exit.
pub fn execute(source: &str) -> Machine {
  let mut program = Program::from_source("<test>", source).expect("parses");
  let compilation = program.compile().expect("compiles");
  let mut machine = Machine::default();
  machine.run(&compilation.module);
  machine
}

/// Printed values of `source`, one per statement.
pub fn run(source: &str) -> Vec<Printed> {
  execute(source).output().to_vec()
}

pub fn run_ints(source: &str) -> Vec<i32> {
  run(source)
    .into_iter()
    .map(|printed| match printed {
      Printed::Int(v) => v,
      other => panic!("expected an int, got {other:?}"),
    })
    .collect()
}

pub fn run_float(source: &str) -> f32 {
  match run(source).last() {
    Some(Printed::Float(v)) => *v,
    other => panic!("expected a float, got {other:?}"),
  }
}
