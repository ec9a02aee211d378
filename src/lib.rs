//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run strictly in sequence:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` turns one line of tokens into an expression statement.
//! - `typeck` resolves a value type for every node and sizes the frame.
//! - `codegen` lowers the checked tree into an `asm::Module`.
//! - `asm` renders that module as NASM source text.
//! - `error` centralises diagnostics and the source registry.

pub mod asm;
pub mod cli;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod ty;
pub mod typeck;

use std::fs;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, info};

pub use error::{CompileError, CompileResult, ErrorKind, FileId, Position, SourceMap};

use asm::Module;
use codegen::CodeGenerator;
use parser::AstNode;
use tokenizer::Token;
use typeck::TypeChecker;

/// Top-level statements collected line by line, together with the source
/// text they came from. Every accepted statement has already passed the type
/// checker against the statements before it.
#[derive(Debug)]
pub struct Program {
  sources: SourceMap,
  file: FileId,
  root: AstNode,
  checker: TypeChecker,
}

impl Program {
  pub fn new(name: impl Into<String>) -> Self {
    let mut sources = SourceMap::new();
    let file = sources.add_file(name, "");
    Self {
      sources,
      file,
      root: AstNode::root(Vec::new()),
      checker: TypeChecker::new(),
    }
  }

  /// Parse every line of `text`, stopping at the first error.
  pub fn from_source(name: impl Into<String>, text: &str) -> CompileResult<Self> {
    let mut program = Self::new(name);
    for line in text.lines() {
      program.push_line(line)?;
    }
    Ok(program)
  }

  /// Lex, parse and type-check one line, appending its statement (if any).
  /// A failing line leaves the buffered statements untouched; its text is
  /// still kept in the source registry so diagnostics can be rendered.
  pub fn push_line(&mut self, line: &str) -> CompileResult<Option<&AstNode>> {
    let (origin, tokens) = self.lex_line(line)?;
    self.push_tokens(tokens, origin)
  }

  /// Register `line` and tokenize it with file-global positions.
  pub fn lex_line(&mut self, line: &str) -> CompileResult<(Position, Vec<Token>)> {
    let origin = self.sources.append_line(self.file, line);
    let tokens = tokenizer::tokenize_from(line, origin)?;
    Ok((origin, tokens))
  }

  pub fn push_tokens(&mut self, tokens: Vec<Token>, origin: Position) -> CompileResult<Option<&AstNode>> {
    let Some(mut stmt) = parser::parse(tokens, origin)? else {
      return Ok(None);
    };

    // Symbols are committed only once the whole statement checks.
    let mut checker = self.checker.clone();
    checker.check(&mut stmt)?;
    self.checker = checker;

    self.root.push_statement(stmt);
    Ok(self.root.statements().last())
  }

  pub fn sources(&self) -> &SourceMap {
    &self.sources
  }

  pub fn root(&self) -> &AstNode {
    &self.root
  }

  pub fn len(&self) -> usize {
    self.root.statements().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Type-check the collected statements in place and generate code.
  pub fn compile(&mut self) -> CompileResult<Compilation> {
    compile_root(&mut self.root)
  }
}

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct Compilation {
  pub module: Module,
  pub frame_size: u32,
}

impl Compilation {
  pub fn assembly(&self) -> String {
    self.module.render()
  }
}

/// Run the type checker over `root` and feed the result to a fresh code
/// generator.
pub fn compile_root(root: &mut AstNode) -> CompileResult<Compilation> {
  let mut checker = TypeChecker::new();
  checker.check(root)?;
  let frame_size = checker.alloc_size();
  let module = CodeGenerator::new().generate(root, frame_size)?;
  Ok(Compilation { module, frame_size })
}

/// Compile a multi-line source string into NASM assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let mut program = Program::from_source("<input>", source)?;
  debug!(statements = program.len(), "parsed program");
  Ok(program.compile()?.assembly())
}

pub fn read_source(path: &Path) -> CompileResult<String> {
  fs::read_to_string(path).context(error::IoSnafu { path })
}

/// Write `text` to `<name>.asm` and return the path written.
pub fn write_artifact(name: &str, text: &str) -> CompileResult<PathBuf> {
  let path = PathBuf::from(format!("{name}.asm"));
  fs::write(&path, text).context(error::IoSnafu { path: path.clone() })?;
  info!(path = %path.display(), bytes = text.len(), "wrote assembly");
  Ok(path)
}
