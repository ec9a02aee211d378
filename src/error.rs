//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage reports failure through [`CompileResult`]. A located error
//! carries the span it was raised at; rendering it against a [`SourceMap`]
//! produces the offending line(s) with a tilde underline beneath the span.

use std::fmt;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Index of a file registered in a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub usize);

/// A point in the source text. Lines and columns are zero based; `index`
/// is the byte offset into the registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
  pub index: usize,
  pub line: usize,
  pub column: usize,
  pub file: FileId,
}

impl Position {
  pub fn new(index: usize, line: usize, column: usize, file: FileId) -> Self {
    Self {
      index,
      line,
      column,
      file,
    }
  }

  /// Start of a file.
  pub fn origin(file: FileId) -> Self {
    Self::new(0, 0, 0, file)
  }

  /// Position after stepping over `ch`.
  pub fn advanced(self, ch: char) -> Self {
    let index = self.index + ch.len_utf8();
    if ch == '\n' {
      Self::new(index, self.line + 1, 0, self.file)
    } else {
      Self::new(index, self.line, self.column + 1, self.file)
    }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "index: {}, line: {}, column: {}",
      self.index, self.line, self.column
    )
  }
}

/// Diagnostic categories. `Runtime` and `UndefinedOperator` are reserved and
/// not raised by any current check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  IllegalChar,
  ExpectedChar,
  InvalidSyntax,
  Runtime,
  UndefinedOperator,
  UndefinedVariable,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::IllegalChar => "ILLEGAL_CHAR",
      ErrorKind::ExpectedChar => "EXPECTED_CHAR",
      ErrorKind::InvalidSyntax => "INVALID_SYNTAX",
      ErrorKind::Runtime => "RUNTIME",
      ErrorKind::UndefinedOperator => "UNDEFINED_OPERATOR",
      ErrorKind::UndefinedVariable => "UNDEFINED_VARIABLE",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{kind}: {details}"))]
  Located {
    kind: ErrorKind,
    details: String,
    start: Position,
    end: Position,
  },

  #[snafu(display("could not access {}: {source}", path.display()))]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
}

impl CompileError {
  /// Construct an error covering `start..end`.
  pub fn at(kind: ErrorKind, details: impl Into<String>, start: Position, end: Position) -> Self {
    Self::Located {
      kind,
      details: details.into(),
      start,
      end,
    }
  }

  pub fn kind(&self) -> Option<ErrorKind> {
    match self {
      Self::Located { kind, .. } => Some(*kind),
      Self::Io { .. } => None,
    }
  }

  pub fn span(&self) -> Option<(Position, Position)> {
    match self {
      Self::Located { start, end, .. } => Some((*start, *end)),
      Self::Io { .. } => None,
    }
  }

  /// Message followed by a preview of the offending source lines. Falls back
  /// to the bare message when the file is not registered.
  pub fn render(&self, sources: &SourceMap) -> String {
    let Some((start, end)) = self.span() else {
      return self.to_string();
    };
    match sources.get(start.file) {
      Some(file) => format!("{self}\n{}", preview(&file.text, start, end)),
      None => self.to_string(),
    }
  }
}

fn preview(text: &str, start: Position, end: Position) -> String {
  let first = start.index.min(text.len());
  let line_start = text[..first].rfind('\n').map_or(0, |i| i + 1);
  let last_line = end.line.max(start.line);

  let mut rows = Vec::new();
  for (offset, line) in text[line_start..]
    .split('\n')
    .take(last_line - start.line + 1)
    .enumerate()
  {
    let line = line.trim_end_matches('\r');
    let row = start.line + offset;
    let col_start = if row == start.line { start.column } else { 0 };
    let col_end = if row == last_line {
      end.column
    } else {
      line.chars().count()
    };
    let width = col_end.saturating_sub(col_start).max(1);
    rows.push(format!(
      "{line}\n{}{}",
      " ".repeat(col_start),
      "~".repeat(width)
    ));
  }
  rows.join("\n")
}

/// One registered source text.
#[derive(Debug, Clone)]
pub struct SourceFile {
  pub name: String,
  pub text: String,
  lines: usize,
}

/// Per-compilation registry of source texts, indexed by [`FileId`].
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
  files: Vec<SourceFile>,
}

impl SourceMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
    let id = FileId(self.files.len());
    let text = text.into();
    self.files.push(SourceFile {
      name: name.into(),
      lines: text.lines().count(),
      text,
    });
    id
  }

  /// Append a line to a file (REPL buffering) and return the position its
  /// first character will have. Unknown ids yield the origin of that id.
  pub fn append_line(&mut self, file: FileId, line: &str) -> Position {
    let Some(entry) = self.files.get_mut(file.0) else {
      return Position::origin(file);
    };
    if entry.lines > 0 && !entry.text.ends_with('\n') {
      entry.text.push('\n');
    }
    let line_no = entry.text.matches('\n').count();
    let origin = Position::new(entry.text.len(), line_no, 0, file);
    entry.text.push_str(line);
    entry.lines += 1;
    origin
  }

  pub fn get(&self, file: FileId) -> Option<&SourceFile> {
    self.files.get(file.0)
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}
