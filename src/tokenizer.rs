//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer stops at the first character it cannot classify. Compound
//! operators each have their own recogniser: `&&` and `||` must be spelled
//! out in full, while `=`, `<` and `>` optionally absorb a trailing `=`.

use std::fmt;

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult, ErrorKind, FileId, Position};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Int,
  Float,
  Id,
  Add,
  Sub,
  Mul,
  Div,
  Not,
  LParen,
  RParen,
  Assign,
  And,
  Or,
  Equal,
  Less,
  Greater,
  LessEq,
  GreaterEq,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TokenKind::Int => "INT",
      TokenKind::Float => "FLOAT",
      TokenKind::Id => "ID",
      TokenKind::Add => "ADD",
      TokenKind::Sub => "SUB",
      TokenKind::Mul => "MUL",
      TokenKind::Div => "DIV",
      TokenKind::Not => "NOT",
      TokenKind::LParen => "LROUND",
      TokenKind::RParen => "RROUND",
      TokenKind::Assign => "ASSIGN",
      TokenKind::And => "KW_AND",
      TokenKind::Or => "KW_OR",
      TokenKind::Equal => "EQUAL",
      TokenKind::Less => "LESS",
      TokenKind::Greater => "GREATER",
      TokenKind::LessEq => "LESS_EQ",
      TokenKind::GreaterEq => "GREATER_EQ",
    };
    f.write_str(name)
  }
}

/// Literal payload carried by `Int`, `Float` and `Id` tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
  Int(i32),
  Float(f32),
  Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<TokenValue>,
  pub start: Position,
  pub end: Position,
}

impl Token {
  pub fn new(kind: TokenKind, value: Option<TokenValue>, start: Position, end: Position) -> Self {
    Self {
      kind,
      value,
      start,
      end,
    }
  }

  pub fn ident(&self) -> Option<&str> {
    match &self.value {
      Some(TokenValue::Ident(name)) => Some(name),
      _ => None,
    }
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.value {
      Some(TokenValue::Int(v)) => write!(f, "INT({v})"),
      Some(TokenValue::Float(v)) => write!(f, "FLOAT({v:?})"),
      Some(TokenValue::Ident(name)) => write!(f, "ID({name})"),
      None => write!(f, "{}", self.kind),
    }
  }
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>) -> String {
  match token {
    Some(t) => t.to_string(),
    None => "EOF".to_string(),
  }
}

const KEYWORDS: &[(&str, TokenKind)] = &[("&&", TokenKind::And), ("||", TokenKind::Or)];

/// Look up a reserved spelling.
pub fn keyword(text: &str) -> Option<TokenKind> {
  KEYWORDS
    .iter()
    .find(|(spelling, _)| *spelling == text)
    .map(|(_, kind)| *kind)
}

fn is_letter(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

/// Lex a whole file from its beginning.
pub fn tokenize(input: &str, file: FileId) -> CompileResult<Vec<Token>> {
  tokenize_from(input, Position::origin(file))
}

/// Lex `input` as if it started at `origin`, so a single line of a larger
/// file keeps file-global positions.
pub fn tokenize_from(input: &str, origin: Position) -> CompileResult<Vec<Token>> {
  let mut lexer = Lexer {
    input,
    offset: 0,
    pos: origin,
  };
  let tokens = lexer.run()?;
  debug!(count = tokens.len(), line = origin.line, "tokenized input");
  Ok(tokens)
}

struct Lexer<'a> {
  input: &'a str,
  offset: usize,
  pos: Position,
}

impl Lexer<'_> {
  fn peek(&self) -> Option<char> {
    self.input[self.offset..].chars().next()
  }

  fn bump(&mut self) {
    if let Some(c) = self.peek() {
      self.offset += c.len_utf8();
      self.pos = self.pos.advanced(c);
    }
  }

  fn run(&mut self) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();

    while let Some(c) = self.peek() {
      if matches!(c, ' ' | '\t' | '\r' | '\n') {
        self.bump();
        continue;
      }

      let token = if c.is_ascii_digit() {
        self.lex_number()?
      } else if is_letter(c) {
        self.lex_identifier()
      } else {
        self.lex_operator(c)?
      };
      trace!(token = %token, "lexed token");
      tokens.push(token);
    }

    Ok(tokens)
  }

  fn lex_number(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    let begin = self.offset;
    let mut has_dot = false;

    while let Some(c) = self.peek() {
      if c == '.' {
        if has_dot {
          break;
        }
        has_dot = true;
      } else if !c.is_ascii_digit() {
        break;
      }
      self.bump();
    }

    let text = &self.input[begin..self.offset];
    let end = self.pos;
    let invalid = |reason: String| {
      CompileError::at(
        ErrorKind::IllegalChar,
        format!("invalid number literal '{text}': {reason}"),
        start,
        end,
      )
    };

    if has_dot {
      let value = text.parse::<f32>().map_err(|err| invalid(err.to_string()))?;
      if !value.is_finite() {
        return Err(invalid("out of range for a 32-bit float".to_string()));
      }
      Ok(Token::new(TokenKind::Float, Some(TokenValue::Float(value)), start, end))
    } else {
      let value = text.parse::<i32>().map_err(|err| invalid(err.to_string()))?;
      Ok(Token::new(TokenKind::Int, Some(TokenValue::Int(value)), start, end))
    }
  }

  fn lex_identifier(&mut self) -> Token {
    let start = self.pos;
    let begin = self.offset;
    while let Some(c) = self.peek() {
      if !(is_letter(c) || c.is_ascii_digit()) {
        break;
      }
      self.bump();
    }

    let text = &self.input[begin..self.offset];
    match keyword(text) {
      Some(kind) => Token::new(kind, None, start, self.pos),
      None => Token::new(
        TokenKind::Id,
        Some(TokenValue::Ident(text.to_string())),
        start,
        self.pos,
      ),
    }
  }

  fn lex_operator(&mut self, c: char) -> CompileResult<Token> {
    let single = match c {
      '+' => Some(TokenKind::Add),
      '-' => Some(TokenKind::Sub),
      '*' => Some(TokenKind::Mul),
      '/' => Some(TokenKind::Div),
      '!' => Some(TokenKind::Not),
      '(' => Some(TokenKind::LParen),
      ')' => Some(TokenKind::RParen),
      _ => None,
    };
    if let Some(kind) = single {
      let start = self.pos;
      self.bump();
      return Ok(Token::new(kind, None, start, self.pos));
    }

    match c {
      '=' => Ok(self.lex_optional_eq(TokenKind::Assign, TokenKind::Equal)),
      '<' => Ok(self.lex_optional_eq(TokenKind::Less, TokenKind::LessEq)),
      '>' => Ok(self.lex_optional_eq(TokenKind::Greater, TokenKind::GreaterEq)),
      '&' | '|' => self.lex_doubled(c),
      _ => {
        let start = self.pos;
        self.bump();
        Err(CompileError::at(
          ErrorKind::IllegalChar,
          format!("found char: {c}"),
          start,
          self.pos,
        ))
      }
    }
  }

  /// `=`, `<`, `>` followed immediately by `=` form the two-character kind.
  fn lex_optional_eq(&mut self, alone: TokenKind, with_eq: TokenKind) -> Token {
    let start = self.pos;
    self.bump();
    if self.peek() == Some('=') {
      self.bump();
      return Token::new(with_eq, None, start, self.pos);
    }
    Token::new(alone, None, start, self.pos)
  }

  /// `&&` and `||`: the second character must repeat the first.
  fn lex_doubled(&mut self, c: char) -> CompileResult<Token> {
    let start = self.pos;
    let begin = self.offset;
    self.bump();
    self.expect_char(c)?;

    let text = &self.input[begin..self.offset];
    let Some(kind) = keyword(text) else {
      unreachable!("doubled operator '{text}' missing from keyword table");
    };
    Ok(Token::new(kind, None, start, self.pos))
  }

  fn expect_char(&mut self, expected: char) -> CompileResult<()> {
    let start = self.pos;
    match self.peek() {
      Some(found) if found == expected => {
        self.bump();
        Ok(())
      }
      Some(found) => {
        self.bump();
        Err(CompileError::at(
          ErrorKind::ExpectedChar,
          format!("expected '{expected}', found: '{found}'"),
          start,
          self.pos,
        ))
      }
      None => Err(CompileError::at(
        ErrorKind::ExpectedChar,
        format!("expected '{expected}', found end of input"),
        start,
        start,
      )),
    }
  }
}
