//! Recursive-descent parser producing one expression statement per line.
//!
//! Precedence climbs from assignment down to atoms:
//!
//! ```text
//! expression := ID '=' expression | logic
//! logic      := comparison (('&&' | '||') comparison)*
//! comparison := arith (('==' | '<' | '>' | '<=' | '>=') arith)*
//! arith      := term (('+' | '-') term)*
//! term       := factor (('*' | '/') factor)*
//! factor     := ('-' | '!') factor | callable
//! callable   := atom
//! atom       := INT | FLOAT | ID | '(' expression ')'
//! ```
//!
//! Assignment needs one token of lookahead past the identifier, so the token
//! stream supports saving and restoring its cursor.

use std::fmt;

use tracing::trace;

use crate::error::{CompileError, CompileResult, ErrorKind, Position};
use crate::tokenizer::{Token, TokenKind, TokenValue, describe_token};
use crate::ty::ValueType;

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  And,
  Or,
  Equal,
  Less,
  Greater,
  LessEq,
  GreaterEq,
}

impl BinaryOp {
  fn from_token(kind: TokenKind) -> Option<Self> {
    let op = match kind {
      TokenKind::Add => BinaryOp::Add,
      TokenKind::Sub => BinaryOp::Sub,
      TokenKind::Mul => BinaryOp::Mul,
      TokenKind::Div => BinaryOp::Div,
      TokenKind::And => BinaryOp::And,
      TokenKind::Or => BinaryOp::Or,
      TokenKind::Equal => BinaryOp::Equal,
      TokenKind::Less => BinaryOp::Less,
      TokenKind::Greater => BinaryOp::Greater,
      TokenKind::LessEq => BinaryOp::LessEq,
      TokenKind::GreaterEq => BinaryOp::GreaterEq,
      _ => return None,
    };
    Some(op)
  }

  pub fn is_arithmetic(self) -> bool {
    matches!(
      self,
      BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
    )
  }

  pub fn is_comparison(self) -> bool {
    matches!(
      self,
      BinaryOp::Equal | BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEq | BinaryOp::GreaterEq
    )
  }
}

impl fmt::Display for BinaryOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BinaryOp::Add => "ADD",
      BinaryOp::Sub => "SUB",
      BinaryOp::Mul => "MUL",
      BinaryOp::Div => "DIV",
      BinaryOp::And => "KW_AND",
      BinaryOp::Or => "KW_OR",
      BinaryOp::Equal => "EQUAL",
      BinaryOp::Less => "LESS",
      BinaryOp::Greater => "GREATER",
      BinaryOp::LessEq => "LESS_EQ",
      BinaryOp::GreaterEq => "GREATER_EQ",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Not,
}

impl fmt::Display for UnaryOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UnaryOp::Neg => f.write_str("SUB"),
      UnaryOp::Not => f.write_str("NOT"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
  Int(i32),
  Float(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
  Root {
    statements: Vec<AstNode>,
  },
  Num {
    value: Literal,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  Unary {
    op: UnaryOp,
    operand: Box<AstNode>,
  },
  Assign {
    name: String,
    value: Box<AstNode>,
  },
  Access {
    name: String,
  },
}

/// Expression tree node. `value_type` starts out unresolved and is filled in
/// by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
  pub kind: NodeKind,
  pub start: Position,
  pub end: Position,
  pub value_type: ValueType,
}

impl AstNode {
  fn new(kind: NodeKind, start: Position, end: Position) -> Self {
    Self {
      kind,
      start,
      end,
      value_type: ValueType::Unresolved,
    }
  }

  pub fn root(statements: Vec<AstNode>) -> Self {
    let start = statements.first().map(|n| n.start).unwrap_or_default();
    let end = statements.last().map(|n| n.end).unwrap_or_default();
    Self::new(NodeKind::Root { statements }, start, end)
  }

  pub fn number(value: Literal, start: Position, end: Position) -> Self {
    Self::new(NodeKind::Num { value }, start, end)
  }

  pub fn access(name: String, start: Position, end: Position) -> Self {
    Self::new(NodeKind::Access { name }, start, end)
  }

  pub fn unary(op: UnaryOp, operand: AstNode, start: Position) -> Self {
    let end = operand.end;
    Self::new(
      NodeKind::Unary {
        op,
        operand: Box::new(operand),
      },
      start,
      end,
    )
  }

  pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
    let (start, end) = (lhs.start, rhs.end);
    Self::new(
      NodeKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      start,
      end,
    )
  }

  pub fn assign(name: String, value: AstNode, start: Position) -> Self {
    let end = value.end;
    Self::new(
      NodeKind::Assign {
        name,
        value: Box::new(value),
      },
      start,
      end,
    )
  }

  /// Top-level statements of a root node; empty for any other kind.
  pub fn statements(&self) -> &[AstNode] {
    match &self.kind {
      NodeKind::Root { statements } => statements,
      _ => &[],
    }
  }

  pub fn push_statement(&mut self, node: AstNode) {
    if let NodeKind::Root { statements } = &mut self.kind {
      if statements.is_empty() {
        self.start = node.start;
      }
      self.end = node.end;
      statements.push(node);
    }
  }

  /// Move this node's children into `out`, leaving it childless.
  fn detach_children(&mut self, out: &mut Vec<AstNode>) {
    let placeholder = NodeKind::Root {
      statements: Vec::new(),
    };
    match std::mem::replace(&mut self.kind, placeholder) {
      NodeKind::Root { statements } => out.extend(statements),
      NodeKind::Binary { lhs, rhs, .. } => {
        out.push(*rhs);
        out.push(*lhs);
      }
      NodeKind::Unary { operand, .. } => out.push(*operand),
      NodeKind::Assign { value, .. } => out.push(*value),
      NodeKind::Num { .. } | NodeKind::Access { .. } => {}
    }
  }
}

/// Tear the tree down with an explicit work list so deeply nested
/// expressions never recurse through the destructor.
impl Drop for AstNode {
  fn drop(&mut self) {
    let mut pending = Vec::new();
    self.detach_children(&mut pending);
    while let Some(mut node) = pending.pop() {
      node.detach_children(&mut pending);
    }
  }
}

impl fmt::Display for AstNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      NodeKind::Root { statements } => {
        write!(f, "ROOT(")?;
        for (i, stmt) in statements.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{stmt}")?;
        }
        write!(f, ")")
      }
      NodeKind::Num {
        value: Literal::Int(v),
      } => write!(f, "NUM(INT({v}))"),
      NodeKind::Num {
        value: Literal::Float(v),
      } => write!(f, "NUM(FLOAT({v:?}))"),
      NodeKind::Binary { op, lhs, rhs } => write!(f, "BINOP({lhs}, {op}, {rhs})"),
      NodeKind::Unary { op, operand } => write!(f, "UNRYOP({op}, {operand})"),
      NodeKind::Assign { name, value } => write!(f, "ASSIGN({name}, {value})"),
      NodeKind::Access { name } => write!(f, "ACCESS({name})"),
    }
  }
}

/// Parse one line's tokens into a statement. An empty token list is not an
/// error; it simply yields no statement. `origin` anchors end-of-input
/// diagnostics when there are no tokens to point at.
pub fn parse(tokens: Vec<Token>, origin: Position) -> CompileResult<Option<AstNode>> {
  let mut stream = TokenStream::new(tokens, origin);

  if stream.is_eof() {
    return Ok(None);
  }

  let node = parse_expr(&mut stream)?;

  if let Some(token) = stream.peek() {
    return Err(CompileError::at(
      ErrorKind::InvalidSyntax,
      format!("Parser: unexpected token {}", describe_token(Some(token))),
      token.start,
      token.end,
    ));
  }

  trace!(node = %node, "parsed statement");
  Ok(Some(node))
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let checkpoint = stream.checkpoint();

  if let Some(Token {
    kind: TokenKind::Id,
    value: Some(TokenValue::Ident(name)),
    start,
    ..
  }) = stream.advance()
    && stream.eat(TokenKind::Assign)
  {
    let value = parse_expr(stream)?;
    return Ok(AstNode::assign(name, value, start));
  }

  stream.rewind(checkpoint);
  parse_logic(stream)
}

fn parse_logic(stream: &mut TokenStream) -> CompileResult<AstNode> {
  parse_binary(stream, &[TokenKind::And, TokenKind::Or], parse_comparison)
}

fn parse_comparison(stream: &mut TokenStream) -> CompileResult<AstNode> {
  parse_binary(
    stream,
    &[
      TokenKind::Equal,
      TokenKind::Less,
      TokenKind::Greater,
      TokenKind::LessEq,
      TokenKind::GreaterEq,
    ],
    parse_arith,
  )
}

fn parse_arith(stream: &mut TokenStream) -> CompileResult<AstNode> {
  parse_binary(stream, &[TokenKind::Add, TokenKind::Sub], parse_term)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<AstNode> {
  parse_binary(stream, &[TokenKind::Mul, TokenKind::Div], parse_factor)
}

/// Left-associative fold of `operand (op operand)*`.
fn parse_binary(
  stream: &mut TokenStream,
  ops: &[TokenKind],
  operand: fn(&mut TokenStream) -> CompileResult<AstNode>,
) -> CompileResult<AstNode> {
  let mut node = operand(stream)?;

  while let Some(kind) = stream.peek_kind().filter(|kind| ops.contains(kind)) {
    stream.advance();
    let Some(op) = BinaryOp::from_token(kind) else {
      unreachable!("{kind} is not a binary operator");
    };
    let rhs = operand(stream)?;
    node = AstNode::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_factor(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let op = match stream.peek_kind() {
    Some(TokenKind::Sub) => UnaryOp::Neg,
    Some(TokenKind::Not) => UnaryOp::Not,
    _ => return parse_callable(stream),
  };

  let Some(op_token) = stream.advance() else {
    unreachable!("peeked token vanished");
  };
  if stream.is_eof() {
    return Err(CompileError::at(
      ErrorKind::InvalidSyntax,
      "Parser: Expected Expression found EOF",
      op_token.start,
      op_token.end,
    ));
  }

  let operand = parse_factor(stream)?;
  Ok(AstNode::unary(op, operand, op_token.start))
}

fn parse_callable(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let node = parse_atom(stream)?;

  if let Some(paren) = stream.peek().filter(|t| t.kind == TokenKind::LParen) {
    return Err(CompileError::at(
      ErrorKind::InvalidSyntax,
      "Parser: unsupported feature: function calls",
      paren.start,
      paren.end,
    ));
  }

  Ok(node)
}

fn parse_atom(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let Some(token) = stream.advance() else {
    let at = stream.last_end();
    return Err(CompileError::at(
      ErrorKind::InvalidSyntax,
      "Parser: Expected Expression found EOF",
      at,
      at,
    ));
  };

  match (token.kind, &token.value) {
    (TokenKind::Int, Some(TokenValue::Int(v))) => {
      Ok(AstNode::number(Literal::Int(*v), token.start, token.end))
    }
    (TokenKind::Float, Some(TokenValue::Float(v))) => {
      Ok(AstNode::number(Literal::Float(*v), token.start, token.end))
    }
    (TokenKind::Id, Some(TokenValue::Ident(name))) => {
      Ok(AstNode::access(name.clone(), token.start, token.end))
    }
    (TokenKind::LParen, _) => {
      let node = parse_expr(stream)?;
      if stream.eat(TokenKind::RParen) {
        return Ok(node);
      }
      Err(CompileError::at(
        ErrorKind::InvalidSyntax,
        format!(
          "Parser: expected ')' to close '(', found: {}",
          describe_token(stream.peek())
        ),
        token.start,
        token.end,
      ))
    }
    _ => Err(CompileError::at(
      ErrorKind::InvalidSyntax,
      format!("Parser: expected INT, FLOAT, IDENTIFIER, '-', '!' or '(', found: {token}"),
      token.start,
      token.end,
    )),
  }
}

/// Randomly addressable cursor over the token vector.
struct TokenStream {
  tokens: Vec<Token>,
  origin: Position,
  pos: usize,
}

impl TokenStream {
  fn new(tokens: Vec<Token>, origin: Position) -> Self {
    Self {
      tokens,
      origin,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_kind(&self) -> Option<TokenKind> {
    self.peek().map(|token| token.kind)
  }

  fn advance(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned()?;
    self.pos += 1;
    Some(token)
  }

  /// Consume the current token if it has the given kind.
  fn eat(&mut self, kind: TokenKind) -> bool {
    if self.peek_kind() == Some(kind) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn checkpoint(&self) -> usize {
    self.pos
  }

  fn rewind(&mut self, checkpoint: usize) {
    self.pos = checkpoint;
  }

  /// Where the input ran out: the end of the last consumed token.
  fn last_end(&self) -> Position {
    self
      .pos
      .checked_sub(1)
      .and_then(|i| self.tokens.get(i))
      .map_or(self.origin, |token| token.end)
  }

  fn is_eof(&self) -> bool {
    self.pos >= self.tokens.len()
  }
}
