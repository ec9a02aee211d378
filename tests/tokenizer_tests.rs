use chronos::tokenizer::{TokenKind, TokenValue, tokenize};
use chronos::{ErrorKind, FileId};

#[test]
fn digit_runs_lex_to_a_single_int_with_the_same_value() {
  for value in [0, 7, 42, 1000, 65536, i32::MAX] {
    let text = value.to_string();
    let tokens = tokenize(&text, FileId(0)).expect("digits lex");
    assert_eq!(tokens.len(), 1, "{text}");
    assert_eq!(tokens[0].kind, TokenKind::Int);
    assert_eq!(tokens[0].value, Some(TokenValue::Int(value)));
  }
}

#[test]
fn leading_zeros_keep_the_value() {
  let tokens = tokenize("007", FileId(0)).expect("lexes");
  assert_eq!(tokens[0].value, Some(TokenValue::Int(7)));
}

#[test]
fn illegal_char_spans_exactly_one_character() {
  let err = tokenize("1 + @", FileId(0)).expect_err("@ is illegal");
  assert_eq!(err.kind(), Some(ErrorKind::IllegalChar));
  let (start, end) = err.span().expect("located");
  assert_eq!(start.index, 4);
  assert_eq!(end.index, 5);
  assert_eq!(start.line, end.line);
  assert_eq!(end.column - start.column, 1);
}

#[test]
fn out_of_range_literal_is_rejected() {
  let err = tokenize("99999999999", FileId(0)).expect_err("overflows i32");
  assert_eq!(err.kind(), Some(ErrorKind::IllegalChar));
  assert!(err.to_string().contains("invalid number literal"));
}

#[test]
fn float_literal_beyond_f32_is_rejected() {
  let text = format!("1{}.0", "0".repeat(50));
  let err = tokenize(&text, FileId(0)).expect_err("overflows f32");
  assert_eq!(err.kind(), Some(ErrorKind::IllegalChar));
  assert!(err.to_string().contains("invalid number literal"));
  let (start, end) = err.span().expect("located");
  assert_eq!((start.index, end.index), (0, text.len()));
}

#[test]
fn full_operator_set() {
  let tokens = tokenize("a=(1.5<=b)||!c>=2&&d==e", FileId(0)).expect("lexes");
  let rendered: Vec<String> = tokens.iter().map(ToString::to_string).collect();
  assert_eq!(
    rendered,
    [
      "ID(a)",
      "ASSIGN",
      "LROUND",
      "FLOAT(1.5)",
      "LESS_EQ",
      "ID(b)",
      "RROUND",
      "KW_OR",
      "NOT",
      "ID(c)",
      "GREATER_EQ",
      "INT(2)",
      "KW_AND",
      "ID(d)",
      "EQUAL",
      "ID(e)",
    ]
  );
}

#[test]
fn lone_ampersand_expects_its_twin() {
  let err = tokenize("1 & 2", FileId(0)).expect_err("needs &&");
  assert_eq!(err.kind(), Some(ErrorKind::ExpectedChar));
}
