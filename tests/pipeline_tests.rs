mod common;

use common::{Printed, execute, run, run_float, run_ints};

#[test]
fn integer_comparisons_yield_zero_or_one() {
  assert_eq!(run_ints("3 > 2\n2 < 3\n2 > 3\n3 < 2"), [1, 1, 0, 0]);
  assert_eq!(run_ints("2 <= 2\n3 <= 2\n2 >= 2\n1 >= 2"), [1, 0, 1, 0]);
  assert_eq!(run_ints("4 == 4\n4 == 5"), [1, 0]);
  assert_eq!(run_ints("-1 < 1"), [1]);
}

#[test]
fn float_comparisons_yield_zero_or_one() {
  assert_eq!(run_ints("1.5 < 2.5\n2.5 < 1.5\n2.5 > 1.5\n1.5 > 2.5"), [1, 0, 1, 0]);
  assert_eq!(run_ints("1.5 <= 1.5\n1.5 >= 1.5\n1.5 == 1.5\n1.5 == 2.5"), [1, 1, 1, 0]);
}

#[test]
fn mixed_comparisons_convert_the_int_side() {
  assert_eq!(run_ints("2 < 2.5\n2.5 < 2\n3 > 2.5\n2.0 == 2"), [1, 0, 1, 1]);
}

#[test]
fn integer_arithmetic() {
  assert_eq!(run_ints("1 + 2 * 3\n(1 + 2) * 3\n10 - 4 - 3\n17 / 5"), [7, 9, 3, 3]);
}

#[test]
fn float_and_mixed_arithmetic() {
  assert_eq!(run_float("1.5 + 2.25"), 3.75);
  assert_eq!(run_float("2 * 1.5"), 3.0);
  assert_eq!(run_float("7.5 / 3"), 2.5);
  assert_eq!(run_float("1 - 0.25"), 0.75);
}

#[test]
fn negation() {
  assert_eq!(run_ints("-5\n--5\n-(2 - 7)"), [-5, 5, 5]);
  assert_eq!(run_float("-2.5"), -2.5);
  assert_eq!(run_float("-(1.5 * 2)"), -3.0);
}

#[test]
fn logical_not() {
  assert_eq!(run_ints("!0\n!7\n!!7\n!0.0\n!0.5"), [1, 0, 1, 1, 0]);
}

#[test]
fn logical_and_or() {
  assert_eq!(run_ints("1 && 2\n1 && 0\n0 && 1\n0 && 0"), [1, 0, 0, 0]);
  assert_eq!(run_ints("1 || 0\n0 || 3\n0 || 0"), [1, 1, 0]);
  assert_eq!(run_ints("0.5 && 2\n0.0 || 0.0"), [1, 0]);
}

#[test]
fn short_circuit_skips_a_dividing_right_operand() {
  // The stub machine panics on a zero divisor, so reaching `1 / 0` fails.
  assert_eq!(run_ints("0 && (1 / 0)\n1 || (1 / 0)"), [0, 1]);
}

#[test]
fn nested_logic_keeps_its_labels_apart() {
  assert_eq!(run_ints("(1 && 0) || (0 || 1)\n(0 || 0) || (1 && 1)\n(1 && 1) && (0 || 0)"), [1, 1, 0]);
}

#[test]
fn variables_hold_their_values() {
  assert_eq!(run_ints("x = 6\ny = x * 7\ny\nx = x + 1\nx"), [6, 42, 42, 7, 7]);
}

#[test]
fn chained_assignment() {
  assert_eq!(run_ints("a = b = 3\na + b"), [3, 6]);
}

#[test]
fn reassigning_a_float_into_an_int_variable() {
  let printed = run("x = 1\nx = 2.5\nx * 2");
  assert_eq!(printed, [Printed::Int(1), Printed::Float(2.5), Printed::Float(5.0)]);
}

#[test]
fn program_exits_cleanly_with_the_heap_initialised() {
  let machine = execute("x = 1\nx + 1");
  assert_eq!(machine.exit_status(), Some(0));
  assert_ne!(machine.heap_ptr(), 0);
}

#[test]
fn blank_lines_produce_no_output() {
  assert_eq!(run_ints("1\n\n   \n2"), [1, 2]);
}

#[test]
fn empty_program_prints_nothing() {
  let machine = execute("");
  assert!(machine.output().is_empty());
  assert_eq!(machine.exit_status(), Some(0));
}

#[test]
fn integer_division_is_unsigned() {
  // `div` treats the negated dividend as 0xfffffffa.
  assert_eq!(run_ints("-6 / 2"), [2147483645]);
  assert_eq!(run_ints("-3 * 2"), [-6]);
}
