use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
  name = "chronos",
  version,
  about = "Compiles a line-oriented expression language to 32-bit NASM",
  after_long_help = "Without INPUT an interactive prompt is started; type `exit` to finish and write the assembly."
)]
pub struct Cli {
  /// Source file, one statement per line
  pub input: Option<PathBuf>,

  /// Output name; the assembly is written to `<OUTPUT>.asm`
  #[arg(short, long, default_value = "Chronos")]
  pub output: String,

  /// What to print for each accepted line
  #[arg(long, value_enum, default_value_t = Emit::Asm)]
  pub emit: Emit,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = ArgAction::Count)]
  pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Emit {
  /// Print the token list of every line
  Tokens,
  /// Print the parsed statement of every line
  Ast,
  /// Only write the assembly file
  Asm,
}

impl Cli {
  pub fn log_level(&self) -> Level {
    match self.verbose {
      0 => Level::WARN,
      1 => Level::DEBUG,
      _ => Level::TRACE,
    }
  }
}
