use std::io::{self, BufRead, Write};
use std::process;

use chronos::cli::{Cli, Emit};
use chronos::{CompileResult, Program};
use clap::Parser;
use tracing::{debug, info};

const PROMPT: &str = "chronos > ";

fn main() {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_target(false)
    .with_writer(io::stderr)
    .with_max_level(cli.log_level())
    .init();

  let mut program = match &cli.input {
    Some(path) => {
      let name = path.display().to_string();
      let mut program = Program::new(name);
      let result = chronos::read_source(path).and_then(|text| {
        for line in text.lines() {
          echo_line(&mut program, line, cli.emit)?;
        }
        Ok(())
      });
      if let Err(err) = result {
        eprintln!("{}", err.render(program.sources()));
        process::exit(1);
      }
      program
    }
    None => repl(cli.emit),
  };

  debug!(statements = program.len(), "compiling");
  let written = program
    .compile()
    .and_then(|compilation| chronos::write_artifact(&cli.output, &compilation.assembly()));
  match written {
    Ok(path) => info!(path = %path.display(), "done"),
    Err(err) => {
      eprintln!("{}", err.render(program.sources()));
      process::exit(1);
    }
  }
}

/// Read lines from stdin until `exit` or end of input. A bad line is
/// reported and dropped; the session continues.
fn repl(emit: Emit) -> Program {
  let mut program = Program::new("<STDIN>");
  let stdin = io::stdin();
  let mut input = stdin.lock();
  let mut buffer = String::new();

  loop {
    print!("{PROMPT}");
    if let Err(err) = io::stdout().flush() {
      debug!(%err, "could not flush the prompt");
    }

    buffer.clear();
    match input.read_line(&mut buffer) {
      Ok(0) => break,
      Ok(_) => {}
      Err(err) => {
        eprintln!("error: could not read stdin: {err}");
        break;
      }
    }

    let line = buffer.trim_end_matches(['\n', '\r']);
    if line == "exit" {
      break;
    }
    if let Err(err) = echo_line(&mut program, line, emit) {
      println!("error: {}", err.render(program.sources()));
    }
  }

  program
}

fn echo_line(program: &mut Program, line: &str, emit: Emit) -> CompileResult<()> {
  let (origin, tokens) = program.lex_line(line)?;
  if emit == Emit::Tokens {
    let listing: Vec<String> = tokens.iter().map(ToString::to_string).collect();
    println!("[{}]", listing.join(", "));
  }
  let stmt = program.push_tokens(tokens, origin)?;
  if emit == Emit::Ast
    && let Some(stmt) = stmt
  {
    println!("result: {stmt}");
  }
  Ok(())
}
