use std::{env, fs, process};

use core::errors::SourceError;

fn main() {
  let mut args = env::args();
  let program = args.next().unwrap_or_else(|| "pinky".to_string());
  let positional: Vec<String> = args.collect();

  let (filename, disasm) = match parse_args(&positional) {
    Some(parsed) => parsed,
    None => {
      eprintln!("usage: {} [--disasm] <filename>", program);
      process::exit(1);
    }
  };

  let source = match fs::read_to_string(&filename) {
    Ok(contents) => contents,
    Err(err) => {
      println!("could not read '{}': {}", filename, err);
      process::exit(1);
    }
  };

  if let Err(err) = run(&source, disasm) {
    println!("{}", err);
    process::exit(1);
  }
}

fn parse_args(args: &[String]) -> Option<(String, bool)> {
  match args {
    [filename] => Some((filename.clone(), false)),
    [flag, filename] if flag == "--disasm" => Some((filename.clone(), true)),
    _ => None,
  }
}

fn run(source: &str, disasm: bool) -> Result<(), SourceError> {
  let tokens = lexer::lex(source)?;
  let (arena, root) = parser::parse(&tokens)?;
  let image = compiler::compile(&arena, root)?;

  if disasm {
    print!("{}", virtual_machine::disasm::disassemble(&image));
  }

  virtual_machine::run(&image)
}
