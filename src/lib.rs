use std::io::BufRead;

use anyhow::Result;

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod error;
pub mod eval;
pub mod executor;
pub mod fixtures;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod token;

/// Runs a program end to end, reading `input` statements from stdin.
/// Returns the program's echoed output joined with newlines.
pub fn run(source: &str) -> Result<String> {
    run_with_input(source, std::io::stdin().lock())
}

/// Same as [`run`], but with a caller-supplied reader for `input`
/// statements.
pub fn run_with_input(source: &str, input: impl BufRead) -> Result<String> {
    let tokens = lexer::tokenize(source)?;
    let statements = parser::parse(&tokens)?;
    let mut tree = compiler::compile(&statements)?;
    let instructions = codegen::generate(&tree);
    let mut executor = executor::Executor::new(input);
    let output = executor.execute(&instructions, &mut tree)?;
    Ok(output)
}
