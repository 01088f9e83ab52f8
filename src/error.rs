use thiserror::Error;

/// Malformed statement stream reaching the parser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Syntax error at line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Structural errors raised while the tree builder reconstructs nesting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("Unterminated '{opener}' block opened at line {line}")]
    UnterminatedBlock { opener: &'static str, line: usize },
    #[error("Unexpected '{closer}' at line {line}: no open block to close")]
    UnmatchedCloser { closer: &'static str, line: usize },
    #[error("'{keyword}' at line {line} is not inside a loop")]
    NoEnclosingLoop { keyword: &'static str, line: usize },
    #[error("'{found}' block closed by 'fi' at line {line} has no matching 'if'")]
    MissingIfBranch { found: &'static str, line: usize },
}

/// Fatal conditions during instruction execution. None of these are
/// recovered; they abort the whole run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },
    #[error("Unable to evaluate expression '{expression}'")]
    ExpressionEvaluation { expression: String },
    #[error("'{value}' is not a number")]
    NotANumber { value: String },
    #[error("Undefined label '{label}'")]
    UndefinedLabel { label: String },
    #[error("Failed to read input: {message}")]
    Input { message: String },
}
