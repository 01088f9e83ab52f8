/// Flat statement records produced by the parser.
///
/// Block openers and closers are distinct markers at this stage; nesting is
/// reconstructed later by the tree builder. Every record carries the source
/// line it came from for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Echo {
        /// Template text without the surrounding quotes; may contain
        /// `{name}` placeholders.
        text: String,
        line: usize,
    },
    Input {
        name: String,
        line: usize,
    },
    Assign {
        name: String,
        op: AssignOp,
        /// Right-hand side, re-tokenized at execution time.
        expr: String,
        line: usize,
    },
    If {
        condition: String,
        line: usize,
    },
    ElseIf {
        condition: String,
        line: usize,
    },
    Else {
        line: usize,
    },
    EndIf {
        line: usize,
    },
    While {
        condition: String,
        line: usize,
    },
    EndWhile {
        line: usize,
    },
    For {
        /// `name=expr` fragment executed once before the loop.
        init: String,
        condition: String,
        /// `name=expr` fragment re-executed at the end of every iteration.
        increment: String,
        line: usize,
    },
    EndFor {
        line: usize,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
}

impl Statement {
    pub fn line(&self) -> usize {
        match self {
            Statement::Echo { line, .. }
            | Statement::Input { line, .. }
            | Statement::Assign { line, .. }
            | Statement::If { line, .. }
            | Statement::ElseIf { line, .. }
            | Statement::Else { line }
            | Statement::EndIf { line }
            | Statement::While { line, .. }
            | Statement::EndWhile { line }
            | Statement::For { line, .. }
            | Statement::EndFor { line }
            | Statement::Break { line }
            | Statement::Continue { line } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,    // =
    Add,    // +=
    Sub,    // -=
    Mul,    // *=
    Div,    // /=
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}
