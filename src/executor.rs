use std::io::BufRead;

use rustc_hash::FxHashMap;

use crate::ast::AssignOp;
use crate::codegen::Instruction;
use crate::compiler::{ExecutionTree, NodeId, NodeKind, TableId};
use crate::error::RuntimeError;
use crate::eval::{Value, evaluate};
use crate::lexer::tokenize_fragment;
use crate::symbols::{SymbolEntry, SymbolKind};
use crate::token::TokenKind;

/// Runs a lowered instruction list against its execution tree.
///
/// Reads `input` statements from the supplied reader and collects `echo`
/// output line by line, so programs are fully scriptable in tests.
pub struct Executor<R> {
    input: R,
    output: Vec<String>,
}

impl<R: BufRead> Executor<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            output: Vec::new(),
        }
    }

    /// Program-counter loop over the instruction list. Returns the collected
    /// output joined with newlines.
    pub fn execute(
        &mut self,
        instructions: &[Instruction],
        tree: &mut ExecutionTree,
    ) -> Result<String, RuntimeError> {
        let labels = index_labels(instructions);
        let mut pc = 0;
        while let Some(instruction) = instructions.get(pc) {
            match instruction {
                Instruction::Label { .. } => pc += 1,
                Instruction::Echo { node } => {
                    let line = self.interpolate(tree, *node)?;
                    self.output.push(line);
                    pc += 1;
                }
                Instruction::Input { node } => {
                    self.read_input(tree, *node)?;
                    pc += 1;
                }
                Instruction::Assign { node } => {
                    execute_assignment(tree, *node)?;
                    pc += 1;
                }
                Instruction::Goto { label } => {
                    pc = jump_target(&labels, label)?;
                }
                Instruction::JumpIfNot {
                    label,
                    condition,
                    node,
                } => {
                    if evaluate_condition(tree, *node, condition)? {
                        pc += 1;
                    } else {
                        pc = jump_target(&labels, label)?;
                    }
                }
            }
        }
        Ok(self.output.join("\n"))
    }

    /// Substitutes every `{name}` placeholder in an echo template with the
    /// variable's stored value; all other text passes through verbatim.
    fn interpolate(&self, tree: &ExecutionTree, id: NodeId) -> Result<String, RuntimeError> {
        let NodeKind::Echo { text } = &tree.node(id).kind else {
            unreachable!("echo instruction points at an echo node");
        };
        let mut line = String::new();
        for token in tokenize_fragment(text) {
            if token.kind == TokenKind::BracedIdentifier {
                let entry = lookup(tree, id, &token.text)?;
                line.push_str(&entry.value);
            } else {
                line.push_str(&token.text);
            }
        }
        Ok(line)
    }

    /// Reads one line from the reader and stores it into the named variable,
    /// which resolves through the scope chain like any other reference.
    fn read_input(&mut self, tree: &mut ExecutionTree, id: NodeId) -> Result<(), RuntimeError> {
        let NodeKind::Input { name } = &tree.node(id).kind else {
            unreachable!("input instruction points at an input node");
        };
        let name = name.clone();
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(|err| RuntimeError::Input {
                message: err.to_string(),
            })?;
        let value = line.trim_end_matches(['\n', '\r']).to_string();
        let kind = kind_of(&value);

        let table = tree
            .resolve_table(id, &name)
            .ok_or_else(|| RuntimeError::UnknownVariable { name: name.clone() })?;
        tree.table_mut(table).modify_entry(&name, value, kind)
    }
}

fn index_labels(instructions: &[Instruction]) -> FxHashMap<&str, usize> {
    instructions
        .iter()
        .enumerate()
        .filter_map(|(index, instruction)| match instruction {
            Instruction::Label { name } => Some((name.as_str(), index)),
            _ => None,
        })
        .collect()
}

fn jump_target(labels: &FxHashMap<&str, usize>, label: &str) -> Result<usize, RuntimeError> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| RuntimeError::UndefinedLabel {
            label: label.to_string(),
        })
}

fn lookup<'t>(
    tree: &'t ExecutionTree,
    from: NodeId,
    name: &str,
) -> Result<&'t SymbolEntry, RuntimeError> {
    let table = tree
        .resolve_table(from, name)
        .ok_or_else(|| RuntimeError::UnknownVariable {
            name: name.to_string(),
        })?;
    tree.table(table)
        .get_entry(name)
        .ok_or_else(|| RuntimeError::UnknownVariable {
            name: name.to_string(),
        })
}

/// Rebuilds an expression with every identifier replaced by its stored
/// value. String-kinded values are re-quoted so they survive another
/// tokenization as a single string literal.
fn substitute(tree: &ExecutionTree, from: NodeId, expression: &str) -> Result<String, RuntimeError> {
    let mut resolved = String::new();
    for token in tokenize_fragment(expression) {
        if token.kind == TokenKind::Identifier {
            let entry = lookup(tree, from, &token.text)?;
            if entry.kind == SymbolKind::String {
                resolved.push('"');
                resolved.push_str(&entry.value);
                resolved.push('"');
            } else {
                resolved.push_str(&entry.value);
            }
        } else {
            resolved.push_str(&token.text);
        }
    }
    Ok(resolved)
}

fn evaluate_condition(
    tree: &ExecutionTree,
    from: NodeId,
    condition: &str,
) -> Result<bool, RuntimeError> {
    let resolved = substitute(tree, from, condition)?;
    Ok(evaluate(&resolved)?.is_truthy())
}

fn execute_assignment(tree: &mut ExecutionTree, id: NodeId) -> Result<(), RuntimeError> {
    let NodeKind::Assign {
        name,
        op,
        expr,
        table,
    } = &tree.node(id).kind
    else {
        unreachable!("assign instruction points at an assign node");
    };
    let name = name.clone();
    let op = *op;
    let expr = expr.clone();

    // Compile-time resolution always populated the binding; re-resolve only
    // as a fallback so a stale tree cannot cause a store into the void.
    let table = match *table {
        Some(table) => table,
        None => tree
            .resolve_table(id, &name)
            .ok_or_else(|| RuntimeError::UnknownVariable { name: name.clone() })?,
    };

    let (value, kind) = evaluate_rhs(tree, id, &expr)?;

    if op == AssignOp::Set {
        return tree.table_mut(table).modify_entry(&name, value, kind);
    }
    compound_store(tree, table, &name, op, &value, &expr)
}

/// Evaluates the right-hand side of an assignment.
///
/// A single identifier copies the source variable's value and kind; a single
/// literal stores as-is. Anything longer is substituted and evaluated.
fn evaluate_rhs(
    tree: &ExecutionTree,
    from: NodeId,
    expr: &str,
) -> Result<(String, SymbolKind), RuntimeError> {
    let tokens: Vec<_> = tokenize_fragment(expr)
        .into_iter()
        .filter(|token| token.kind != TokenKind::Space)
        .collect();

    if let [token] = tokens.as_slice() {
        return match token.kind {
            TokenKind::Identifier => {
                let entry = lookup(tree, from, &token.text)?;
                Ok((entry.value.clone(), entry.kind))
            }
            TokenKind::String => Ok((strip_quotes(&token.text), SymbolKind::String)),
            TokenKind::Number => Ok((token.text.clone(), SymbolKind::Number)),
            _ => Ok((token.text.clone(), kind_of(&token.text))),
        };
    }

    let resolved = substitute(tree, from, expr)?;
    let value = evaluate(&resolved)?;
    let kind = match value {
        Value::Number(_) => SymbolKind::Number,
        Value::Bool(_) | Value::Str(_) => SymbolKind::String,
    };
    Ok((value.to_output(), kind))
}

/// `+=`, `-=`, `*=`, `/=` coerce both sides to numbers and store the result
/// back through the cached table binding.
fn compound_store(
    tree: &mut ExecutionTree,
    table: TableId,
    name: &str,
    op: AssignOp,
    value: &str,
    expr: &str,
) -> Result<(), RuntimeError> {
    let entry = tree
        .table(table)
        .get_entry(name)
        .ok_or_else(|| RuntimeError::UnknownVariable {
            name: name.to_string(),
        })?;
    let old = as_number(&entry.value)?;
    let rhs = as_number(value)?;
    let result = match op {
        AssignOp::Add => old + rhs,
        AssignOp::Sub => old - rhs,
        AssignOp::Mul => old * rhs,
        AssignOp::Div => {
            if rhs == 0.0 {
                return Err(RuntimeError::ExpressionEvaluation {
                    expression: expr.to_string(),
                });
            }
            old / rhs
        }
        AssignOp::Set => unreachable!("plain assignment handled by the caller"),
    };
    tree.table_mut(table).modify_entry(
        name,
        Value::Number(result).to_output(),
        SymbolKind::Number,
    )
}

fn as_number(value: &str) -> Result<f64, RuntimeError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| RuntimeError::NotANumber {
            value: value.to_string(),
        })
}

fn kind_of(value: &str) -> SymbolKind {
    if value.trim().parse::<f64>().is_ok() {
        SymbolKind::Number
    } else {
        SymbolKind::String
    }
}

fn strip_quotes(text: &str) -> String {
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;
    use crate::compiler::compile;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use indoc::indoc;

    fn run(source: &str) -> Result<String, RuntimeError> {
        run_with_stdin(source, "")
    }

    fn run_with_stdin(source: &str, stdin: &str) -> Result<String, RuntimeError> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let statements = parse(&tokens).expect("parse should succeed");
        let mut tree = compile(&statements).expect("compile should succeed");
        let instructions = generate(&tree);
        let mut executor = Executor::new(stdin.as_bytes());
        executor.execute(&instructions, &mut tree)
    }

    #[test]
    fn echoes_with_interpolation() {
        let output = run(indoc! {r#"
            x = 10
            y = 20
            echo "x is {x} and y is {y}"
        "#})
        .expect("program should run");
        assert_eq!(output, "x is 10 and y is 20");
    }

    #[test]
    fn assignment_copies_value_and_kind() {
        let output = run(indoc! {r#"
            source = "hello"
            copy = source
            echo "{copy}"
        "#})
        .expect("program should run");
        assert_eq!(output, "hello");
    }

    #[test]
    fn multi_token_assignment_evaluates() {
        let output = run(indoc! {r#"
            x = (10 + 2) / 6
            echo "{x}"
        "#})
        .expect("program should run");
        assert_eq!(output, "2");
    }

    #[test]
    fn conditionals_pick_the_matching_branch() {
        let output = run(indoc! {r#"
            x = 2
            if (x == 1)
                echo "one"
            elif (x == 2)
                echo "two"
            else
                echo "many"
            fi
        "#})
        .expect("program should run");
        assert_eq!(output, "two");
    }

    #[test]
    fn while_loop_counts() {
        let output = run(indoc! {r#"
            x = 0
            while (x < 3)
                echo "{x}"
                x += 1
            endwhile
        "#})
        .expect("program should run");
        assert_eq!(output, "0\n1\n2");
    }

    #[test]
    fn for_loop_counts() {
        let output = run(indoc! {r#"
            for (i = 0; i < 3; i += 1)
                echo "{i}"
            endfor
        "#})
        .expect("program should run");
        assert_eq!(output, "0\n1\n2");
    }

    #[test]
    fn break_exits_the_loop_early() {
        let output = run(indoc! {r#"
            x = 0
            while (x < 10)
                if (x == 3)
                    break
                fi
                echo "{x}"
                x += 1
            endwhile
        "#})
        .expect("program should run");
        assert_eq!(output, "0\n1\n2");
    }

    #[test]
    fn continue_in_a_for_loop_still_increments() {
        let output = run(indoc! {r#"
            for (i = 0; i < 5; i += 1)
                if (i == 2)
                    continue
                fi
                echo "{i}"
            endfor
        "#})
        .expect("program should run");
        assert_eq!(output, "0\n1\n3\n4");
    }

    #[test]
    fn inner_assignment_updates_the_outer_binding() {
        let output = run(indoc! {r#"
            total = 0
            for (i = 0; i < 4; i += 1)
                total += i
            endfor
            echo "{total}"
        "#})
        .expect("program should run");
        assert_eq!(output, "6");
    }

    #[test]
    fn input_reads_from_the_supplied_reader() {
        let output = run_with_stdin(
            indoc! {r#"
                name = ""
                input name
                echo "hello {name}"
            "#},
            "world\n",
        )
        .expect("program should run");
        assert_eq!(output, "hello world");
    }

    #[test]
    fn string_variables_compare_in_conditions() {
        let output = run_with_stdin(
            indoc! {r#"
                answer = ""
                input answer
                if (answer == "yes")
                    echo "agreed"
                else
                    echo "declined"
                fi
            "#},
            "yes\n",
        )
        .expect("program should run");
        assert_eq!(output, "agreed");
    }

    #[test]
    fn unknown_variable_in_echo_fails() {
        let err = run("echo \"{missing}\"\n").expect_err("expected failure");
        assert_eq!(
            err,
            RuntimeError::UnknownVariable {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn compound_assignment_on_text_fails() {
        let err = run(indoc! {r#"
            x = "word"
            x += 1
        "#})
        .expect_err("expected failure");
        assert_eq!(
            err,
            RuntimeError::NotANumber {
                value: "word".to_string()
            }
        );
    }

    #[test]
    fn numeric_string_condition_is_falsy_at_zero() {
        let output = run(indoc! {r#"
            x = 3
            while x
                echo "{x}"
                x -= 1
            endwhile
        "#})
        .expect("program should run");
        assert_eq!(output, "3\n2\n1");
    }

    #[test]
    fn fibonacci() {
        let output = run(indoc! {r#"
            a = 0
            b = 1
            count = 0
            while (count < 7)
                echo "{a}"
                next = a + b
                a = b
                b = next
                count += 1
            endwhile
        "#})
        .expect("program should run");
        assert_eq!(output, "0\n1\n1\n2\n3\n5\n8");
    }
}
