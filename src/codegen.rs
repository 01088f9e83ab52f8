use crate::compiler::{ExecutionTree, NodeId, NodeKind};

/// Flat program form executed by the interpreter loop. Every control
/// construct is lowered to labels and jumps; leaf instructions keep a handle
/// into the execution tree so the executor can resolve scoped names.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Label { name: String },
    Echo { node: NodeId },
    Input { node: NodeId },
    Assign { node: NodeId },
    Goto { label: String },
    /// Falls through when the condition holds, jumps to `label` otherwise.
    JumpIfNot {
        label: String,
        condition: String,
        node: NodeId,
    },
}

/// Lowers an execution tree to a flat instruction list. Infallible: the
/// tree builder already validated structure, so a malformed tree here is a
/// programming error.
pub fn generate(tree: &ExecutionTree) -> Vec<Instruction> {
    let mut generator = Generator::new(tree);
    generator.lower_block(tree.root());
    generator.instructions
}

struct Generator<'a> {
    tree: &'a ExecutionTree,
    instructions: Vec<Instruction>,
    label_counter: usize,
    /// Jump targets for `continue`, innermost loop last. For `while` this is
    /// the condition re-check; for `for` it is the label placed just before
    /// the increment.
    loop_start_labels: Vec<String>,
    /// Jump targets for `break`, innermost loop last.
    loop_end_labels: Vec<String>,
}

impl<'a> Generator<'a> {
    fn new(tree: &'a ExecutionTree) -> Self {
        Self {
            tree,
            instructions: Vec::new(),
            label_counter: 0,
            loop_start_labels: Vec::new(),
            loop_end_labels: Vec::new(),
        }
    }

    fn new_label(&mut self) -> String {
        self.label_counter += 1;
        format!("Label_{}", self.label_counter)
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn lower_block(&mut self, body: &[NodeId]) {
        for id in body {
            self.lower_node(*id);
        }
    }

    fn lower_node(&mut self, id: NodeId) {
        match &self.tree.node(id).kind {
            NodeKind::Echo { .. } => self.emit(Instruction::Echo { node: id }),
            NodeKind::Input { .. } => self.emit(Instruction::Input { node: id }),
            NodeKind::Assign { .. } => self.emit(Instruction::Assign { node: id }),
            NodeKind::Break => {
                let label = self
                    .loop_end_labels
                    .last()
                    .cloned()
                    .expect("break validated against an enclosing loop");
                self.emit(Instruction::Goto { label });
            }
            NodeKind::Continue => {
                let label = self
                    .loop_start_labels
                    .last()
                    .cloned()
                    .expect("continue validated against an enclosing loop");
                self.emit(Instruction::Goto { label });
            }
            NodeKind::While { condition, body, .. } => {
                self.lower_while(id, condition.clone(), body.clone());
            }
            NodeKind::For { condition, body, .. } => {
                self.lower_for(id, condition.clone(), body.clone());
            }
            NodeKind::Conditional {
                if_branch,
                elif_branches,
                else_branch,
            } => {
                self.lower_conditional(*if_branch, elif_branches.clone(), *else_branch);
            }
            NodeKind::If { .. } | NodeKind::ElseIf { .. } | NodeKind::Else { .. } => {
                unreachable!("branches are lowered through their aggregate")
            }
        }
    }

    /// start:
    ///   jump_if_not cond -> end
    ///   <body>
    ///   goto start
    /// end:
    fn lower_while(&mut self, id: NodeId, condition: String, body: Vec<NodeId>) {
        let start = self.new_label();
        self.emit(Instruction::Label {
            name: start.clone(),
        });
        self.loop_start_labels.push(start.clone());

        let end = self.new_label();
        self.loop_end_labels.push(end.clone());
        self.emit(Instruction::JumpIfNot {
            label: end.clone(),
            condition,
            node: id,
        });

        self.lower_block(&body);

        self.loop_start_labels.pop();
        self.loop_end_labels.pop();
        self.emit(Instruction::Goto { label: start });
        self.emit(Instruction::Label { name: end });
    }

    /// Same as `while`, except `continue` must still run the increment, so
    /// its target label is inserted just before the final body instruction
    /// (the increment the tree builder appended).
    fn lower_for(&mut self, id: NodeId, condition: String, body: Vec<NodeId>) {
        let start = self.new_label();
        self.emit(Instruction::Label {
            name: start.clone(),
        });
        let before_increment = self.new_label();
        self.loop_start_labels.push(before_increment.clone());

        let end = self.new_label();
        self.loop_end_labels.push(end.clone());
        self.emit(Instruction::JumpIfNot {
            label: end.clone(),
            condition,
            node: id,
        });

        self.lower_block(&body);
        let increment_at = self.instructions.len() - 1;
        self.instructions.insert(
            increment_at,
            Instruction::Label {
                name: before_increment,
            },
        );

        self.loop_start_labels.pop();
        self.loop_end_labels.pop();
        self.emit(Instruction::Goto { label: start });
        self.emit(Instruction::Label { name: end });
    }

    /// Each branch gets a skip label; every taken branch jumps to the shared
    /// end label. The `else` body, when present, falls through last.
    fn lower_conditional(
        &mut self,
        if_branch: NodeId,
        elif_branches: Vec<NodeId>,
        else_branch: Option<NodeId>,
    ) {
        let end = self.new_label();

        for branch in std::iter::once(if_branch).chain(elif_branches) {
            let (condition, body) = match &self.tree.node(branch).kind {
                NodeKind::If { condition, body, .. }
                | NodeKind::ElseIf { condition, body, .. } => (condition.clone(), body.clone()),
                _ => unreachable!("conditional branches are if or elif nodes"),
            };
            let skip = self.new_label();
            self.emit(Instruction::JumpIfNot {
                label: skip.clone(),
                condition,
                node: branch,
            });
            self.lower_block(&body);
            self.emit(Instruction::Goto { label: end.clone() });
            self.emit(Instruction::Label { name: skip });
        }

        if let Some(branch) = else_branch {
            let NodeKind::Else { body, .. } = &self.tree.node(branch).kind else {
                unreachable!("else branch is an else node");
            };
            self.lower_block(&body.clone());
        }

        self.emit(Instruction::Label { name: end });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use indoc::indoc;

    fn lower(source: &str) -> (ExecutionTree, Vec<Instruction>) {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let statements = parse(&tokens).expect("parse should succeed");
        let tree = compile(&statements).expect("compile should succeed");
        let instructions = generate(&tree);
        (tree, instructions)
    }

    fn labels(instructions: &[Instruction]) -> Vec<&str> {
        instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Label { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn straight_line_programs_lower_without_labels() {
        let (_, instructions) = lower("x = 1\necho \"{x}\"\n");
        assert!(matches!(instructions[0], Instruction::Assign { .. }));
        assert!(matches!(instructions[1], Instruction::Echo { .. }));
        assert_eq!(instructions.len(), 2);
    }

    #[test]
    fn label_names_are_unique() {
        let (_, instructions) = lower(indoc! {r#"
            x = 0
            while (x < 2)
                if (x == 1)
                    echo "one"
                fi
                x += 1
            endwhile
            for (i = 0; i < 2; i += 1)
                echo "{i}"
            endfor
        "#});
        let mut names = labels(&instructions);
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn while_loop_shape() {
        let (_, instructions) = lower(indoc! {r#"
            x = 0
            while (x < 3)
                x += 1
            endwhile
        "#});
        // assign, start label, jump-if-not end, body, goto start, end label
        assert!(matches!(instructions[0], Instruction::Assign { .. }));
        let Instruction::Label { name: start } = &instructions[1] else {
            panic!("expected loop start label");
        };
        let Instruction::JumpIfNot { label: end, .. } = &instructions[2] else {
            panic!("expected loop exit jump");
        };
        assert!(matches!(instructions[3], Instruction::Assign { .. }));
        assert_eq!(
            instructions[4],
            Instruction::Goto {
                label: start.clone()
            }
        );
        assert_eq!(instructions[5], Instruction::Label { name: end.clone() });
        assert_eq!(instructions.len(), 6);
    }

    #[test]
    fn for_loop_places_continue_label_before_the_increment() {
        let (_, instructions) = lower(indoc! {r#"
            for (i = 0; i < 5; i += 1)
                if (i == 2)
                    continue
                fi
                echo "{i}"
            endfor
        "#});
        // The label just before the final Assign (the increment) must match
        // the Goto emitted for continue.
        let increment_label = instructions
            .iter()
            .rev()
            .skip_while(|i| !matches!(i, Instruction::Assign { .. }))
            .nth(1)
            .expect("label precedes the increment");
        let Instruction::Label { name } = increment_label else {
            panic!("expected a label before the increment, got {increment_label:?}");
        };
        assert!(
            instructions
                .iter()
                .any(|i| matches!(i, Instruction::Goto { label } if label == name)),
            "continue should target the pre-increment label"
        );
    }

    #[test]
    fn break_targets_the_loop_end_label() {
        let (_, instructions) = lower(indoc! {r#"
            x = 0
            while (x < 10)
                break
            endwhile
        "#});
        let Instruction::JumpIfNot { label: end, .. } = &instructions[2] else {
            panic!("expected loop exit jump");
        };
        assert_eq!(instructions[3], Instruction::Goto { label: end.clone() });
    }

    #[test]
    fn conditional_branches_share_one_end_label() {
        let (_, instructions) = lower(indoc! {r#"
            x = 2
            if (x == 1)
                echo "one"
            elif (x == 2)
                echo "two"
            else
                echo "many"
            fi
        "#});
        let gotos: Vec<&str> = instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Goto { label } => Some(label.as_str()),
                _ => None,
            })
            .collect();
        // one goto-end per guarded branch, all targeting the same label
        assert_eq!(gotos.len(), 2);
        assert_eq!(gotos[0], gotos[1]);
        assert_eq!(
            instructions.last(),
            Some(&Instruction::Label {
                name: gotos[0].to_string()
            })
        );
    }
}
