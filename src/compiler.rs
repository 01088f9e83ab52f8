use crate::ast::{AssignOp, Statement};
use crate::error::CompileError;
use crate::parser::parse_assignment_fragment;
use crate::symbols::SymbolTable;

/// Index of a node in the execution tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// Index of a symbol table. Table 0 always belongs to the tree root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableId(usize);

pub const ROOT_TABLE: TableId = TableId(0);

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Structural parent; `None` means the tree root. Parents are indices
    /// into the same arena, so the upward scope walk needs no shared
    /// ownership.
    pub parent: Option<NodeId>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Echo {
        text: String,
    },
    Input {
        name: String,
    },
    Assign {
        name: String,
        op: AssignOp,
        expr: String,
        /// Table the name resolved to during compilation. The executor
        /// stores through this binding instead of re-walking the chain.
        table: Option<TableId>,
    },
    Break,
    Continue,
    If {
        condition: String,
        body: Vec<NodeId>,
        table: TableId,
    },
    ElseIf {
        condition: String,
        body: Vec<NodeId>,
        table: TableId,
    },
    Else {
        body: Vec<NodeId>,
        table: TableId,
    },
    While {
        condition: String,
        body: Vec<NodeId>,
        table: TableId,
    },
    For {
        condition: String,
        body: Vec<NodeId>,
        table: TableId,
    },
    /// Aggregates one `if`, its `elif` chain and an optional `else`. Owns
    /// no symbol table; the upward scope walk passes through it.
    Conditional {
        if_branch: NodeId,
        elif_branches: Vec<NodeId>,
        else_branch: Option<NodeId>,
    },
}

impl NodeKind {
    fn opener_name(&self) -> &'static str {
        match self {
            NodeKind::If { .. } => "if",
            NodeKind::ElseIf { .. } => "elif",
            NodeKind::Else { .. } => "else",
            NodeKind::While { .. } => "while",
            NodeKind::For { .. } => "for",
            _ => "block",
        }
    }
}

/// The compiled program: a nested statement tree plus one symbol table per
/// scope node, all held in flat arenas.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExecutionTree {
    nodes: Vec<Node>,
    tables: Vec<SymbolTable>,
    root: Vec<NodeId>,
}

impl ExecutionTree {
    pub fn root(&self) -> &[NodeId] {
        &self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn table(&self, id: TableId) -> &SymbolTable {
        &self.tables[id.0]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut SymbolTable {
        &mut self.tables[id.0]
    }

    /// Symbol table owned by `id`, when `id` is a scope node.
    pub fn scope_table(&self, id: NodeId) -> Option<TableId> {
        match self.node(id).kind {
            NodeKind::If { table, .. }
            | NodeKind::ElseIf { table, .. }
            | NodeKind::Else { table, .. }
            | NodeKind::While { table, .. }
            | NodeKind::For { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Finds the table owning `name`, searching outward from `from`: the
    /// node's own table first when it is a scope, then the parent chain
    /// (conditional aggregates own no table and fall through), finally the
    /// root table.
    pub fn resolve_table(&self, from: NodeId, name: &str) -> Option<TableId> {
        if let Some(table) = self.scope_table(from)
            && self.table(table).contains(name)
        {
            return Some(table);
        }
        let mut pointer = self.node(from).parent;
        while let Some(id) = pointer {
            if let Some(table) = self.scope_table(id)
                && self.table(table).contains(name)
            {
                return Some(table);
            }
            pointer = self.node(id).parent;
        }
        self.table(ROOT_TABLE).contains(name).then_some(ROOT_TABLE)
    }

    fn new_table(&mut self) -> TableId {
        self.tables.push(SymbolTable::new());
        TableId(self.tables.len() - 1)
    }

    fn add_node(&mut self, kind: NodeKind, line: usize) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            line,
        });
        NodeId(self.nodes.len() - 1)
    }

    fn body_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        match &mut self.nodes[id.0].kind {
            NodeKind::If { body, .. }
            | NodeKind::ElseIf { body, .. }
            | NodeKind::Else { body, .. }
            | NodeKind::While { body, .. }
            | NodeKind::For { body, .. } => body,
            _ => unreachable!("leaf nodes own no body"),
        }
    }
}

/// Builds the nested execution tree from the parser's flat statement list.
///
/// A shift/reduce pass over an explicit stack of open scopes reconstructs
/// block nesting; two follow-up passes assign parent links and resolve every
/// assignment target to the symbol table that owns it.
pub fn compile(statements: &[Statement]) -> Result<ExecutionTree, CompileError> {
    let mut builder = TreeBuilder::new();
    for statement in statements {
        builder.process(statement)?;
    }
    builder.finish()
}

/// Marker separating one conditional chain from enclosing scopes on the
/// build stack, so `fi` knows how far to pop.
enum StackEntry {
    Scope(NodeId),
    IfBoundary { line: usize },
}

struct TreeBuilder {
    tree: ExecutionTree,
    stack: Vec<StackEntry>,
    /// Increment fragments of the `for` loops currently open, innermost
    /// last. Each is re-attached as the final body statement when its
    /// `endfor` arrives.
    pending_increments: Vec<String>,
}

impl TreeBuilder {
    fn new() -> Self {
        let mut tree = ExecutionTree::default();
        tree.new_table(); // root table
        Self {
            tree,
            stack: Vec::new(),
            pending_increments: Vec::new(),
        }
    }

    fn process(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Echo { text, line } => {
                let id = self
                    .tree
                    .add_node(NodeKind::Echo { text: text.clone() }, *line);
                self.attach_leaf(id);
            }
            Statement::Input { name, line } => {
                let id = self
                    .tree
                    .add_node(NodeKind::Input { name: name.clone() }, *line);
                self.attach_leaf(id);
            }
            Statement::Assign {
                name,
                op,
                expr,
                line,
            } => {
                let id = self.add_assign(name.clone(), *op, expr.clone(), *line);
                self.attach_leaf(id);
            }
            Statement::Break { line } => {
                self.require_enclosing_loop("break", *line)?;
                let id = self.tree.add_node(NodeKind::Break, *line);
                self.attach_leaf(id);
            }
            Statement::Continue { line } => {
                self.require_enclosing_loop("continue", *line)?;
                let id = self.tree.add_node(NodeKind::Continue, *line);
                self.attach_leaf(id);
            }
            Statement::If { condition, line } => {
                self.stack.push(StackEntry::IfBoundary { line: *line });
                let table = self.tree.new_table();
                let id = self.tree.add_node(
                    NodeKind::If {
                        condition: condition.clone(),
                        body: Vec::new(),
                        table,
                    },
                    *line,
                );
                self.stack.push(StackEntry::Scope(id));
            }
            Statement::ElseIf { condition, line } => {
                let table = self.tree.new_table();
                let id = self.tree.add_node(
                    NodeKind::ElseIf {
                        condition: condition.clone(),
                        body: Vec::new(),
                        table,
                    },
                    *line,
                );
                self.stack.push(StackEntry::Scope(id));
            }
            Statement::Else { line } => {
                let table = self.tree.new_table();
                let id = self.tree.add_node(
                    NodeKind::Else {
                        body: Vec::new(),
                        table,
                    },
                    *line,
                );
                self.stack.push(StackEntry::Scope(id));
            }
            Statement::While { condition, line } => {
                let table = self.tree.new_table();
                let id = self.tree.add_node(
                    NodeKind::While {
                        condition: condition.clone(),
                        body: Vec::new(),
                        table,
                    },
                    *line,
                );
                self.stack.push(StackEntry::Scope(id));
            }
            Statement::For {
                init,
                condition,
                increment,
                line,
            } => {
                // The initializer runs once, outside the loop body, so it
                // becomes a sibling attached before the loop node opens.
                let (name, op, expr) = parse_assignment_fragment(init, *line)?;
                let init_id = self.add_assign(name, op, expr, *line);
                self.attach_leaf(init_id);

                let table = self.tree.new_table();
                let id = self.tree.add_node(
                    NodeKind::For {
                        condition: condition.clone(),
                        body: Vec::new(),
                        table,
                    },
                    *line,
                );
                self.stack.push(StackEntry::Scope(id));
                self.pending_increments.push(increment.clone());
            }
            Statement::EndWhile { line } => {
                let id = self.pop_scope("endwhile", *line)?;
                if !matches!(self.tree.node(id).kind, NodeKind::While { .. }) {
                    return Err(CompileError::UnmatchedCloser {
                        closer: "endwhile",
                        line: *line,
                    });
                }
                self.attach_leaf(id);
            }
            Statement::EndFor { line } => {
                let id = self.pop_scope("endfor", *line)?;
                if !matches!(self.tree.node(id).kind, NodeKind::For { .. }) {
                    return Err(CompileError::UnmatchedCloser {
                        closer: "endfor",
                        line: *line,
                    });
                }
                // The increment re-executes on every iteration: it becomes
                // the final statement of the loop body.
                let increment = self
                    .pending_increments
                    .pop()
                    .expect("every open for loop recorded its increment");
                let (name, op, expr) = parse_assignment_fragment(&increment, *line)?;
                let increment_id = self.add_assign(name, op, expr, *line);
                self.tree.body_mut(id).push(increment_id);
                self.attach_leaf(id);
            }
            Statement::EndIf { line } => {
                self.reduce_conditional(*line)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ExecutionTree, CompileError> {
        if let Some(entry) = self.stack.last() {
            let (opener, line) = match entry {
                StackEntry::Scope(id) => {
                    let node = self.tree.node(*id);
                    (node.kind.opener_name(), node.line)
                }
                StackEntry::IfBoundary { line } => ("if", *line),
            };
            return Err(CompileError::UnterminatedBlock { opener, line });
        }

        for id in self.tree.root.clone() {
            self.assign_parents(id, None);
        }
        for id in self.tree.root.clone() {
            self.resolve_symbols(id, true);
        }
        Ok(self.tree)
    }

    fn add_assign(&mut self, name: String, op: AssignOp, expr: String, line: usize) -> NodeId {
        self.tree.add_node(
            NodeKind::Assign {
                name,
                op,
                expr,
                table: None,
            },
            line,
        )
    }

    /// Appends a completed node to the innermost open scope, or to the tree
    /// root when no scope is open.
    fn attach_leaf(&mut self, id: NodeId) {
        match self.stack.last() {
            Some(StackEntry::Scope(top)) => {
                let top = *top;
                self.tree.body_mut(top).push(id);
            }
            _ => self.tree.root.push(id),
        }
    }

    fn pop_scope(&mut self, closer: &'static str, line: usize) -> Result<NodeId, CompileError> {
        match self.stack.pop() {
            Some(StackEntry::Scope(id)) => Ok(id),
            _ => Err(CompileError::UnmatchedCloser { closer, line }),
        }
    }

    /// `break`/`continue` must sit inside at least one open loop scope.
    fn require_enclosing_loop(
        &self,
        keyword: &'static str,
        line: usize,
    ) -> Result<(), CompileError> {
        let enclosed = self.stack.iter().rev().any(|entry| {
            matches!(
                entry,
                StackEntry::Scope(id)
                    if matches!(
                        self.tree.node(*id).kind,
                        NodeKind::While { .. } | NodeKind::For { .. }
                    )
            )
        });
        if enclosed {
            Ok(())
        } else {
            Err(CompileError::NoEnclosingLoop { keyword, line })
        }
    }

    /// Pops the `if`/`elif`/`else` chain down to its boundary marker and
    /// reduces it to one `Conditional` aggregate attached as a leaf.
    fn reduce_conditional(&mut self, line: usize) -> Result<(), CompileError> {
        let mut branches = Vec::new();
        loop {
            match self.stack.pop() {
                Some(StackEntry::Scope(id)) => branches.push(id),
                Some(StackEntry::IfBoundary { .. }) => break,
                None => {
                    return Err(CompileError::UnmatchedCloser { closer: "fi", line });
                }
            }
        }
        branches.reverse(); // back to source order

        let mut iter = branches.into_iter();
        let if_branch = match iter.next() {
            Some(id) if matches!(self.tree.node(id).kind, NodeKind::If { .. }) => id,
            _ => {
                return Err(CompileError::MissingIfBranch { found: "fi", line });
            }
        };
        let mut elif_branches = Vec::new();
        let mut else_branch = None;
        for id in iter {
            match self.tree.node(id).kind {
                NodeKind::ElseIf { .. } if else_branch.is_none() => elif_branches.push(id),
                NodeKind::Else { .. } if else_branch.is_none() => else_branch = Some(id),
                _ => {
                    return Err(CompileError::MissingIfBranch {
                        found: self.tree.node(id).kind.opener_name(),
                        line,
                    });
                }
            }
        }

        let conditional = self.tree.add_node(
            NodeKind::Conditional {
                if_branch,
                elif_branches,
                else_branch,
            },
            line,
        );
        self.attach_leaf(conditional);
        Ok(())
    }

    /// Top-down pass wiring every child to its structural parent. The
    /// branches of a conditional point at the aggregate, which in turn
    /// points at the enclosing scope, keeping the upward walk uniform.
    fn assign_parents(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.tree.nodes[id.0].parent = parent;
        match &self.tree.node(id).kind {
            NodeKind::If { body, .. }
            | NodeKind::ElseIf { body, .. }
            | NodeKind::Else { body, .. }
            | NodeKind::While { body, .. }
            | NodeKind::For { body, .. } => {
                for child in body.clone() {
                    self.assign_parents(child, Some(id));
                }
            }
            NodeKind::Conditional {
                if_branch,
                elif_branches,
                else_branch,
            } => {
                let mut children = vec![*if_branch];
                children.extend(elif_branches.iter().copied());
                children.extend(else_branch.iter().copied());
                for child in children {
                    self.assign_parents(child, Some(id));
                }
            }
            _ => {}
        }
    }

    /// Declares every assignment target in a symbol table and caches the
    /// binding on the node.
    ///
    /// Top-level assignments always declare in the root table. A nested
    /// assignment binds to the nearest ancestor table that already owns the
    /// name; only a first-ever reference declares, and it lands in the
    /// nearest enclosing scope. An inner assignment to an outer name
    /// therefore updates the outer binding rather than shadowing it.
    fn resolve_symbols(&mut self, id: NodeId, top_level: bool) {
        match self.tree.node(id).kind.clone() {
            NodeKind::Assign { name, .. } => {
                let table = if top_level {
                    self.tree.table_mut(ROOT_TABLE).add_entry(&name, "");
                    ROOT_TABLE
                } else if let Some(found) = self.tree.resolve_table(id, &name) {
                    found
                } else {
                    let parent = self.tree.node(id).parent.expect("nested node has a parent");
                    let table = self
                        .tree
                        .scope_table(parent)
                        .expect("assignment parent is a scope node");
                    self.tree.table_mut(table).add_entry(&name, "");
                    table
                };
                if let NodeKind::Assign { table: slot, .. } = &mut self.tree.nodes[id.0].kind {
                    *slot = Some(table);
                }
            }
            NodeKind::If { body, .. }
            | NodeKind::ElseIf { body, .. }
            | NodeKind::Else { body, .. }
            | NodeKind::While { body, .. }
            | NodeKind::For { body, .. } => {
                for child in body {
                    self.resolve_symbols(child, false);
                }
            }
            NodeKind::Conditional {
                if_branch,
                elif_branches,
                else_branch,
            } => {
                self.resolve_symbols(if_branch, false);
                for branch in elif_branches {
                    self.resolve_symbols(branch, false);
                }
                if let Some(branch) = else_branch {
                    self.resolve_symbols(branch, false);
                }
            }
            _ => {}
        }
    }
}
