//! Scope and type checking over the lowered tree.
//!
//! The analyzer walks the AST once, building a symbol table keyed by
//! name with one entry per declaration. Scope IDs come from a counter
//! that only ever grows, so sibling blocks get distinct IDs and the
//! table stays meaningful after the walk for reporting.

use crate::ast::{BinaryOp, Node, NodeKind, TypeName};
use crate::diag::Log;
use crate::error::Position;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SemanticErrorKind {
    #[error("Redeclaration of '{0}' in the same scope")]
    Redeclaration(String),
    #[error("Assignment to undeclared variable '{0}'")]
    AssignUndeclared(String),
    #[error("Undefined variable '{0}' in expression")]
    UndefinedInExpression(String),
    #[error("Undefined variable '{0}'")]
    Undefined(String),
    #[error("Type mismatch in assignment: Cannot assign {rhs} to {lhs}")]
    AssignmentMismatch { lhs: TypeName, rhs: TypeName },
    #[error("Invalid operand types for '+': {lhs} and {rhs}")]
    InvalidOperands { lhs: TypeName, rhs: TypeName },
    #[error("Cannot compare {lhs} with {rhs}")]
    CompareMismatch { lhs: TypeName, rhs: TypeName },
    #[error("{construct} condition must be boolean, got {found}")]
    NonBooleanCondition {
        construct: &'static str,
        found: TypeName,
    },
    #[error("Cannot analyze: no AST was produced")]
    MissingAst,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: String,
    pub ty: TypeName,
    pub scope: u32,
    pub position: Position,
    pub initialized: bool,
    pub used: bool,
}

/// Name → every declaration of that name, one entry per scope it was
/// declared in. Lookup resolves through the live scope chain; exited
/// scopes keep their entries but stop being visible.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Vec<SymbolEntry>>,
}

impl SymbolTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn declarations_of(&self, name: &str) -> &[SymbolEntry] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn insert(&mut self, entry: SymbolEntry) {
        self.entries.entry(entry.name.clone()).or_default().push(entry);
    }

    /// Innermost visible declaration of `name` under the given scope
    /// chain.
    fn resolve_mut(&mut self, name: &str, scope_stack: &[u32]) -> Option<&mut SymbolEntry> {
        let list = self.entries.get_mut(name)?;
        for &scope in scope_stack.iter().rev() {
            if let Some(index) = list.iter().position(|e| e.scope == scope) {
                return list.get_mut(index);
            }
        }
        None
    }

    fn resolve(&self, name: &str, scope_stack: &[u32]) -> Option<&SymbolEntry> {
        let list = self.entries.get(name)?;
        scope_stack
            .iter()
            .rev()
            .find_map(|&scope| list.iter().find(|e| e.scope == scope))
    }

    /// All entries sorted by (scope, line), the order the table prints
    /// in.
    pub fn rows(&self) -> Vec<&SymbolEntry> {
        let mut rows: Vec<_> = self.entries.values().flatten().collect();
        rows.sort_by_key(|e| (e.scope, e.position.line, e.position.col));
        rows
    }

    /// Tabular dump with one row per declaration.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<8}{:<9}{:<7}{:<7}{:<7}{}\n",
            "Name", "Type", "Init", "Used", "Scope", "Line"
        ));
        for entry in self.rows() {
            out.push_str(&format!(
                "{:<8}{:<9}{:<7}{:<7}{:<7}{}\n",
                entry.name,
                entry.ty.to_string(),
                entry.initialized,
                entry.used,
                entry.scope,
                entry.position.line
            ));
        }
        out
    }
}

impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub struct Analysis {
    pub table: SymbolTable,
    pub log: Log,
    pub ast: Option<Node>,
}

/// Runs the full semantic pass. On any error the returned table is
/// empty; warnings leave it intact.
pub fn analyze(ast: Option<Node>) -> Analysis {
    let mut analyzer = Analyzer::new();
    match &ast {
        None => analyzer
            .log
            .error(SemanticErrorKind::MissingAst.to_string()),
        Some(node) => analyzer.check_program(node),
    }

    let errored = analyzer.log.has_errors();
    analyzer.log.info(if errored {
        "Semantic Analysis completed with errors"
    } else {
        "Semantic Analysis completed without errors"
    });

    Analysis {
        table: if errored {
            SymbolTable::default()
        } else {
            analyzer.table
        },
        log: analyzer.log,
        ast,
    }
}

struct Analyzer {
    table: SymbolTable,
    scope_stack: Vec<u32>,
    scope_counter: u32,
    log: Log,
    // names with an error recorded against them; the unused sweep
    // skips these to avoid piling warnings onto broken declarations
    flagged: HashSet<String>,
}

impl Analyzer {
    fn new() -> Self {
        Self {
            table: SymbolTable::default(),
            // scope 0 is a sentinel no block ever gets
            scope_stack: vec![0],
            scope_counter: 0,
            log: Log::new(),
            flagged: HashSet::new(),
        }
    }

    fn check_program(&mut self, node: &Node) {
        if let NodeKind::Program { body } = &node.kind {
            // the program node itself opens no scope; its block does
            self.check_block(body);
        }
    }

    fn check_block(&mut self, node: &Node) {
        let NodeKind::Block { statements } = &node.kind else {
            return;
        };
        self.scope_counter += 1;
        let scope = self.scope_counter;
        self.scope_stack.push(scope);
        for statement in statements {
            self.check_statement(statement);
        }
        self.sweep_unused(scope);
        self.scope_stack.pop();
    }

    fn check_statement(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::VarDecl { var_type, name } => self.declare(name, *var_type, node.position),
            NodeKind::Assign { target, value } => self.check_assignment(target, value),
            NodeKind::Print { expr } => {
                // any well-typed expression is printable
                self.type_of(expr);
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition, "if");
                self.check_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_block(else_branch);
                }
            }
            NodeKind::While { condition, body } => {
                self.check_condition(condition, "while");
                self.check_block(body);
            }
            NodeKind::Block { .. } => self.check_block(node),
            // a bare expression statement: checked for its side effects
            // on the table (identifier uses), value discarded
            _ => {
                self.type_of(node);
            }
        }
    }

    fn declare(&mut self, name: &str, ty: TypeName, position: Position) {
        let scope = self.current_scope();
        let already_there = self
            .table
            .declarations_of(name)
            .iter()
            .any(|e| e.scope == scope);
        if already_there {
            self.report(SemanticErrorKind::Redeclaration(name.to_string()), position);
            self.flagged.insert(name.to_string());
            return;
        }
        self.table.insert(SymbolEntry {
            name: name.to_string(),
            ty,
            scope,
            position,
            initialized: false,
            used: false,
        });
    }

    fn check_assignment(&mut self, target: &Node, value: &Node) {
        let NodeKind::Identifier { name } = &target.kind else {
            return;
        };

        let target_type = self
            .table
            .resolve(name, &self.scope_stack)
            .map(|entry| entry.ty);
        if target_type.is_none() {
            self.report(
                SemanticErrorKind::AssignUndeclared(name.clone()),
                target.position,
            );
            self.flagged.insert(name.clone());
        }

        // a direct identifier value gets the in-expression wording;
        // anything deeper reports through type_of
        let value_type = match &value.kind {
            NodeKind::Identifier { name: value_name } => {
                match self.table.resolve_mut(value_name, &self.scope_stack) {
                    Some(entry) => {
                        entry.used = true;
                        Some(entry.ty)
                    }
                    None => {
                        self.report(
                            SemanticErrorKind::UndefinedInExpression(value_name.clone()),
                            value.position,
                        );
                        self.flagged.insert(value_name.clone());
                        None
                    }
                }
            }
            _ => self.type_of(value),
        };

        if let Some(entry) = self.table.resolve_mut(name, &self.scope_stack) {
            entry.initialized = true;
            let lhs = entry.ty;
            if let Some(rhs) = value_type {
                if rhs != lhs {
                    self.report(
                        SemanticErrorKind::AssignmentMismatch { lhs, rhs },
                        target.position,
                    );
                    self.flagged.insert(name.clone());
                }
            }
        }
    }

    fn check_condition(&mut self, condition: &Node, construct: &'static str) {
        if let Some(found) = self.type_of(condition) {
            if found != TypeName::Boolean {
                self.report(
                    SemanticErrorKind::NonBooleanCondition { construct, found },
                    condition.position,
                );
            }
        }
    }

    /// Infers the type of an expression, marking identifier uses along
    /// the way. `None` means a diagnosis was already recorded below.
    fn type_of(&mut self, node: &Node) -> Option<TypeName> {
        match &node.kind {
            NodeKind::IntLiteral { .. } => Some(TypeName::Int),
            NodeKind::StringLiteral { .. } => Some(TypeName::String),
            NodeKind::BoolLiteral { .. } => Some(TypeName::Boolean),
            NodeKind::Identifier { name } => {
                match self.table.resolve_mut(name, &self.scope_stack) {
                    Some(entry) => {
                        entry.used = true;
                        Some(entry.ty)
                    }
                    None => {
                        self.report(SemanticErrorKind::Undefined(name.clone()), node.position);
                        self.flagged.insert(name.clone());
                        None
                    }
                }
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let left = self.type_of(lhs);
                let right = self.type_of(rhs);
                match op {
                    BinaryOp::Add => match (left, right) {
                        (Some(TypeName::Int), Some(TypeName::Int)) => Some(TypeName::Int),
                        (Some(TypeName::String), Some(TypeName::String)) => Some(TypeName::String),
                        (Some(l), Some(r)) => {
                            self.report(
                                SemanticErrorKind::InvalidOperands { lhs: l, rhs: r },
                                node.position,
                            );
                            // left type for recovery
                            Some(l)
                        }
                        _ => left,
                    },
                    BinaryOp::Equals | BinaryOp::NotEquals => {
                        if let (Some(l), Some(r)) = (left, right) {
                            if l != r {
                                self.report(
                                    SemanticErrorKind::CompareMismatch { lhs: l, rhs: r },
                                    node.position,
                                );
                            }
                        }
                        Some(TypeName::Boolean)
                    }
                }
            }
            _ => None,
        }
    }

    fn sweep_unused(&mut self, scope: u32) {
        let mut unused: Vec<(String, Position, bool)> = self
            .table
            .entries
            .values()
            .flatten()
            .filter(|e| e.scope == scope && !e.used && !self.flagged.contains(&e.name))
            .map(|e| (e.name.clone(), e.position, e.initialized))
            .collect();
        unused.sort_by_key(|(_, position, _)| *position);

        for (name, position, initialized) in unused {
            self.log.warning_at(
                format!("Variable '{}' declared but never used", name),
                position,
            );
            if initialized {
                self.log.warning_at(
                    format!("Variable '{}' initialized but never used", name),
                    position,
                );
            }
        }
    }

    fn current_scope(&self) -> u32 {
        self.scope_stack.last().copied().unwrap_or(0)
    }

    fn report(&mut self, kind: SemanticErrorKind, position: Position) {
        self.log.error_at(kind.to_string(), position);
    }
}
