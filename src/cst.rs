//! The concrete syntax tree.
//!
//! Unlike the AST, this tree keeps every consumed terminal (braces,
//! parentheses, keywords, operators), one node per grammar production.

use crate::error::Position;
use crate::grammar::lexer::TokenKind;
use std::fmt;

/// An owned view of a matched token, detached from the source borrow so
/// the tree can outlive the per-sub-program compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CstToken {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CstNode {
    pub name: &'static str,
    pub token: Option<CstToken>,
    pub children: Vec<CstNode>,
}

impl CstNode {
    pub fn branch(name: &'static str) -> Self {
        Self {
            name,
            token: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(token: CstToken) -> Self {
        Self {
            name: token.kind.node_name(),
            token: Some(token),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: CstNode) {
        self.children.push(child);
    }

    pub fn is_terminal(&self) -> bool {
        self.token.is_some()
    }

    /// First child with the given production name.
    pub fn child(&self, name: &str) -> Option<&CstNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CstNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Position of this node: its own token if it is a terminal, else
    /// the first descendant token in document order.
    pub fn position(&self) -> Option<Position> {
        if let Some(token) = &self.token {
            return Some(token.position);
        }
        self.children.iter().find_map(CstNode::position)
    }

    /// Indented dump, one node per line, `: lexeme` on terminals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(self.name);
        if let Some(token) = &self.token {
            if !token.lexeme.is_empty() {
                out.push_str(" : ");
                out.push_str(&token.lexeme);
            }
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

impl fmt::Display for CstNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render())
    }
}
