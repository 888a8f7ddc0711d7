//! Projection of the concrete syntax tree into the abstract one.
//!
//! Punctuation, keywords and wrapper productions disappear here; what
//! remains is exactly what the analyzer and the code generator consume.
//! A declaration with an initializer desugars into a declaration
//! followed by an assignment, so downstream passes never see an `init`
//! field.

use crate::ast::{BinaryOp, Node, NodeKind, TypeName};
use crate::cst::CstNode;
use crate::error::Position;
use crate::grammar::lexer::{Keyword, TokenKind};

/// A missing tree stays missing; the analyzer reports that case.
pub fn lower(cst: Option<&CstNode>) -> Option<Node> {
    cst.map(lower_program)
}

fn lower_program(cst: &CstNode) -> Node {
    let position = node_position(cst);
    let body = match cst.child("Block") {
        Some(block) => lower_block(block),
        None => Node::at(NodeKind::Block { statements: Vec::new() }, position),
    };
    Node::at(
        NodeKind::Program {
            body: Box::new(body),
        },
        position,
    )
}

fn lower_block(cst: &CstNode) -> Node {
    let statements = cst
        .child("StatementList")
        .map(lower_statements)
        .unwrap_or_default();
    Node::at(NodeKind::Block { statements }, node_position(cst))
}

fn lower_statements(list: &CstNode) -> Vec<Node> {
    let mut out = Vec::new();
    for child in &list.children {
        lower_statement(child, &mut out);
    }
    out
}

fn lower_statement(cst: &CstNode, out: &mut Vec<Node>) {
    match cst.name {
        "VariableDeclaration" => lower_var_declaration(cst, out),
        "AssignmentStatement" => out.push(lower_assignment(cst)),
        "PrintStatement" => out.push(lower_print(cst)),
        "IfStatement" => out.push(lower_if(cst)),
        "WhileStatement" => out.push(lower_while(cst)),
        "Block" => out.push(lower_block(cst)),
        "ExpressionStatement" => {
            if let Some(expr) = cst.children.first() {
                out.push(lower_expression(expr));
            }
        }
        _ => unreachable!("parser emits no other statement node: {}", cst.name),
    }
}

fn lower_var_declaration(cst: &CstNode, out: &mut Vec<Node>) {
    let var_type = match cst.children.first().and_then(|c| c.token.as_ref()) {
        Some(token) if token.kind == TokenKind::Keyword(Keyword::Int) => TypeName::Int,
        Some(token) if token.kind == TokenKind::Keyword(Keyword::String) => TypeName::String,
        _ => TypeName::Boolean,
    };
    let identifier = cst.child("Identifier");
    let name = identifier
        .and_then(|c| c.token.as_ref())
        .map(|t| t.lexeme.clone())
        .unwrap_or_default();

    out.push(Node::at(
        NodeKind::VarDecl {
            var_type,
            name: name.clone(),
        },
        node_position(cst),
    ));

    // `int a = 3` is a declaration plus an assignment
    if cst.child("AssignOp").is_some() {
        if let Some(init) = cst.children.iter().rev().find(|c| !c.is_terminal()) {
            let target_position = identifier.and_then(CstNode::position).unwrap_or_default();
            out.push(Node::at(
                NodeKind::Assign {
                    target: Box::new(Node::at(NodeKind::Identifier { name }, target_position)),
                    value: Box::new(lower_expression(init)),
                },
                target_position,
            ));
        }
    }
}

fn lower_assignment(cst: &CstNode) -> Node {
    let identifier = cst.child("Identifier");
    let name = identifier
        .and_then(|c| c.token.as_ref())
        .map(|t| t.lexeme.clone())
        .unwrap_or_default();
    let position = node_position(cst);
    let value = cst
        .children
        .iter()
        .rev()
        .find(|c| !c.is_terminal())
        .map(lower_expression)
        .unwrap_or_else(|| empty_string(position));
    Node::at(
        NodeKind::Assign {
            target: Box::new(Node::at(NodeKind::Identifier { name }, position)),
            value: Box::new(value),
        },
        position,
    )
}

fn lower_print(cst: &CstNode) -> Node {
    let position = node_position(cst);
    let expr = cst
        .children
        .iter()
        .find(|c| !c.is_terminal())
        .map(lower_expression)
        .unwrap_or_else(|| empty_string(position));
    Node::at(
        NodeKind::Print {
            expr: Box::new(expr),
        },
        position,
    )
}

fn lower_if(cst: &CstNode) -> Node {
    let condition = condition_of(cst);
    let mut blocks = cst.children_named("Block");
    let then_branch = blocks
        .next()
        .map(lower_block)
        .unwrap_or_else(|| empty_block(node_position(cst)));
    // the else branch is the block that follows an ElseKeyword sibling
    let else_branch = cst
        .child("ElseKeyword")
        .and_then(|_| blocks.next())
        .map(lower_block)
        .map(Box::new);
    Node::at(
        NodeKind::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
        },
        node_position(cst),
    )
}

fn lower_while(cst: &CstNode) -> Node {
    let condition = condition_of(cst);
    let body = cst
        .child("Block")
        .map(lower_block)
        .unwrap_or_else(|| empty_block(node_position(cst)));
    Node::at(
        NodeKind::While {
            condition: Box::new(condition),
            body: Box::new(body),
        },
        node_position(cst),
    )
}

/// The parenthesized expression of an `if`/`while` header: the first
/// non-terminal child that is not the body block.
fn condition_of(cst: &CstNode) -> Node {
    cst.children
        .iter()
        .find(|c| !c.is_terminal() && c.name != "Block")
        .map(lower_expression)
        .unwrap_or_else(|| {
            Node::at(
                NodeKind::BoolLiteral { value: false },
                node_position(cst),
            )
        })
}

fn lower_expression(cst: &CstNode) -> Node {
    let position = node_position(cst);
    match cst.name {
        "BooleanExpression" | "IntExpression" => {
            let op = match cst.child("NotEqualsOp") {
                Some(_) => BinaryOp::NotEquals,
                None if cst.child("PlusOp").is_some() => BinaryOp::Add,
                None => BinaryOp::Equals,
            };
            let mut operands = cst.children.iter().filter(|c| !c.is_terminal());
            let lhs = operands
                .next()
                .map(lower_expression)
                .unwrap_or_else(|| empty_string(position));
            let rhs = operands
                .next()
                .map(lower_expression)
                .unwrap_or_else(|| empty_string(position));
            Node::at(
                NodeKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                position,
            )
        }
        "StringExpression" => {
            let value: String = cst
                .children_named("Char")
                .filter_map(|c| c.token.as_ref())
                .map(|t| t.lexeme.as_str())
                .collect();
            Node::at(NodeKind::StringLiteral { value }, position)
        }
        "Expression" => {
            // either a wrapped leaf or a parenthesized sub-expression
            if let Some(inner) = cst.children.iter().find(|c| !c.is_terminal()) {
                return lower_expression(inner);
            }
            let token = cst
                .children
                .first()
                .and_then(|c| c.token.as_ref());
            match token.map(|t| t.kind) {
                Some(TokenKind::Digit) => Node::at(
                    NodeKind::IntLiteral {
                        value: token
                            .and_then(|t| t.lexeme.parse().ok())
                            .unwrap_or_default(),
                    },
                    position,
                ),
                Some(TokenKind::Keyword(Keyword::True)) => {
                    Node::at(NodeKind::BoolLiteral { value: true }, position)
                }
                Some(TokenKind::Keyword(Keyword::False)) => {
                    Node::at(NodeKind::BoolLiteral { value: false }, position)
                }
                _ => Node::at(
                    NodeKind::Identifier {
                        name: token.map(|t| t.lexeme.clone()).unwrap_or_default(),
                    },
                    position,
                ),
            }
        }
        _ => unreachable!("parser emits no other expression node: {}", cst.name),
    }
}

fn empty_string(position: Position) -> Node {
    Node::at(
        NodeKind::StringLiteral {
            value: String::new(),
        },
        position,
    )
}

fn empty_block(position: Position) -> Node {
    Node::at(
        NodeKind::Block {
            statements: Vec::new(),
        },
        position,
    )
}

fn node_position(cst: &CstNode) -> Position {
    cst.position().unwrap_or_default()
}
