use super::{
    lexer::{Keyword, TokenKind},
    ParseErrorKind, ParseRes, Parser,
};
use crate::cst::CstNode;
use crate::error::WantedSpec;

pub(super) fn parse_statement(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.with_context("parsing statement", |parser| match parser.peek() {
        Some(TokenKind::Keyword(Keyword::Print)) => print_statement(parser),
        Some(TokenKind::Keyword(Keyword::While)) => while_statement(parser),
        Some(TokenKind::Keyword(Keyword::If)) => if_statement(parser),
        Some(TokenKind::Keyword(Keyword::Int | Keyword::String | Keyword::Boolean)) => {
            var_declaration(parser)
        }
        Some(TokenKind::OpenBrace) => super::block::parse_block(parser),
        Some(TokenKind::Identifier) if parser.peek_at(1) == Some(TokenKind::Assign) => {
            assignment(parser)
        }
        Some(_) => expression_statement(parser),
        None => parser.emit_error_at(
            parser.current_span(),
            ParseErrorKind::UnexpectedEof {
                wanted: WantedSpec::Description("statement"),
            },
        ),
    })
}

fn print_statement(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("PrintStatement");
    let mut node = CstNode::branch("PrintStatement");
    node.push(CstNode::leaf(
        parser.expect(TokenKind::Keyword(Keyword::Print))?,
    ));
    node.push(CstNode::leaf(parser.expect(TokenKind::OpenParen)?));
    // `print()` is tolerated; lowering substitutes an empty string
    if parser.peek() != Some(TokenKind::CloseParen) {
        node.push(super::expr::parse_expression(parser)?);
    }
    node.push(CstNode::leaf(parser.expect(TokenKind::CloseParen)?));
    Ok(node)
}

fn while_statement(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("WhileStatement");
    let mut node = CstNode::branch("WhileStatement");
    node.push(CstNode::leaf(
        parser.expect(TokenKind::Keyword(Keyword::While))?,
    ));
    node.push(CstNode::leaf(parser.expect(TokenKind::OpenParen)?));
    node.push(super::expr::parse_expression(parser)?);
    node.push(CstNode::leaf(parser.expect(TokenKind::CloseParen)?));
    node.push(super::block::parse_block(parser)?);
    Ok(node)
}

fn if_statement(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("IfStatement");
    let mut node = CstNode::branch("IfStatement");
    node.push(CstNode::leaf(
        parser.expect(TokenKind::Keyword(Keyword::If))?,
    ));
    node.push(CstNode::leaf(parser.expect(TokenKind::OpenParen)?));
    node.push(super::expr::parse_expression(parser)?);
    node.push(CstNode::leaf(parser.expect(TokenKind::CloseParen)?));
    node.push(super::block::parse_block(parser)?);
    if parser.peek() == Some(TokenKind::Keyword(Keyword::Else)) {
        node.push(CstNode::leaf(parser.accept_current()));
        node.push(super::block::parse_block(parser)?);
    }
    Ok(node)
}

fn var_declaration(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("VariableDeclaration");
    let mut node = CstNode::branch("VariableDeclaration");
    // dispatcher already matched a type keyword
    node.push(CstNode::leaf(parser.accept_current()));
    node.push(CstNode::leaf(parser.expect(TokenKind::Identifier)?));
    if parser.peek() == Some(TokenKind::Assign) {
        node.push(CstNode::leaf(parser.accept_current()));
        node.push(super::expr::parse_expression(parser)?);
    }
    Ok(node)
}

fn assignment(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("AssignmentStatement");
    let mut node = CstNode::branch("AssignmentStatement");
    node.push(CstNode::leaf(parser.accept_current()));
    node.push(CstNode::leaf(parser.expect(TokenKind::Assign)?));
    node.push(super::expr::parse_expression(parser)?);
    Ok(node)
}

fn expression_statement(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("ExpressionStatement");
    let mut node = CstNode::branch("ExpressionStatement");
    node.push(super::expr::parse_expression(parser)?);
    Ok(node)
}
