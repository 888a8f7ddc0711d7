use super::{
    lexer::{Keyword, TokenKind},
    ParseErrorKind, ParseRes, Parser,
};
use crate::cst::CstNode;
use crate::error::WantedSpec;

/// `equality := term ( ('==' | '!=') term )*`, left-associative.
pub(super) fn parse_expression(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.with_context("parsing expression", |parser| {
        let mut left = parse_term(parser)?;
        while matches!(
            parser.peek(),
            Some(TokenKind::Equals | TokenKind::NotEquals)
        ) {
            let op = CstNode::leaf(parser.accept_current());
            let right = parse_term(parser)?;
            let mut node = CstNode::branch("BooleanExpression");
            node.push(left);
            node.push(op);
            node.push(right);
            left = node;
        }
        Ok(left)
    })
}

/// `term := factor ( '+' factor )*`, left-associative.
fn parse_term(parser: &mut Parser) -> ParseRes<CstNode> {
    let mut left = parse_factor(parser)?;
    while parser.peek() == Some(TokenKind::Plus) {
        let op = CstNode::leaf(parser.accept_current());
        let right = parse_factor(parser)?;
        let mut node = CstNode::branch("IntExpression");
        node.push(left);
        node.push(op);
        node.push(right);
        left = node;
    }
    Ok(left)
}

fn parse_factor(parser: &mut Parser) -> ParseRes<CstNode> {
    match parser.peek() {
        Some(
            TokenKind::Digit
            | TokenKind::Identifier
            | TokenKind::Keyword(Keyword::True | Keyword::False),
        ) => Ok(wrap_leaf(parser)),
        Some(TokenKind::Quote) => string_literal(parser),
        Some(TokenKind::OpenParen) => {
            let mut node = CstNode::branch("Expression");
            node.push(CstNode::leaf(parser.accept_current()));
            node.push(parse_expression(parser)?);
            node.push(CstNode::leaf(parser.expect(TokenKind::CloseParen)?));
            Ok(node)
        }
        Some(found) => parser.emit_error_at(
            parser.current_span(),
            ParseErrorKind::Expected {
                wanted: WantedSpec::Description("a digit, identifier, literal or '('"),
                found,
            },
        ),
        None => parser.emit_error_at(
            parser.current_span(),
            ParseErrorKind::UnexpectedEof {
                wanted: WantedSpec::Description("expression"),
            },
        ),
    }
}

/// `stringLit := '"' CHAR* '"'`, one token per accepted character.
fn string_literal(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.trace("StringExpression");
    let mut node = CstNode::branch("StringExpression");
    node.push(CstNode::leaf(parser.expect(TokenKind::Quote)?));
    while parser.peek() == Some(TokenKind::Char) {
        node.push(CstNode::leaf(parser.accept_current()));
    }
    node.push(CstNode::leaf(parser.expect(TokenKind::Quote)?));
    Ok(node)
}

fn wrap_leaf(parser: &mut Parser) -> CstNode {
    let mut node = CstNode::branch("Expression");
    node.push(CstNode::leaf(parser.accept_current()));
    node
}
