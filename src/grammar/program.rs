use super::{lexer::TokenKind, Parser};
use crate::cst::CstNode;

pub(super) fn parse_program(parser: &mut Parser) -> CstNode {
    parser.trace("Program");
    let mut node = CstNode::branch("Program");

    match super::block::parse_block(parser) {
        Ok(block) => node.push(block),
        Err(error) => {
            parser.record(&error);
            parser.synchronize();
        }
    }

    match parser.expect(TokenKind::Eop) {
        Ok(token) => node.push(CstNode::leaf(token)),
        Err(error) => parser.record(&error),
    }

    node
}
