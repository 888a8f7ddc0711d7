use super::{lexer::TokenKind, ParseErrorKind, ParseRes, Parser};
use crate::cst::CstNode;
use crate::error::WantedSpec;

/// `'{' statement* '}'`. This loop is where statement-level errors stop
/// propagating: each one is logged, the parser synchronizes, and the
/// rest of the block still parses.
pub(super) fn parse_block(parser: &mut Parser) -> ParseRes<CstNode> {
    parser.with_context("parsing statement block", |parser| {
        parser.trace("Block");
        let mut node = CstNode::branch("Block");
        node.push(CstNode::leaf(parser.expect(TokenKind::OpenBrace)?));

        let mut list = CstNode::branch("StatementList");
        loop {
            match parser.peek() {
                Some(TokenKind::CloseBrace) => break,
                Some(TokenKind::Eop) => {
                    return parser.emit_error_at(
                        parser.current_span(),
                        ParseErrorKind::Expected {
                            wanted: WantedSpec::Specific(TokenKind::CloseBrace),
                            found: TokenKind::Eop,
                        },
                    );
                }
                None => {
                    return parser.emit_error_at(
                        parser.current_span(),
                        ParseErrorKind::UnexpectedEof {
                            wanted: WantedSpec::Specific(TokenKind::CloseBrace),
                        },
                    );
                }
                Some(_) => {
                    let before = parser.cursor();
                    match super::statement::parse_statement(parser) {
                        Ok(statement) => list.push(statement),
                        Err(error) => {
                            parser.record(&error);
                            if parser.cursor() == before {
                                parser.bump();
                            }
                            parser.synchronize();
                        }
                    }
                }
            }
        }
        node.push(list);

        node.push(CstNode::leaf(parser.expect(TokenKind::CloseBrace)?));
        Ok(node)
    })
}
