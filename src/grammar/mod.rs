//! Recursive-descent parsing of the token stream into a concrete
//! syntax tree.
//!
//! Productions return [`ParseRes`] and compose with `?`; the statement
//! loop in [`block`] is the recovery boundary. An error there becomes an
//! ERROR log entry and the parser synchronizes to the next statement
//! boundary, so one bad statement costs only itself.

pub mod lexer;

mod block;
mod expr;
mod program;
mod statement;

use crate::cst::{CstNode, CstToken};
use crate::diag::Log;
use crate::error::{Error, SourceMetadata, Span, WantedSpec};
use lexer::{Token, TokenKind};
use thiserror::Error;

pub type ParseRes<T> = Result<T, ParseError>;
pub type ParseError = Error<ParseErrorKind>;

#[derive(Error, Debug)]
pub enum ParseErrorKind {
    #[error("Expected {wanted}, but found instead {found}")]
    Expected {
        wanted: WantedSpec<TokenKind>,
        found: TokenKind,
    },
    #[error("Unexpected end of input, expected {wanted}")]
    UnexpectedEof { wanted: WantedSpec<TokenKind> },
}

pub struct ParseOutput {
    pub cst: Option<CstNode>,
    pub log: Log,
}

pub struct Parser<'source> {
    tokens: Vec<Token<'source>>,
    index: usize,
    metadata: &'source SourceMetadata<'source>,
    log: Log,
}

impl<'source> Parser<'source> {
    pub fn new(tokens: Vec<Token<'source>>, metadata: &'source SourceMetadata<'source>) -> Self {
        Self {
            tokens,
            index: 0,
            metadata,
            log: Log::new(),
        }
    }

    /// Parses one sub-program. The tree is always produced, possibly
    /// partial; the log tells whether it is trustworthy.
    pub fn run(mut self) -> ParseOutput {
        let cst = program::parse_program(&mut self);
        self.log.info(format!(
            "Parser - Parsing completed with {} error(s)",
            self.log.error_count()
        ));
        ParseOutput {
            cst: Some(cst),
            log: self.log,
        }
    }

    pub fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.index).map(|t| t.kind)
    }

    pub fn peek_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.index + offset).map(|t| t.kind)
    }

    fn previous_kind(&self) -> Option<TokenKind> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.kind)
    }

    pub fn current_span(&self) -> Span {
        self.tokens
            .get(self.index)
            .map(|t| t.source.span)
            .unwrap_or_else(|| Span::with_len(self.metadata.input().len(), 0))
    }

    /// Consumes the current token and returns it as a CST leaf datum.
    /// Must only be called after a successful `peek`.
    pub fn accept_current(&mut self) -> CstToken {
        let token = self.tokens[self.index];
        self.index += 1;
        CstToken {
            kind: token.kind,
            lexeme: token.lexeme().to_string(),
            position: self.metadata.position(token.source.span.offset),
        }
    }

    /// Consumes the current token if it matches, errs otherwise.
    pub fn expect(&mut self, kind: TokenKind) -> ParseRes<CstToken> {
        match self.peek() {
            Some(found) if found == kind => Ok(self.accept_current()),
            Some(found) => self.emit_error_at(
                self.current_span(),
                ParseErrorKind::Expected {
                    wanted: WantedSpec::Specific(kind),
                    found,
                },
            ),
            None => self.emit_error_at(
                self.current_span(),
                ParseErrorKind::UnexpectedEof {
                    wanted: WantedSpec::Specific(kind),
                },
            ),
        }
    }

    pub fn emit_error_at<T>(&self, span: Span, kind: ParseErrorKind) -> ParseRes<T> {
        Err(ParseError::new(kind).with_span(span))
    }

    pub fn with_context<F, T>(&mut self, context: &'static str, mut cont: F) -> ParseRes<T>
    where
        F: FnMut(&mut Self) -> ParseRes<T>,
    {
        cont(self).map_err(|x| x.add_context(context))
    }

    /// Notes the production being entered; these lines make up the
    /// verbose half of the parser log.
    pub fn trace(&mut self, production: &str) {
        match self.tokens.get(self.index) {
            Some(token) => {
                let position = self.metadata.position(token.source.span.offset);
                self.log.debug_at(format!("Parsing {}", production), position);
            }
            None => self.log.debug(format!("Parsing {}", production)),
        }
    }

    /// Turns a production failure into a log entry. Recovery is the
    /// caller's business.
    pub fn record(&mut self, error: &ParseError) {
        match error.position(self.metadata) {
            Some(position) => self.log.error_at(error.describe(), position),
            None => self.log.error(error.describe()),
        }
    }

    /// Skips to the next plausible statement boundary: just past a `}`,
    /// or in front of a token that can start a statement. Never skips
    /// past the end-of-program marker.
    pub fn synchronize(&mut self) {
        while let Some(kind) = self.peek() {
            if kind == TokenKind::Eop || kind == TokenKind::CloseBrace {
                return;
            }
            if self.previous_kind() == Some(TokenKind::CloseBrace) {
                return;
            }
            if starts_statement(kind) {
                return;
            }
            self.index += 1;
        }
    }

    pub fn cursor(&self) -> usize {
        self.index
    }

    /// Forced single-token progress, for when a failed production
    /// consumed nothing and synchronization alone would spin.
    pub fn bump(&mut self) {
        if self.index < self.tokens.len() {
            self.index += 1;
        }
    }
}

fn starts_statement(kind: TokenKind) -> bool {
    use lexer::Keyword::*;
    matches!(
        kind,
        TokenKind::Keyword(Int)
            | TokenKind::Keyword(String)
            | TokenKind::Keyword(Boolean)
            | TokenKind::Keyword(If)
            | TokenKind::Keyword(While)
            | TokenKind::Keyword(Print)
    )
}

#[cfg(test)]
mod tests {
    use super::lexer::Lexer;
    use super::*;
    use crate::cst::CstNode;

    fn parse(source: &str) -> ParseOutput {
        let meta = SourceMetadata::new(source);
        let lexed = Lexer::new(&meta).scan();
        Parser::new(lexed.tokens, &meta).run()
    }

    fn names(node: &CstNode, out: &mut Vec<&'static str>) {
        out.push(node.name);
        for child in &node.children {
            names(child, out);
        }
    }

    fn name_sequence(source: &str) -> Vec<&'static str> {
        let out = parse(source);
        let mut seq = Vec::new();
        names(out.cst.as_ref().unwrap(), &mut seq);
        seq
    }

    #[test]
    fn empty_block() {
        let out = parse("{}$");
        assert_eq!(out.log.error_count(), 0);
        let mut seq = Vec::new();
        names(out.cst.as_ref().unwrap(), &mut seq);
        assert_eq!(
            seq,
            vec![
                "Program",
                "Block",
                "OpenBrace",
                "StatementList",
                "CloseBrace",
                "EndOfProgram"
            ]
        );
    }

    #[test]
    fn variable_declaration() {
        let seq = name_sequence("{ int a }$");
        assert!(seq.contains(&"VariableDeclaration"));
        assert!(seq.contains(&"IntType"));
        assert!(seq.contains(&"Identifier"));
    }

    #[test]
    fn declaration_with_initializer() {
        let seq = name_sequence("{ int a = 3 }$");
        let decl_at = seq
            .iter()
            .position(|&n| n == "VariableDeclaration")
            .unwrap();
        assert!(seq[decl_at..].contains(&"AssignOp"));
        assert!(seq[decl_at..].contains(&"Expression"));
    }

    #[test]
    fn assignment_statement() {
        let seq = name_sequence("{ a = 3 }$");
        assert!(seq.contains(&"AssignmentStatement"));
    }

    #[test]
    fn print_with_string_literal() {
        let seq = name_sequence("{ print(\"hi\") }$");
        assert!(seq.contains(&"PrintStatement"));
        assert!(seq.contains(&"StringExpression"));
        assert_eq!(seq.iter().filter(|&&n| n == "Char").count(), 2);
    }

    #[test]
    fn if_with_comparison() {
        let seq = name_sequence("{ if (1 == 1) { } }$");
        assert!(seq.contains(&"IfStatement"));
        assert!(seq.contains(&"BooleanExpression"));
        assert!(seq.contains(&"EqualsOp"));
    }

    #[test]
    fn if_else_keeps_else_keyword() {
        let seq = name_sequence("{ if (a != b) { } else { } }$");
        assert!(seq.contains(&"ElseKeyword"));
        assert_eq!(seq.iter().filter(|&&n| n == "Block").count(), 3);
    }

    #[test]
    fn while_statement() {
        let seq = name_sequence("{ while (a == 1) { b = 2 } }$");
        assert!(seq.contains(&"WhileStatement"));
        assert!(seq.contains(&"AssignmentStatement"));
    }

    #[test]
    fn addition_nests_left() {
        let out = parse("{ a = 1 + 2 + 3 }$");
        assert_eq!(out.log.error_count(), 0);
        let mut seq = Vec::new();
        names(out.cst.as_ref().unwrap(), &mut seq);
        assert_eq!(seq.iter().filter(|&&n| n == "IntExpression").count(), 2);
    }

    #[test]
    fn nested_block_statement() {
        let seq = name_sequence("{ int a { int a } }$");
        assert_eq!(seq.iter().filter(|&&n| n == "Block").count(), 3);
    }

    #[test]
    fn missing_close_paren_recovers_at_next_statement() {
        let out = parse("{ print(a print(b) }$");
        assert!(out.log.has_errors());
        // the second print survives recovery
        let mut seq = Vec::new();
        names(out.cst.as_ref().unwrap(), &mut seq);
        assert!(seq.iter().filter(|&&n| n == "PrintStatement").count() >= 1);
    }

    #[test]
    fn stray_token_is_reported_once_per_statement() {
        let out = parse("{ ) int a }$");
        assert_eq!(out.log.error_count(), 1);
        let mut seq = Vec::new();
        names(out.cst.as_ref().unwrap(), &mut seq);
        assert!(seq.contains(&"VariableDeclaration"));
    }

    #[test]
    fn unclosed_block_reports_error() {
        let out = parse("{ int a $");
        assert!(out.log.has_errors());
    }

    #[test]
    fn completion_summary_carries_error_count() {
        let out = parse("{ ) }$");
        let line = out
            .log
            .entries()
            .iter()
            .find(|e| e.message.starts_with("Parser - Parsing completed"))
            .unwrap();
        assert!(line.message.contains("1 error(s)"));
    }
}
