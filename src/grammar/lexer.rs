//! Hand-written scanner for Alan++ source.
//!
//! The lexer never aborts: every malformed input records an ERROR entry
//! in its log, the cursor advances, and scanning resumes. The produced
//! token list therefore always covers the whole sub-program, which lets
//! the parser run (and report further) even on badly broken input.

use crate::diag::Log;
use crate::error::{SourceMetadata, Span};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Int,
    String,
    Boolean,
    If,
    Else,
    While,
    Print,
    True,
    False,
}

impl Keyword {
    pub const fn spelling(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::Print => "print",
            Self::True => "true",
            Self::False => "false",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.spelling())
    }
}

/// Keyword table ordered by descending spelling length, so a linear
/// scan finds the longest prefix match first.
const KEYWORDS: &[Keyword] = &[
    Keyword::Boolean,
    Keyword::String,
    Keyword::Print,
    Keyword::While,
    Keyword::False,
    Keyword::Else,
    Keyword::True,
    Keyword::Int,
    Keyword::If,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Keyword(Keyword),
    Assign,
    Equals,
    NotEquals,
    Plus,
    Digit,
    Char,
    Quote,
    Identifier,
    Eop,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OpenBrace => write!(f, "opening brace '{{'"),
            Self::CloseBrace => write!(f, "closing brace '}}'"),
            Self::OpenParen => write!(f, "opening parenthesis '('"),
            Self::CloseParen => write!(f, "closing parenthesis ')'"),
            Self::Keyword(kw) => write!(f, "keyword '{}'", kw),
            Self::Assign => write!(f, "assignment operator '='"),
            Self::Equals => write!(f, "equality operator '=='"),
            Self::NotEquals => write!(f, "inequality operator '!='"),
            Self::Plus => write!(f, "addition operator '+'"),
            Self::Digit => write!(f, "digit"),
            Self::Char => write!(f, "character"),
            Self::Quote => write!(f, "quote '\"'"),
            Self::Identifier => write!(f, "identifier"),
            Self::Eop => write!(f, "end of program '$'"),
        }
    }
}

impl TokenKind {
    /// The grammar-symbol name used for this terminal in the concrete
    /// syntax tree.
    pub const fn node_name(self) -> &'static str {
        match self {
            Self::OpenBrace => "OpenBrace",
            Self::CloseBrace => "CloseBrace",
            Self::OpenParen => "OpenParen",
            Self::CloseParen => "CloseParen",
            Self::Keyword(Keyword::Int) => "IntType",
            Self::Keyword(Keyword::String) => "StringType",
            Self::Keyword(Keyword::Boolean) => "BooleanType",
            Self::Keyword(Keyword::If) => "IfKeyword",
            Self::Keyword(Keyword::Else) => "ElseKeyword",
            Self::Keyword(Keyword::While) => "WhileKeyword",
            Self::Keyword(Keyword::Print) => "PrintKeyword",
            Self::Keyword(Keyword::True) | Self::Keyword(Keyword::False) => "BooleanValue",
            Self::Assign => "AssignOp",
            Self::Equals => "EqualsOp",
            Self::NotEquals => "NotEqualsOp",
            Self::Plus => "PlusOp",
            Self::Digit => "Digit",
            Self::Char => "Char",
            Self::Quote => "Quote",
            Self::Identifier => "Identifier",
            Self::Eop => "EndOfProgram",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source<'source> {
    pub span: Span,
    pub source: &'source str,
}

#[derive(Debug, Clone, Copy)]
pub struct Token<'source> {
    pub kind: TokenKind,
    pub source: Source<'source>,
}

impl<'source> Token<'source> {
    pub const fn new(kind: TokenKind, source: Source<'source>) -> Self {
        Self { kind, source }
    }
    pub const fn lexeme(&self) -> &'source str {
        self.source.source
    }
}

#[derive(Error, Debug)]
pub enum LexErrorKind {
    #[error("Unrecognized token {0:?}")]
    UnrecognizedToken(char),
    #[error("Invalid character {0:?} in string literal")]
    InvalidStringChar(char),
    #[error("Multiline strings are not allowed")]
    MultilineString,
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unterminated comment block")]
    UnterminatedComment,
    #[error("Unexpected '/', expected '*' to open a comment block")]
    UnexpectedSlash,
}

pub struct LexOutput<'source> {
    pub tokens: Vec<Token<'source>>,
    pub log: Log,
}

pub struct Lexer<'source> {
    input: std::iter::Peekable<std::str::CharIndices<'source>>,
    metadata: &'source SourceMetadata<'source>,
    tokens: Vec<Token<'source>>,
    log: Log,
    errors_in_program: usize,
}

impl<'source> Lexer<'source> {
    pub fn new(metadata: &'source SourceMetadata<'source>) -> Self {
        Self {
            input: metadata.input().char_indices().peekable(),
            metadata,
            tokens: Vec::new(),
            log: Log::new(),
            errors_in_program: 0,
        }
    }

    /// Consumes the whole input, producing every token it can and an
    /// entry in the log for everything it cannot.
    pub fn scan(mut self) -> LexOutput<'source> {
        while let Some(&(pos, ch)) = self.input.peek() {
            match ch {
                c if c.is_whitespace() => {
                    self.advance();
                }
                '{' => self.single(TokenKind::OpenBrace),
                '}' => self.single(TokenKind::CloseBrace),
                '(' => self.single(TokenKind::OpenParen),
                ')' => self.single(TokenKind::CloseParen),
                '+' => self.single(TokenKind::Plus),
                '$' => {
                    self.single(TokenKind::Eop);
                    self.log.info(format!(
                        "Lex completed with {} errors",
                        self.errors_in_program
                    ));
                    self.errors_in_program = 0;
                }
                '=' => {
                    self.advance();
                    if self.eat_char('=').is_some() {
                        self.advance();
                        self.push_token(TokenKind::Equals, Span::with_len(pos, 2));
                    } else {
                        self.push_token(TokenKind::Assign, Span::new(pos));
                    }
                }
                '!' => {
                    self.advance();
                    if self.eat_char('=').is_some() {
                        self.advance();
                        self.push_token(TokenKind::NotEquals, Span::with_len(pos, 2));
                    } else {
                        self.report(pos, LexErrorKind::UnrecognizedToken('!'));
                    }
                }
                '/' => {
                    self.advance();
                    if self.eat_char('*').is_some() {
                        self.advance();
                        self.comment(pos);
                    } else {
                        self.report(pos, LexErrorKind::UnexpectedSlash);
                    }
                }
                '"' => {
                    self.single(TokenKind::Quote);
                    self.string_body(pos);
                }
                c if c.is_ascii_digit() => self.single(TokenKind::Digit),
                c if c.is_ascii_alphabetic() => self.word(pos),
                c => {
                    self.advance();
                    self.report(pos, LexErrorKind::UnrecognizedToken(c));
                }
            }
        }

        if self.tokens.last().map(|t| t.kind) != Some(TokenKind::Eop) {
            let end = self.metadata.input().len();
            self.log.warning_at(
                "Missing end-of-program marker '$', one was assumed",
                self.metadata.position(end),
            );
            self.tokens.push(Token::new(
                TokenKind::Eop,
                Source {
                    span: Span::with_len(end, 0),
                    source: "",
                },
            ));
            self.log.info(format!(
                "Lex completed with {} errors",
                self.errors_in_program
            ));
        }

        LexOutput {
            tokens: self.tokens,
            log: self.log,
        }
    }

    /// A block comment; `/*` has already been consumed. Comments nest,
    /// and nothing inside them reaches the token stream.
    fn comment(&mut self, open_pos: usize) {
        let mut depth = 1usize;
        while depth > 0 {
            match self.input.next() {
                None => {
                    self.report(open_pos, LexErrorKind::UnterminatedComment);
                    return;
                }
                Some((_, '/')) if self.eat_char('*').is_some() => {
                    self.advance();
                    depth += 1;
                }
                Some((_, '*')) if self.eat_char('/').is_some() => {
                    self.advance();
                    depth -= 1;
                }
                Some(_) => {}
            }
        }
    }

    /// The inside of a string literal; the opening quote token is
    /// already out. Every accepted character becomes its own token.
    fn string_body(&mut self, open_pos: usize) {
        loop {
            match self.input.peek().copied() {
                None => {
                    self.report(open_pos, LexErrorKind::UnterminatedString);
                    return;
                }
                Some((_, '"')) => {
                    self.single(TokenKind::Quote);
                    return;
                }
                Some((pos, '\n')) => {
                    self.report(pos, LexErrorKind::MultilineString);
                    return;
                }
                Some((_, c)) if c == ' ' || c.is_ascii_lowercase() => {
                    self.single(TokenKind::Char);
                }
                Some((pos, c)) => {
                    self.advance();
                    self.report(pos, LexErrorKind::InvalidStringChar(c));
                }
            }
        }
    }

    /// A run of word characters. The longest keyword prefix of the run
    /// wins and consumes exactly its own length; otherwise the first
    /// character alone becomes an identifier. Either way the rest of
    /// the run is rescanned, which is what keeps one-letter identifiers
    /// and embedded keywords coexisting.
    fn word(&mut self, start: usize) {
        let rest = &self.metadata.input()[start..];
        let run_len: usize = rest
            .chars()
            .take_while(|&c| is_word_char(c))
            .map(char::len_utf8)
            .sum();
        let run = &rest[..run_len];

        let matched = KEYWORDS.iter().copied().find(|kw| {
            let spelling = kw.spelling();
            run.len() >= spelling.len() && run[..spelling.len()].eq_ignore_ascii_case(spelling)
        });

        match matched {
            Some(kw) => {
                let len = kw.spelling().len();
                self.advance_by(len);
                self.push_token(TokenKind::Keyword(kw), Span::with_len(start, len));
            }
            None => {
                let first = run.chars().next().expect("word() called off a letter");
                self.advance();
                if first.is_ascii_lowercase() {
                    self.push_token(TokenKind::Identifier, Span::new(start));
                } else {
                    self.report(start, LexErrorKind::UnrecognizedToken(first));
                }
            }
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let (pos, _) = *self.input.peek().expect("single() called at end of input");
        self.advance();
        self.push_token(kind, Span::new(pos));
    }

    fn push_token(&mut self, kind: TokenKind, span: Span) {
        let source = &self.metadata.input()[span.as_range()];
        self.log.debug_at(
            format!("{} [ {} ] found", kind, source),
            self.metadata.position(span.offset),
        );
        self.tokens.push(Token::new(kind, Source { span, source }));
    }

    fn report(&mut self, offset: usize, kind: LexErrorKind) {
        self.log
            .error_at(kind.to_string(), self.metadata.position(offset));
        self.errors_in_program += 1;
    }

    fn eat_char(&mut self, ch: char) -> Option<usize> {
        self.input
            .peek()
            .filter(|(_, x)| *x == ch)
            .map(|(pos, _)| *pos)
    }

    fn advance(&mut self) {
        self.input.next();
    }

    fn advance_by(&mut self, chars: usize) {
        for _ in 0..chars {
            self.advance();
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(out: &LexOutput) -> Vec<TokenKind> {
        out.tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_block_program() {
        let meta = SourceMetadata::new("{}$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![TokenKind::OpenBrace, TokenKind::CloseBrace, TokenKind::Eop]
        );
        assert_eq!(out.log.error_count(), 0);
    }

    #[test]
    fn whitespace_only_yields_one_eop() {
        let meta = SourceMetadata::new("  \t\n $");
        let out = Lexer::new(&meta).scan();
        assert_eq!(kinds(&out), vec![TokenKind::Eop]);
        assert_eq!(out.log.error_count(), 0);
    }

    #[test]
    fn keywords_match_longest_prefix() {
        let meta = SourceMetadata::new("intx$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Identifier,
                TokenKind::Eop
            ]
        );
        assert_eq!(out.tokens[1].lexeme(), "x");
    }

    #[test]
    fn identifier_run_splits_into_single_letters() {
        let meta = SourceMetadata::new("ab$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eop]
        );
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let meta = SourceMetadata::new("WHILE$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![TokenKind::Keyword(Keyword::While), TokenKind::Eop]
        );
    }

    #[test]
    fn equals_vs_assign() {
        let meta = SourceMetadata::new("a==b a=b$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Identifier,
                TokenKind::Eop
            ]
        );
    }

    #[test]
    fn lone_exclamation_is_an_error() {
        let meta = SourceMetadata::new("!$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(kinds(&out), vec![TokenKind::Eop]);
        assert_eq!(out.log.error_count(), 1);
    }

    #[test]
    fn digits_come_one_per_token() {
        let meta = SourceMetadata::new("12$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![TokenKind::Digit, TokenKind::Digit, TokenKind::Eop]
        );
    }

    #[test]
    fn string_literal_tokenizes_per_character() {
        let meta = SourceMetadata::new("\"hi u\"$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![
                TokenKind::Quote,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Quote,
                TokenKind::Eop
            ]
        );
        assert_eq!(out.tokens[3].lexeme(), " ");
    }

    #[test]
    fn invalid_string_char_reports_and_continues() {
        let meta = SourceMetadata::new("\"a5b\"$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(out.log.error_count(), 1);
        assert_eq!(
            kinds(&out),
            vec![
                TokenKind::Quote,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Quote,
                TokenKind::Eop
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_at_opening_quote() {
        let meta = SourceMetadata::new("\"ab");
        let out = Lexer::new(&meta).scan();
        let entry = out
            .log
            .entries()
            .iter()
            .find(|e| e.message.contains("Unterminated string"))
            .unwrap();
        assert_eq!(entry.position.unwrap().col, 1);
        assert_eq!(out.log.error_count(), 1);
    }

    #[test]
    fn multiline_string_is_an_error() {
        let meta = SourceMetadata::new("\"a\nb\"$");
        let out = Lexer::new(&meta).scan();
        assert!(out
            .log
            .entries()
            .iter()
            .any(|e| e.message.contains("Multiline")));
    }

    #[test]
    fn nested_comments_are_skipped_entirely() {
        let meta = SourceMetadata::new("{ /* outer /* inner */ still */ }$");
        let out = Lexer::new(&meta).scan();
        assert_eq!(
            kinds(&out),
            vec![TokenKind::OpenBrace, TokenKind::CloseBrace, TokenKind::Eop]
        );
        assert_eq!(out.log.error_count(), 0);
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let meta = SourceMetadata::new("{ /* no end $");
        let out = Lexer::new(&meta).scan();
        assert_eq!(out.log.error_count(), 1);
        assert!(out
            .log
            .entries()
            .iter()
            .any(|e| e.message.contains("Unterminated comment")));
    }

    #[test]
    fn stray_slash_is_an_error() {
        let meta = SourceMetadata::new("/ $");
        let out = Lexer::new(&meta).scan();
        assert_eq!(out.log.error_count(), 1);
    }

    #[test]
    fn missing_eop_warns_and_synthesizes() {
        let meta = SourceMetadata::new("{}");
        let out = Lexer::new(&meta).scan();
        assert_eq!(kinds(&out).last(), Some(&TokenKind::Eop));
        assert_eq!(out.log.warning_count(), 1);
    }

    #[test]
    fn eop_resets_the_error_count() {
        let meta = SourceMetadata::new("@ $ $");
        let out = Lexer::new(&meta).scan();
        let completions: Vec<_> = out
            .log
            .entries()
            .iter()
            .filter(|e| e.message.starts_with("Lex completed"))
            .collect();
        assert_eq!(completions.len(), 2);
        assert!(completions[0].message.contains("1 errors"));
        assert!(completions[1].message.contains("0 errors"));
    }
}
