//! Token definitions for the Myriad language.
//!
//! `RawToken` is the logos-derived lexer for expression mode. The public
//! `Token` carries the resolved kind, the token text and the 1-based source
//! line; Dockerfile-mode tokens (`Command`, `DfArg`) are produced by the
//! modal driver in the parent module, not by logos.

use std::collections::HashSet;

use logos::{Logos, Skip};
use once_cell::sync::Lazy;
use serde::Serialize;

/// The Dockerfile instruction keywords recognized at the start of a line
/// inside a literal block.
pub static DOCKERFILE_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "ADD",
        "ARG",
        "CMD",
        "COPY",
        "ENTRYPOINT",
        "ENV",
        "EXPOSE",
        "FROM",
        "HEALTHCHECK",
        "LABEL",
        "MAINTAINER",
        "ONBUILD",
        "RUN",
        "SHELL",
        "STOPSIGNAL",
        "USER",
        "VOLUME",
        "WORKDIR",
    ])
});

fn newline(lex: &mut logos::Lexer<RawToken>) -> Skip {
    lex.extras += 1;
    Skip
}

/// Expression-mode tokens. The line counter lives in `extras`; `;` is an
/// optional statement separator and is skipped like whitespace.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(extras = usize)]
#[logos(skip r"[ \t\r;]+")]
pub(crate) enum RawToken {
    #[token("\n", newline)]
    Newline,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(".")]
    Dot,

    // Literal-block delimiters seen from expression mode. `{{-` opens a
    // Dockerfile block; `}}` closes an embedded replacement (or is a pair of
    // closing braces when no replacement is open, which the driver decides).
    #[token("{{-")]
    DfBegin,
    #[token("}}")]
    ReplaceClose,

    #[token(":=")]
    Define,
    #[token("=")]
    Assign,
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("!")]
    Not,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("+")]
    Plus,
    #[token("<<")]
    Redirect,

    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("main")]
    Main,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("keys")]
    Keys,
    #[token("JsonUnmarshal")]
    JsonUnmarshal,
    #[token("append")]
    Append,
    #[token("sort")]
    Sort,
    #[token("split")]
    Split,
    #[token("trimLeft")]
    TrimLeft,
    #[token("trimRight")]
    TrimRight,
    #[token("startWith")]
    StartWith,
    #[token("endWith")]
    EndWith,

    // Strings are single-line and taken verbatim, no escape processing.
    #[regex(r#""[^"\n]*""#)]
    Str,
    #[regex("[0-9]+")]
    Number,
    #[regex("[A-Za-z][A-Za-z0-9]*")]
    Ident,
}

/// The kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    LParen,
    RParen,
    Comma,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Define,
    Assign,
    Equal,
    NotEqual,
    Not,
    And,
    Or,
    Plus,
    Redirect,
    DfBegin,
    DfEnd,
    ReplaceOpen,
    ReplaceClose,
    Import,
    From,
    Main,
    If,
    Else,
    For,
    In,
    Keys,
    JsonUnmarshal,
    Append,
    Sort,
    Split,
    TrimLeft,
    TrimRight,
    StartWith,
    EndWith,
    Str,
    Number,
    Ident,
    /// A Dockerfile command keyword inside a literal block.
    Command,
    /// Raw Dockerfile argument text inside a literal block.
    DfArg,
}

/// A lexed token: kind, text and the 1-based line it starts on.
///
/// `Str` tokens carry their content without the surrounding quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_kinds(source: &str) -> Vec<RawToken> {
        let mut lexer = RawToken::lexer(source);
        lexer.extras = 1;
        let mut kinds = Vec::new();
        while let Some(token) = lexer.next() {
            kinds.push(token.expect("valid token"));
        }
        kinds
    }

    #[test]
    fn symbols_and_operators() {
        assert_eq!(
            raw_kinds("( ) , [ ] { } . := = == != ! && || + <<"),
            vec![
                RawToken::LParen,
                RawToken::RParen,
                RawToken::Comma,
                RawToken::LBracket,
                RawToken::RBracket,
                RawToken::LBrace,
                RawToken::RBrace,
                RawToken::Dot,
                RawToken::Define,
                RawToken::Assign,
                RawToken::Equal,
                RawToken::NotEqual,
                RawToken::Not,
                RawToken::And,
                RawToken::Or,
                RawToken::Plus,
                RawToken::Redirect,
            ]
        );
    }

    #[test]
    fn assign_versus_equal() {
        assert_eq!(
            raw_kinds("x = y == z"),
            vec![
                RawToken::Ident,
                RawToken::Assign,
                RawToken::Ident,
                RawToken::Equal,
                RawToken::Ident,
            ]
        );
    }

    #[test]
    fn keywords_need_a_word_boundary() {
        assert_eq!(raw_kinds("if"), vec![RawToken::If]);
        assert_eq!(raw_kinds("ifx"), vec![RawToken::Ident]);
        assert_eq!(raw_kinds("format"), vec![RawToken::Ident]);
        assert_eq!(raw_kinds("keys"), vec![RawToken::Keys]);
    }

    #[test]
    fn block_open_beats_single_braces() {
        assert_eq!(raw_kinds("{{-"), vec![RawToken::DfBegin]);
        assert_eq!(raw_kinds("{ {"), vec![RawToken::LBrace, RawToken::LBrace]);
    }

    #[test]
    fn newlines_count_lines() {
        let mut lexer = RawToken::lexer("a\nb\n\nc");
        lexer.extras = 1;
        assert_eq!(lexer.next(), Some(Ok(RawToken::Ident)));
        assert_eq!(lexer.extras, 1);
        assert_eq!(lexer.next(), Some(Ok(RawToken::Ident)));
        assert_eq!(lexer.extras, 2);
        assert_eq!(lexer.next(), Some(Ok(RawToken::Ident)));
        assert_eq!(lexer.extras, 4);
    }

    #[test]
    fn semicolons_are_insignificant() {
        assert_eq!(
            raw_kinds("x := \"a\"; y := \"b\""),
            vec![
                RawToken::Ident,
                RawToken::Define,
                RawToken::Str,
                RawToken::Ident,
                RawToken::Define,
                RawToken::Str,
            ]
        );
    }

    #[test]
    fn dockerfile_command_table() {
        assert!(DOCKERFILE_COMMANDS.contains("RUN"));
        assert!(DOCKERFILE_COMMANDS.contains("HEALTHCHECK"));
        assert!(!DOCKERFILE_COMMANDS.contains("run"));
        assert!(!DOCKERFILE_COMMANDS.contains("INCLUDE"));
        assert_eq!(DOCKERFILE_COMMANDS.len(), 18);
    }
}
