//! Modal lexer for Myriad source text.
//!
//! Myriad interleaves two lexical modes. Expression mode (the default) is
//! handled by the logos-derived `RawToken` lexer in [`tokens`]. A `{{-`
//! switches to literal mode, where text is Dockerfile content: the driver
//! scans the raw remainder by hand, recognizing command keywords, argument
//! text, embedded `{{ ... }}` replacements and the closing `-}}`.
//!
//! Literal-mode rules:
//! - before a command, blanks and newlines are insignificant; the first word
//!   is matched against [`tokens::DOCKERFILE_COMMANDS`] and becomes a
//!   `Command` token on a hit, or plain argument text otherwise;
//! - argument text keeps its interior whitespace and runs to the end of the
//!   line (the newline is part of the `DfArg`), to an embedded `{{`, or to
//!   the closing `-}}`;
//! - a quoted span inside argument text contributes its content without the
//!   quotes;
//! - a line whose trimmed text ends in `\` continues the same command on the
//!   next line;
//! - the text in front of `-}}` loses its trailing blanks and gains a final
//!   newline, so every block ends its last line.

pub mod tokens;

use std::fmt;

use logos::Logos;

pub use tokens::{Token, TokenKind, DOCKERFILE_COMMANDS};
use tokens::RawToken;

/// Lexing failures. All are fatal; there is no recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    InvalidCharacter { text: String, line: usize },
    UnterminatedString { line: usize },
    UnterminatedBlock { line: usize },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::InvalidCharacter { text, line } => {
                write!(f, "lex error: invalid character {text:?} at line {line}")
            }
            LexError::UnterminatedString { line } => {
                write!(f, "lex error: unterminated string at line {line}")
            }
            LexError::UnterminatedBlock { line } => {
                write!(f, "lex error: unterminated block at line {line}")
            }
        }
    }
}

impl std::error::Error for LexError {}

/// Tokenize a whole source file.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = ModalLexer::new(source);
    lexer.run()?;
    Ok(lexer.tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Expression,
    Literal,
}

struct ModalLexer<'a> {
    inner: logos::Lexer<'a, RawToken>,
    mode: Mode,
    /// In literal mode: a command's argument text is being scanned, so
    /// whitespace is significant and words are not checked against the
    /// command table.
    in_command: bool,
    /// In expression mode: we got there through `{{`, and `}}` returns to
    /// literal mode instead of closing two braces.
    in_replacement: bool,
    tokens: Vec<Token>,
}

impl<'a> ModalLexer<'a> {
    fn new(source: &'a str) -> Self {
        let mut inner = RawToken::lexer(source);
        inner.extras = 1;
        ModalLexer {
            inner,
            mode: Mode::Expression,
            in_command: false,
            in_replacement: false,
            tokens: Vec::new(),
        }
    }

    fn line(&self) -> usize {
        self.inner.extras
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>) {
        let line = self.line();
        self.tokens.push(Token::new(kind, text, line));
    }

    fn run(&mut self) -> Result<(), LexError> {
        loop {
            match self.mode {
                Mode::Expression => {
                    if !self.expression_step()? {
                        return Ok(());
                    }
                }
                Mode::Literal => self.literal_step()?,
            }
        }
    }

    /// Lex one expression-mode token. Returns `false` at end of input.
    fn expression_step(&mut self) -> Result<bool, LexError> {
        let raw = match self.inner.next() {
            None => {
                if self.in_replacement {
                    return Err(LexError::UnterminatedBlock { line: self.line() });
                }
                return Ok(false);
            }
            Some(Err(())) => {
                let text = self.inner.slice().to_string();
                let line = self.line();
                if text.starts_with('"') {
                    return Err(LexError::UnterminatedString { line });
                }
                return Err(LexError::InvalidCharacter { text, line });
            }
            Some(Ok(raw)) => raw,
        };

        let text = self.inner.slice();
        match raw {
            RawToken::Newline => {}
            RawToken::DfBegin => {
                self.push(TokenKind::DfBegin, text);
                self.mode = Mode::Literal;
                self.in_command = false;
            }
            RawToken::ReplaceClose => {
                if self.in_replacement {
                    self.push(TokenKind::ReplaceClose, text);
                    self.in_replacement = false;
                    self.mode = Mode::Literal;
                } else {
                    // Two block ends with no separating space, e.g. `} }`
                    // written as `}}`.
                    self.push(TokenKind::RBrace, "}");
                    self.push(TokenKind::RBrace, "}");
                }
            }
            RawToken::Str => {
                let content = text[1..text.len() - 1].to_string();
                self.push(TokenKind::Str, content);
            }
            _ => {
                let kind = plain_kind(raw);
                self.push(kind, text);
            }
        }
        Ok(true)
    }

    /// Lex one literal-mode step: a command word, one run of argument text,
    /// a replacement opener or the block end.
    fn literal_step(&mut self) -> Result<(), LexError> {
        if !self.in_command {
            self.skip_blanks();
            let rem = self.inner.remainder();
            if rem.is_empty() {
                return Err(LexError::UnterminatedBlock { line: self.line() });
            }
            if rem.starts_with("-}}") {
                self.inner.bump(3);
                self.push(TokenKind::DfEnd, "-}}");
                self.mode = Mode::Expression;
                return Ok(());
            }
            if rem.starts_with("{{") {
                self.inner.bump(2);
                self.push(TokenKind::ReplaceOpen, "{{");
                self.mode = Mode::Expression;
                self.in_replacement = true;
                self.in_command = true;
                return Ok(());
            }

            let word_len = rem
                .char_indices()
                .find(|&(i, c)| {
                    c.is_ascii_whitespace()
                        || rem[i..].starts_with("{{")
                        || rem[i..].starts_with("-}}")
                })
                .map(|(i, _)| i)
                .unwrap_or(rem.len());
            let word = &rem[..word_len];
            if DOCKERFILE_COMMANDS.contains(word) {
                let word = word.to_string();
                self.inner.bump(word_len);
                self.push(TokenKind::Command, word);
            }
            // A non-command first word is plain argument text; leave it
            // unconsumed and rescan in argument mode.
            self.in_command = true;
            return Ok(());
        }

        self.argument_step()
    }

    /// Scan one run of argument text up to `-}}`, `{{` or the line end.
    fn argument_step(&mut self) -> Result<(), LexError> {
        let rem = self.inner.remainder();
        let mut text = String::new();
        let mut i = 0;

        loop {
            if i >= rem.len() {
                return Err(LexError::UnterminatedBlock { line: self.line() });
            }
            if rem[i..].starts_with("-}}") {
                let mut arg = text.trim_end_matches([' ', '\t']).to_string();
                arg.push('\n');
                self.push(TokenKind::DfArg, arg);
                self.inner.bump(i + 3);
                self.push(TokenKind::DfEnd, "-}}");
                self.mode = Mode::Expression;
                self.in_command = false;
                return Ok(());
            }
            if rem[i..].starts_with("{{") {
                if !text.is_empty() {
                    self.push(TokenKind::DfArg, text);
                }
                self.inner.bump(i + 2);
                self.push(TokenKind::ReplaceOpen, "{{");
                self.mode = Mode::Expression;
                self.in_replacement = true;
                return Ok(());
            }

            let c = rem[i..].chars().next().unwrap_or('\0');
            match c {
                '\n' => {
                    text.push('\n');
                    // Dockerfile line continuation keeps the same command.
                    self.in_command = text.trim_end().ends_with('\\');
                    self.push(TokenKind::DfArg, text);
                    self.inner.bump(i + 1);
                    self.inner.extras += 1;
                    return Ok(());
                }
                '"' => {
                    let rest = &rem[i + 1..];
                    let close = rest
                        .find(['"', '\n'])
                        .filter(|&j| rest.as_bytes()[j] == b'"')
                        .ok_or(LexError::UnterminatedString { line: self.line() })?;
                    text.push_str(&rest[..close]);
                    i += close + 2;
                }
                _ => {
                    text.push(c);
                    i += c.len_utf8();
                }
            }
        }
    }

    /// Skip whitespace, counting newlines. Only valid between commands.
    fn skip_blanks(&mut self) {
        loop {
            let rem = self.inner.remainder();
            let mut len = 0;
            for c in rem.chars() {
                if c == '\n' {
                    self.inner.extras += 1;
                } else if !c.is_ascii_whitespace() {
                    break;
                }
                len += c.len_utf8();
            }
            if len == 0 {
                return;
            }
            self.inner.bump(len);
        }
    }
}

fn plain_kind(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::Comma => TokenKind::Comma,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Define => TokenKind::Define,
        RawToken::Assign => TokenKind::Assign,
        RawToken::Equal => TokenKind::Equal,
        RawToken::NotEqual => TokenKind::NotEqual,
        RawToken::Not => TokenKind::Not,
        RawToken::And => TokenKind::And,
        RawToken::Or => TokenKind::Or,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Redirect => TokenKind::Redirect,
        RawToken::Import => TokenKind::Import,
        RawToken::From => TokenKind::From,
        RawToken::Main => TokenKind::Main,
        RawToken::If => TokenKind::If,
        RawToken::Else => TokenKind::Else,
        RawToken::For => TokenKind::For,
        RawToken::In => TokenKind::In,
        RawToken::Keys => TokenKind::Keys,
        RawToken::JsonUnmarshal => TokenKind::JsonUnmarshal,
        RawToken::Append => TokenKind::Append,
        RawToken::Sort => TokenKind::Sort,
        RawToken::Split => TokenKind::Split,
        RawToken::TrimLeft => TokenKind::TrimLeft,
        RawToken::TrimRight => TokenKind::TrimRight,
        RawToken::StartWith => TokenKind::StartWith,
        RawToken::EndWith => TokenKind::EndWith,
        RawToken::Number => TokenKind::Number,
        RawToken::Ident => TokenKind::Ident,
        RawToken::Newline | RawToken::DfBegin | RawToken::ReplaceClose | RawToken::Str => {
            // Handled by the caller before reaching here.
            TokenKind::Ident
        }
    }
}
