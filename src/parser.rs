//! Recursive-descent parser for Myriad.
//!
//! Tokens go in, a [`FunctionTable`] comes out: one flat instruction list per
//! function, with if/elif jump offsets already computed. Imports re-invoke
//! the lexer and parser on the target file through the [`FileReader`]
//! collaborator; every distinct path is compiled at most once, and the
//! resulting tables are merged. `JsonUnmarshal` files are loaded and parsed
//! here too, so the generator only ever sees materialized maps.
//!
//! The grammar needs backtracking in a few value positions (a trim
//! expression and a plain value both start with a single value, `x.keys` and
//! `x.split(...)` both start with an identifier and a dot). Those productions
//! save and restore the token index instead of looking arbitrarily far ahead.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::code::{ComparisonOp, ConditionalNode, FunctionTable, Instruction, Jump, LogicalOp};
use crate::files::FileReader;
use crate::lexer::{self, LexError, Token, TokenKind};
use crate::value::{TrimSide, Value};

/// Parsing failures. All abort the compilation immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// An expected-token mismatch, with the offending line.
    Syntax { message: String, line: usize },
    /// A function name declared (or imported) twice.
    DuplicateFunction { name: String },
    /// A call to a function that exists nowhere in the reachable files.
    UndefinedFunction { name: String },
    /// A source or JSON file could not be read.
    Read { path: String, message: String },
    /// A `JsonUnmarshal` target was not a JSON object.
    Json { path: String, message: String },
    /// An imported file failed to lex.
    Lex(LexError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax { message, line } => {
                write!(f, "syntax error: {message} at line {line}")
            }
            ParseError::DuplicateFunction { name } => {
                write!(f, "semantic error: {name} is already declared")
            }
            ParseError::UndefinedFunction { name } => {
                write!(f, "semantic error: {name} is not defined")
            }
            ParseError::Read { path, message } => write!(f, "cannot read {path}: {message}"),
            ParseError::Json { path, message } => {
                write!(f, "cannot load JSON from {path}: {message}")
            }
            ParseError::Lex(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::Lex(err)
    }
}

/// Read, lex and parse the entry file and everything it imports.
pub fn parse_file(path: &str, reader: &dyn FileReader) -> Result<FunctionTable, ParseError> {
    let mut compiled = HashSet::new();
    compiled.insert(path.to_string());
    let table = parse_path(path, reader, &mut compiled)?;
    validate(&table)?;
    Ok(table)
}

/// Parse an already-lexed entry file. Imports still resolve through `reader`.
pub fn parse_tokens(
    tokens: Vec<Token>,
    reader: &dyn FileReader,
) -> Result<FunctionTable, ParseError> {
    let mut compiled = HashSet::new();
    let mut parser = Parser::new(tokens, reader);
    parser.program(&mut compiled)?;
    validate(&parser.table)?;
    Ok(parser.table)
}

/// Every called function must exist somewhere in the merged table.
pub fn validate(table: &FunctionTable) -> Result<(), ParseError> {
    for codes in table.values() {
        for code in codes {
            if let Instruction::CallProc { name, .. } = code {
                if !table.contains_key(name) {
                    return Err(ParseError::UndefinedFunction { name: name.clone() });
                }
            }
        }
    }
    Ok(())
}

fn parse_path(
    path: &str,
    reader: &dyn FileReader,
    compiled: &mut HashSet<String>,
) -> Result<FunctionTable, ParseError> {
    let source = reader.read(path).map_err(|err| ParseError::Read {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    let tokens = lexer::tokenize(&source)?;
    let mut parser = Parser::new(tokens, reader);
    parser.program(compiled)?;
    Ok(parser.table)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    table: FunctionTable,
    reader: &'a dyn FileReader,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, reader: &'a dyn FileReader) -> Self {
        Parser {
            tokens,
            index: 0,
            table: HashMap::new(),
            reader,
        }
    }

    fn kind(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.index + offset).map(|t| t.kind)
    }

    fn is(&self, kind: TokenKind, offset: usize) -> bool {
        self.kind(offset) == Some(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.is(kind, 0) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            message: message.into(),
            line: self.line(),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        match self.tokens.get(self.index) {
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.index += 1;
                Ok(token)
            }
            _ => Err(self.syntax(format!("cannot find {what}"))),
        }
    }

    // program := { import } { function } [ main-function ]
    fn program(&mut self, compiled: &mut HashSet<String>) -> Result<(), ParseError> {
        while self.is(TokenKind::Import, 0) {
            self.import_statement(compiled)?;
        }
        while self.is(TokenKind::Ident, 0) {
            let name = self.expect(TokenKind::Ident, "a function name")?.text;
            self.function(name)?;
        }
        if self.is(TokenKind::Main, 0) {
            self.expect(TokenKind::Main, "'main'")?;
            self.function("main".to_string())?;
        }
        if self.index < self.tokens.len() {
            return Err(self.syntax("unexpected token after the last function"));
        }
        Ok(())
    }

    // import := "import" NAME "from" STRING
    fn import_statement(&mut self, compiled: &mut HashSet<String>) -> Result<(), ParseError> {
        self.expect(TokenKind::Import, "'import'")?;
        self.expect(TokenKind::Ident, "an imported name")?;
        self.expect(TokenKind::From, "'from'")?;
        let path = self.expect(TokenKind::Str, "a file path")?.text;

        // Each distinct path compiles at most once; the set already holds
        // every file on the current import chain, so cycles stop here.
        if !compiled.insert(path.clone()) {
            return Ok(());
        }

        let imported = parse_path(&path, self.reader, compiled)?;
        for (name, codes) in imported {
            if self.table.contains_key(&name) {
                return Err(ParseError::DuplicateFunction { name });
            }
            self.table.insert(name, codes);
        }
        Ok(())
    }

    // function := NAME "(" [ parameters ] ")" block
    fn function(&mut self, name: String) -> Result<(), ParseError> {
        if self.table.contains_key(&name) {
            return Err(ParseError::DuplicateFunction { name });
        }
        let mut codes = self.parameters()?;
        codes.extend(self.block()?);
        self.table.insert(name, codes);
        Ok(())
    }

    // Each parameter becomes a leading `Define` with no initializer.
    fn parameters(&mut self) -> Result<Vec<Instruction>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut codes = Vec::new();
        if self.is(TokenKind::Ident, 0) {
            loop {
                let key = self.expect(TokenKind::Ident, "a parameter name")?.text;
                codes.push(Instruction::Define { key, value: None });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(codes)
    }

    fn block(&mut self) -> Result<Vec<Instruction>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut codes = Vec::new();
        loop {
            if self.is(TokenKind::DfBegin, 0) {
                codes.extend(self.dockerfile_block()?);
            } else if self.is(TokenKind::If, 0) {
                codes.extend(self.if_block()?);
            } else if self.is(TokenKind::For, 0) {
                codes.extend(self.for_block()?);
            } else if self.is(TokenKind::Ident, 0) {
                if self.is(TokenKind::Redirect, 1) {
                    codes.extend(self.output_block()?);
                } else if self.is(TokenKind::LParen, 1) {
                    codes.push(self.function_call()?);
                } else if self.is(TokenKind::Define, 1) {
                    codes.push(self.define_statement()?);
                } else if self.is(TokenKind::Assign, 1) {
                    codes.push(self.assign_statement()?);
                } else if self.is(TokenKind::Dot, 1) && self.is(TokenKind::Append, 2) {
                    codes.push(self.append_statement()?);
                } else if self.is(TokenKind::Dot, 1) && self.is(TokenKind::Sort, 2) {
                    codes.push(self.sort_statement()?);
                } else {
                    return Err(self.syntax("cannot parse a statement"));
                }
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(codes)
    }

    // dockerfile-block := "{{-" { COMMAND | DFARG | replacement } "-}}"
    fn dockerfile_block(&mut self) -> Result<Vec<Instruction>, ParseError> {
        self.expect(TokenKind::DfBegin, "'{{-'")?;
        let mut codes = Vec::new();
        loop {
            if self.is(TokenKind::Command, 0) {
                let token = self.expect(TokenKind::Command, "a Dockerfile command")?;
                codes.push(Instruction::Command(token.text));
            } else if self.is(TokenKind::DfArg, 0) {
                let token = self.expect(TokenKind::DfArg, "Dockerfile argument text")?;
                codes.push(Instruction::Literal(token.text));
            } else if self.is(TokenKind::ReplaceOpen, 0) {
                codes.push(self.replacement()?);
            } else {
                break;
            }
        }
        self.expect(TokenKind::DfEnd, "'-}}'")?;
        Ok(codes)
    }

    // replacement := "{{" single-formula "}}"
    fn replacement(&mut self) -> Result<Instruction, ParseError> {
        self.expect(TokenKind::ReplaceOpen, "'{{'")?;
        let value = self.single_formula()?;
        self.expect(TokenKind::ReplaceClose, "'}}'")?;
        Ok(Instruction::Replace(value))
    }

    fn function_call(&mut self) -> Result<Instruction, ParseError> {
        let name = self.expect(TokenKind::Ident, "a function name")?.text;
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if matches!(
            self.kind(0),
            Some(
                TokenKind::Str | TokenKind::Ident | TokenKind::LBrace | TokenKind::JsonUnmarshal
            )
        ) {
            loop {
                args.push(self.assign_value()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Instruction::CallProc { name, args })
    }

    fn define_statement(&mut self) -> Result<Instruction, ParseError> {
        let key = self.expect(TokenKind::Ident, "a variable name")?.text;
        self.expect(TokenKind::Define, "':='")?;
        let value = self.assign_value()?;
        Ok(Instruction::Define {
            key,
            value: Some(value),
        })
    }

    fn assign_statement(&mut self) -> Result<Instruction, ParseError> {
        let key = self.expect(TokenKind::Ident, "a variable name")?.text;
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.assign_value()?;
        Ok(Instruction::Assign { key, value })
    }

    fn append_statement(&mut self) -> Result<Instruction, ParseError> {
        let array = self.expect(TokenKind::Ident, "an array name")?.text;
        self.expect(TokenKind::Dot, "'.'")?;
        self.expect(TokenKind::Append, "'append'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let element = self.single_formula()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Instruction::Append { array, element })
    }

    fn sort_statement(&mut self) -> Result<Instruction, ParseError> {
        let array = self.expect(TokenKind::Ident, "an array name")?.text;
        self.expect(TokenKind::Dot, "'.'")?;
        self.expect(TokenKind::Sort, "'sort'")?;
        self.expect(TokenKind::LParen, "'('")?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Instruction::Sort { array })
    }

    // if-block := if-section { elif-section } [ else-section ]
    //
    // Each branch flattens to head, body, End. Once the whole chain is known
    // the heads get their offsets: `on_false` skips one branch, `on_true`
    // leaves the chain.
    fn if_block(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let mut codes = Vec::new();
        let mut heads = Vec::new();

        let section = self.if_section(false)?;
        heads.push((0, section.len()));
        codes.extend(section);

        while self.is(TokenKind::Else, 0) && self.is(TokenKind::If, 1) {
            let at = codes.len();
            let section = self.if_section(true)?;
            heads.push((at, section.len()));
            codes.extend(section);
        }

        if self.is(TokenKind::Else, 0) {
            codes.extend(self.else_section()?);
        }

        let total = codes.len();
        for (at, len) in heads {
            match &mut codes[at] {
                Instruction::If { jump, .. } | Instruction::Elif { jump, .. } => {
                    *jump = Jump {
                        on_true: total - at,
                        on_false: len,
                    };
                }
                _ => {}
            }
        }

        Ok(codes)
    }

    fn if_section(&mut self, elif: bool) -> Result<Vec<Instruction>, ParseError> {
        if elif {
            self.expect(TokenKind::Else, "'else'")?;
        }
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let condition = self.condition()?;
        self.expect(TokenKind::RParen, "')'")?;

        let head = if elif {
            Instruction::Elif {
                condition,
                jump: Jump::default(),
            }
        } else {
            Instruction::If {
                condition,
                jump: Jump::default(),
            }
        };
        let mut codes = vec![head];
        codes.extend(self.block()?);
        codes.push(Instruction::End);
        Ok(codes)
    }

    fn else_section(&mut self) -> Result<Vec<Instruction>, ParseError> {
        self.expect(TokenKind::Else, "'else'")?;
        let mut codes = vec![Instruction::Else];
        codes.extend(self.block()?);
        codes.push(Instruction::End);
        Ok(codes)
    }

    // for-block := "for" "(" NAME "in" iterable ")" block
    fn for_block(&mut self) -> Result<Vec<Instruction>, ParseError> {
        self.expect(TokenKind::For, "'for'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let iterator = self.expect(TokenKind::Ident, "an iterator name")?.text;
        self.expect(TokenKind::In, "'in'")?;

        let iterable = if self.is(TokenKind::Ident, 0) && self.is(TokenKind::Dot, 1) {
            self.map_key()?
        } else if self.is(TokenKind::Ident, 0) && self.is(TokenKind::LBracket, 1) {
            self.map_value()?
        } else {
            Value::Ident(self.expect(TokenKind::Ident, "an iterable name")?.text)
        };

        self.expect(TokenKind::RParen, "')'")?;
        let mut codes = vec![Instruction::For { iterator, iterable }];
        codes.extend(self.block()?);
        codes.push(Instruction::End);
        Ok(codes)
    }

    // output-block := NAME "<<" block
    fn output_block(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let name = self.expect(TokenKind::Ident, "a variable name")?.text;
        self.expect(TokenKind::Redirect, "'<<'")?;
        let mut codes = vec![Instruction::Output(Value::Ident(name))];
        codes.extend(self.block()?);
        codes.push(Instruction::End);
        Ok(codes)
    }

    // condition := term { "||" term }
    fn condition(&mut self) -> Result<ConditionalNode, ParseError> {
        let mut root = self.condition_term()?;
        while self.eat(TokenKind::Or) {
            let right = self.condition_term()?;
            root = ConditionalNode::Logical {
                op: LogicalOp::Or,
                left: Box::new(root),
                right: Box::new(right),
            };
        }
        Ok(root)
    }

    // term := factor { "&&" factor }
    fn condition_term(&mut self) -> Result<ConditionalNode, ParseError> {
        let mut root = self.condition_factor()?;
        while self.eat(TokenKind::And) {
            let right = self.condition_factor()?;
            root = ConditionalNode::Logical {
                op: LogicalOp::And,
                left: Box::new(root),
                right: Box::new(right),
            };
        }
        Ok(root)
    }

    // factor := "(" condition ")" | comparison | string-predicate
    fn condition_factor(&mut self) -> Result<ConditionalNode, ParseError> {
        if self.eat(TokenKind::LParen) {
            let node = self.condition()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(node);
        }

        let saved = self.index;
        if let Ok(node) = self.comparison() {
            return Ok(node);
        }
        self.index = saved;
        if let Ok(node) = self.string_predicate() {
            return Ok(node);
        }
        self.index = saved;
        Err(self.syntax("cannot parse a condition"))
    }

    // comparison := single-formula ("==" | "!=") single-formula
    fn comparison(&mut self) -> Result<ConditionalNode, ParseError> {
        let left = self.single_formula()?;
        let op = if self.eat(TokenKind::Equal) {
            ComparisonOp::Equal
        } else if self.eat(TokenKind::NotEqual) {
            ComparisonOp::NotEqual
        } else {
            return Err(self.syntax("cannot find a comparison operator"));
        };
        let right = self.single_formula()?;
        Ok(ConditionalNode::Comparison {
            op,
            negated: false,
            left,
            right,
        })
    }

    // string-predicate := [ "!" ] value "." ("startWith" | "endWith") "(" value ")"
    fn string_predicate(&mut self) -> Result<ConditionalNode, ParseError> {
        let negated = self.eat(TokenKind::Not);
        let left = self.single_value()?;
        self.expect(TokenKind::Dot, "'.'")?;
        let op = if self.eat(TokenKind::StartWith) {
            ComparisonOp::StartWith
        } else if self.eat(TokenKind::EndWith) {
            ComparisonOp::EndWith
        } else {
            return Err(self.syntax("cannot find 'startWith' or 'endWith'"));
        };
        self.expect(TokenKind::LParen, "'('")?;
        let right = self.single_value()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(ConditionalNode::Comparison {
            op,
            negated,
            left,
            right,
        })
    }

    // assign-value := array-literal | json-load | map-key | split | single-formula
    fn assign_value(&mut self) -> Result<Value, ParseError> {
        if self.is(TokenKind::LBrace, 0) {
            return Ok(Value::Literals(self.array_literal()?));
        }
        if self.is(TokenKind::JsonUnmarshal, 0) {
            return self.json_unmarshal();
        }
        let saved = self.index;
        if let Ok(value) = self.map_key() {
            return Ok(value);
        }
        self.index = saved;
        if let Ok(value) = self.split_formula() {
            return Ok(value);
        }
        self.index = saved;
        self.single_formula()
    }

    // single-formula := operand { "+" operand }
    fn single_formula(&mut self) -> Result<Value, ParseError> {
        let first = self.formula_operand()?;
        if !self.is(TokenKind::Plus, 0) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat(TokenKind::Plus) {
            parts.push(self.formula_operand()?);
        }
        Ok(Value::AddString(parts))
    }

    // operand := trim-formula | single-value
    fn formula_operand(&mut self) -> Result<Value, ParseError> {
        let saved = self.index;
        if let Ok(value) = self.trim_formula() {
            return Ok(value);
        }
        self.index = saved;
        self.single_value()
    }

    // trim-formula := single-value "." ("trimLeft" | "trimRight") "(" single-value ")"
    fn trim_formula(&mut self) -> Result<Value, ParseError> {
        let target = self.single_value()?;
        self.expect(TokenKind::Dot, "'.'")?;
        let side = if self.eat(TokenKind::TrimLeft) {
            TrimSide::Left
        } else if self.eat(TokenKind::TrimRight) {
            TrimSide::Right
        } else {
            return Err(self.syntax("cannot find 'trimLeft' or 'trimRight'"));
        };
        self.expect(TokenKind::LParen, "'('")?;
        let trim = self.single_value()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Value::TrimString {
            target: Box::new(target),
            trim: Box::new(trim),
            side,
        })
    }

    // split-formula := single-value "." "split" "(" single-value ")"
    fn split_formula(&mut self) -> Result<Value, ParseError> {
        let target = self.single_value()?;
        self.expect(TokenKind::Dot, "'.'")?;
        self.expect(TokenKind::Split, "'split'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let sep = self.single_value()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Value::SplitString {
            target: Box::new(target),
            sep: Box::new(sep),
        })
    }

    // single-value := STRING | NAME "[" NUMBER "]" | NAME "[" key "]"... | NAME
    fn single_value(&mut self) -> Result<Value, ParseError> {
        if self.is(TokenKind::Str, 0) {
            let text = self.expect(TokenKind::Str, "a string")?.text;
            return Ok(Value::Literal(text));
        }
        if self.is(TokenKind::Ident, 0) && self.is(TokenKind::LBracket, 1) {
            if self.is(TokenKind::Number, 2) {
                return self.element();
            }
            return self.map_value();
        }
        if self.is(TokenKind::Ident, 0) {
            let name = self.expect(TokenKind::Ident, "a value")?.text;
            return Ok(Value::Ident(name));
        }
        Err(self.syntax("cannot parse a value"))
    }

    fn element(&mut self) -> Result<Value, ParseError> {
        let name = self.expect(TokenKind::Ident, "an array name")?.text;
        self.expect(TokenKind::LBracket, "'['")?;
        let number = self.expect(TokenKind::Number, "a number")?;
        let index: usize = number.text.parse().map_err(|_| ParseError::Syntax {
            message: format!("invalid array index {}", number.text),
            line: number.line,
        })?;
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Value::Element { name, index })
    }

    // map-value := NAME ( "[" single-formula "]" )+
    fn map_value(&mut self) -> Result<Value, ParseError> {
        let name = self.expect(TokenKind::Ident, "a map name")?.text;
        let mut keys = Vec::new();
        while self.eat(TokenKind::LBracket) {
            keys.push(self.single_formula()?);
            self.expect(TokenKind::RBracket, "']'")?;
        }
        if keys.is_empty() {
            return Err(self.syntax("cannot find '['"));
        }
        Ok(Value::MapValue { name, keys })
    }

    // map-key := NAME "." "keys"
    fn map_key(&mut self) -> Result<Value, ParseError> {
        let name = self.expect(TokenKind::Ident, "a map name")?.text;
        self.expect(TokenKind::Dot, "'.'")?;
        self.expect(TokenKind::Keys, "'keys'")?;
        Ok(Value::MapKey { name })
    }

    // array-literal := "{" STRING { "," STRING } "}"
    fn array_literal(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut items = vec![self.expect(TokenKind::Str, "a string")?.text];
        while self.eat(TokenKind::Comma) {
            items.push(self.expect(TokenKind::Str, "a string")?.text);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(items)
    }

    // json-load := "JsonUnmarshal" "(" STRING ")", resolved at parse time.
    fn json_unmarshal(&mut self) -> Result<Value, ParseError> {
        self.expect(TokenKind::JsonUnmarshal, "'JsonUnmarshal'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let path = self.expect(TokenKind::Str, "a file path")?.text;
        self.expect(TokenKind::RParen, "')'")?;

        let source = self.reader.read(&path).map_err(|err| ParseError::Read {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let data: serde_json::Value =
            serde_json::from_str(&source).map_err(|err| ParseError::Json {
                path: path.clone(),
                message: err.to_string(),
            })?;
        match data {
            serde_json::Value::Object(map) => Ok(Value::Map(map)),
            _ => Err(ParseError::Json {
                path,
                message: "top-level value is not an object".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemoryReader;

    fn parse(source: &str) -> FunctionTable {
        parse_with(source, &MemoryReader::new())
    }

    fn parse_with(source: &str, reader: &MemoryReader) -> FunctionTable {
        let tokens = lexer::tokenize(source).expect("lexes");
        parse_tokens(tokens, reader).expect("parses")
    }

    fn parse_err(source: &str) -> ParseError {
        let tokens = lexer::tokenize(source).expect("lexes");
        parse_tokens(tokens, &MemoryReader::new()).expect_err("fails")
    }

    #[test]
    fn parameters_become_leading_defines() {
        let table = parse("f(a, b) { }");
        assert_eq!(
            table["f"],
            vec![
                Instruction::Define {
                    key: "a".to_string(),
                    value: None
                },
                Instruction::Define {
                    key: "b".to_string(),
                    value: None
                },
            ]
        );
    }

    #[test]
    fn define_assign_append_sort() {
        let table = parse(
            "main(){ xs := {\"b\", \"a\"} xs.append(\"c\") xs.sort() x := \"v\" x = xs[0] }",
        );
        assert_eq!(
            table["main"],
            vec![
                Instruction::Define {
                    key: "xs".to_string(),
                    value: Some(Value::Literals(vec!["b".to_string(), "a".to_string()])),
                },
                Instruction::Append {
                    array: "xs".to_string(),
                    element: Value::Literal("c".to_string()),
                },
                Instruction::Sort {
                    array: "xs".to_string()
                },
                Instruction::Define {
                    key: "x".to_string(),
                    value: Some(Value::Literal("v".to_string())),
                },
                Instruction::Assign {
                    key: "x".to_string(),
                    value: Value::Element {
                        name: "xs".to_string(),
                        index: 0
                    },
                },
            ]
        );
    }

    #[test]
    fn dockerfile_block_flattens_to_fragments() {
        let table = parse("main(){ {{- RUN {{ x }} -}} }");
        assert_eq!(
            table["main"],
            vec![
                Instruction::Command("RUN".to_string()),
                Instruction::Literal(" ".to_string()),
                Instruction::Replace(Value::Ident("x".to_string())),
                Instruction::Literal("\n".to_string()),
            ]
        );
    }

    #[test]
    fn if_chain_offsets() {
        let table = parse(concat!(
            "main(){ x := \"a\" ",
            "if (x == \"a\") { {{- RUN a -}} } ",
            "else if (x == \"b\") { {{- RUN b -}} } ",
            "else { {{- RUN c -}} } }",
        ));
        let codes = &table["main"];
        // Chain starts after the define: If head, body (Command + Literal),
        // End; same for the elif; Else, body, End.
        assert_eq!(codes.len(), 13);
        match &codes[1] {
            Instruction::If { jump, .. } => {
                assert_eq!(*jump, Jump { on_true: 12, on_false: 4 });
            }
            other => panic!("expected If head, got {other:?}"),
        }
        match &codes[5] {
            Instruction::Elif { jump, .. } => {
                assert_eq!(*jump, Jump { on_true: 8, on_false: 4 });
            }
            other => panic!("expected Elif head, got {other:?}"),
        }
        assert_eq!(codes[9], Instruction::Else);
        assert_eq!(codes[12], Instruction::End);
    }

    #[test]
    fn nested_if_offsets_span_the_inner_chain() {
        let table = parse(concat!(
            "main(){ if (x == \"a\") { if (y == \"b\") { {{- RUN a -}} } } ",
            "else { {{- RUN c -}} } }",
        ));
        let codes = &table["main"];
        // Outer If at 0; inner chain occupies 1..=5 (If, Command, Literal,
        // End, End is outer's)... inner: If(1) Command(2) Literal(3) End(4),
        // outer End(5), Else(6) Command(7) Literal(8) End(9).
        assert_eq!(codes.len(), 10);
        match &codes[0] {
            Instruction::If { jump, .. } => {
                assert_eq!(*jump, Jump { on_true: 10, on_false: 6 });
            }
            other => panic!("expected If head, got {other:?}"),
        }
        match &codes[1] {
            Instruction::If { jump, .. } => {
                assert_eq!(*jump, Jump { on_true: 4, on_false: 4 });
            }
            other => panic!("expected inner If head, got {other:?}"),
        }
    }

    #[test]
    fn condition_tree_is_left_associative() {
        let table = parse("main(){ if (a == \"1\" && b == \"2\" || c == \"3\") { } }");
        let codes = &table["main"];
        match &codes[0] {
            Instruction::If { condition, .. } => match condition {
                ConditionalNode::Logical { op, left, .. } => {
                    assert_eq!(*op, LogicalOp::Or);
                    assert!(matches!(
                        **left,
                        ConditionalNode::Logical {
                            op: LogicalOp::And,
                            ..
                        }
                    ));
                }
                other => panic!("expected a logical root, got {other:?}"),
            },
            other => panic!("expected If head, got {other:?}"),
        }
    }

    #[test]
    fn negated_string_predicate() {
        let table = parse("main(){ if (!x.startWith(\"v\")) { } }");
        match &table["main"][0] {
            Instruction::If { condition, .. } => {
                assert_eq!(
                    *condition,
                    ConditionalNode::Comparison {
                        op: ComparisonOp::StartWith,
                        negated: true,
                        left: Value::Ident("x".to_string()),
                        right: Value::Literal("v".to_string()),
                    }
                );
            }
            other => panic!("expected If head, got {other:?}"),
        }
    }

    #[test]
    fn concat_split_and_trim_values() {
        let table = parse(concat!(
            "main(){ a := \"x\" + v + \"y\" ",
            "b := \"v1.2\".trimLeft(\"v\") ",
            "c := \"a,b\".split(\",\") }",
        ));
        assert_eq!(
            table["main"][0],
            Instruction::Define {
                key: "a".to_string(),
                value: Some(Value::AddString(vec![
                    Value::Literal("x".to_string()),
                    Value::Ident("v".to_string()),
                    Value::Literal("y".to_string()),
                ])),
            }
        );
        assert_eq!(
            table["main"][1],
            Instruction::Define {
                key: "b".to_string(),
                value: Some(Value::TrimString {
                    target: Box::new(Value::Literal("v1.2".to_string())),
                    trim: Box::new(Value::Literal("v".to_string())),
                    side: TrimSide::Left,
                }),
            }
        );
        assert_eq!(
            table["main"][2],
            Instruction::Define {
                key: "c".to_string(),
                value: Some(Value::SplitString {
                    target: Box::new(Value::Literal("a,b".to_string())),
                    sep: Box::new(Value::Literal(",".to_string())),
                }),
            }
        );
    }

    #[test]
    fn map_value_chain_and_keys() {
        let table = parse("main(){ v := m[\"a\"][k] for (x in m.keys) { } }");
        assert_eq!(
            table["main"][0],
            Instruction::Define {
                key: "v".to_string(),
                value: Some(Value::MapValue {
                    name: "m".to_string(),
                    keys: vec![
                        Value::Literal("a".to_string()),
                        Value::Ident("k".to_string())
                    ],
                }),
            }
        );
        assert_eq!(
            table["main"][1],
            Instruction::For {
                iterator: "x".to_string(),
                iterable: Value::MapKey {
                    name: "m".to_string()
                },
            }
        );
    }

    #[test]
    fn output_block_wraps_its_body() {
        let table = parse("main(){ p := \"Dockerfile.web\" p << { {{- RUN a -}} } }");
        assert_eq!(
            table["main"][1..],
            [
                Instruction::Output(Value::Ident("p".to_string())),
                Instruction::Command("RUN".to_string()),
                Instruction::Literal(" a\n".to_string()),
                Instruction::End,
            ]
        );
    }

    #[test]
    fn call_with_arguments() {
        let table = parse("base(v) { } main(){ base(\"ubuntu\") }");
        assert_eq!(
            table["main"],
            vec![Instruction::CallProc {
                name: "base".to_string(),
                args: vec![Value::Literal("ubuntu".to_string())],
            }]
        );
    }

    #[test]
    fn duplicate_function_is_rejected() {
        assert_eq!(
            parse_err("f() { } f() { }"),
            ParseError::DuplicateFunction {
                name: "f".to_string()
            }
        );
    }

    #[test]
    fn undefined_call_is_rejected() {
        assert_eq!(
            parse_err("main(){ foo() }"),
            ParseError::UndefinedFunction {
                name: "foo".to_string()
            }
        );
    }

    #[test]
    fn json_unmarshal_loads_an_object() {
        let mut reader = MemoryReader::new();
        reader.add("config.json", "{\"name\": \"app\"}");
        let table = parse_with("main(){ cfg := JsonUnmarshal(\"config.json\") }", &reader);
        match &table["main"][0] {
            Instruction::Define {
                value: Some(Value::Map(map)),
                ..
            } => {
                assert_eq!(map["name"], serde_json::Value::String("app".to_string()));
            }
            other => panic!("expected a map define, got {other:?}"),
        }
    }

    #[test]
    fn json_unmarshal_rejects_non_objects() {
        let mut reader = MemoryReader::new();
        reader.add("list.json", "[1, 2]");
        let tokens = lexer::tokenize("main(){ cfg := JsonUnmarshal(\"list.json\") }").unwrap();
        let err = parse_tokens(tokens, &reader).expect_err("fails");
        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn imports_merge_once_and_tolerate_cycles() {
        let mut reader = MemoryReader::new();
        reader.add(
            "lib.myd",
            "import helper from \"cyclic.myd\"\nbase() { {{- FROM ubuntu -}} }",
        );
        reader.add("cyclic.myd", "import base from \"lib.myd\"\nhelper() { }");
        let source = concat!(
            "import base from \"lib.myd\"\n",
            "import base from \"lib.myd\"\n",
            "main(){ base() helper() }",
        );
        let table = parse_with(source, &reader);
        assert!(table.contains_key("base"));
        assert!(table.contains_key("helper"));
        assert!(table.contains_key("main"));
    }

    #[test]
    fn imported_duplicate_is_rejected() {
        let mut reader = MemoryReader::new();
        reader.add("lib.myd", "f() { }");
        let tokens = lexer::tokenize("import f from \"lib.myd\"\nf() { } main(){ }").unwrap();
        let err = parse_tokens(tokens, &reader).expect_err("fails");
        assert_eq!(
            err,
            ParseError::DuplicateFunction {
                name: "f".to_string()
            }
        );
    }

    #[test]
    fn syntax_error_carries_the_line() {
        let err = parse_err("main(){\n x := \n}");
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 3),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }
}
