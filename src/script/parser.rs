//! Recursive-descent parser for the script grammar.
//!
//! A pure function: text in, AST out, or a structured error with a line
//! number. Comments run from `#` to end of line. Strings are double-quoted
//! with `\"` and `\\` escapes.

use super::ast::{Operator, ScriptFile, Statement, Value};
use thiserror::Error;

/// Parse failure with source position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl ScriptError {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Parse a whole script file.
pub fn parse(text: &str) -> Result<ScriptFile, ScriptError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statements = parser.parse_statements(true)?;
    Ok(ScriptFile { statements })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Op(Operator),
    LBrace,
    RBrace,
}

/// Tokenize into (token, line) pairs.
fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1usize;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                // Comment to end of line.
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '{' => {
                chars.next();
                tokens.push((Token::LBrace, line));
            }
            '}' => {
                chars.next();
                tokens.push((Token::RBrace, line));
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push((Token::Op(Operator::Equals), line));
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push((Token::Op(Operator::NotEquals), line));
                } else {
                    return Err(ScriptError::syntax(line, "expected '=' after '!'"));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push((Token::Op(Operator::LessEq), line));
                } else {
                    tokens.push((Token::Op(Operator::Less), line));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push((Token::Op(Operator::GreaterEq), line));
                } else {
                    tokens.push((Token::Op(Operator::Greater), line));
                }
            }
            '"' => {
                let start_line = line;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some(other) => {
                                s.push('\\');
                                s.push(other);
                            }
                            None => break,
                        },
                        '\n' => {
                            line += 1;
                            s.push('\n');
                        }
                        other => s.push(other),
                    }
                }
                if !closed {
                    return Err(ScriptError::syntax(start_line, "unterminated string"));
                }
                tokens.push((Token::Word(s), start_line));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace()
                        || matches!(c, '{' | '}' | '=' | '!' | '<' | '>' | '"' | '#')
                    {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push((Token::Word(word), line));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Parse statements until EOF (top level) or a closing brace.
    fn parse_statements(&mut self, top_level: bool) -> Result<Vec<Statement>, ScriptError> {
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                None => {
                    if top_level {
                        return Ok(statements);
                    }
                    return Err(ScriptError::syntax(self.line(), "unclosed block"));
                }
                Some(Token::RBrace) => {
                    if top_level {
                        return Err(ScriptError::syntax(self.line(), "unexpected '}'"));
                    }
                    return Ok(statements);
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ScriptError> {
        let line = self.line();
        let key = match self.next() {
            Some(Token::Word(w)) => w,
            Some(_) => return Err(ScriptError::syntax(line, "expected identifier")),
            None => return Err(ScriptError::syntax(line, "unexpected end of input")),
        };
        let line = self.line();
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => {
                return Err(ScriptError::syntax(
                    line,
                    format!("expected operator after '{}'", key),
                ))
            }
        };
        let value = self.parse_value()?;
        Ok(Statement { key, op, value })
    }

    fn parse_value(&mut self) -> Result<Value, ScriptError> {
        let line = self.line();
        match self.next() {
            Some(Token::Word(w)) => Ok(Value::Scalar { raw: w }),
            Some(Token::LBrace) => self.parse_block_body(),
            Some(Token::RBrace) => Err(ScriptError::syntax(line, "expected value, found '}'")),
            Some(Token::Op(op)) => Err(ScriptError::syntax(
                line,
                format!("expected value, found '{}'", op),
            )),
            None => Err(ScriptError::syntax(line, "expected value")),
        }
    }

    /// Body of a `{ ... }` value. Either statements or a list of scalars,
    /// decided by whether the first word is followed by an operator.
    fn parse_block_body(&mut self) -> Result<Value, ScriptError> {
        let mut statements: Vec<Statement> = Vec::new();
        let mut items: Vec<String> = Vec::new();
        loop {
            match self.peek() {
                None => return Err(ScriptError::syntax(self.line(), "unclosed block")),
                Some(Token::RBrace) => {
                    self.next();
                    break;
                }
                Some(Token::Word(_)) => {
                    if matches!(self.peek_second(), Some(Token::Op(_))) {
                        if !items.is_empty() {
                            return Err(ScriptError::syntax(
                                self.line(),
                                "statement inside a list block",
                            ));
                        }
                        statements.push(self.parse_statement()?);
                    } else {
                        if !statements.is_empty() {
                            return Err(ScriptError::syntax(
                                self.line(),
                                "bare value inside a statement block",
                            ));
                        }
                        if let Some(Token::Word(w)) = self.next() {
                            items.push(w);
                        }
                    }
                }
                Some(tok) => {
                    let msg = match tok {
                        Token::LBrace => "unexpected '{' in block".to_string(),
                        Token::Op(op) => format!("unexpected '{}' in block", op),
                        _ => "unexpected token in block".to_string(),
                    };
                    return Err(ScriptError::syntax(self.line(), msg));
                }
            }
        }
        if !items.is_empty() {
            Ok(Value::List { items })
        } else {
            Ok(Value::Block { statements })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_statement() {
        let file = parse("tag = FRA").unwrap();
        assert_eq!(file.statements.len(), 1);
        assert_eq!(file.statements[0].key, "tag");
        assert_eq!(file.statements[0].op, Operator::Equals);
        assert_eq!(
            file.statements[0].value,
            Value::Scalar { raw: "FRA".into() }
        );
    }

    #[test]
    fn test_parse_nested_blocks() {
        let src = r#"
            country = {
                tag = FRA
                capital = 100
                government = {
                    type = monarchy
                }
            }
        "#;
        let file = parse(src).unwrap();
        assert_eq!(file.statements.len(), 1);
        match &file.statements[0].value {
            Value::Block { statements } => {
                assert_eq!(statements.len(), 3);
                assert_eq!(statements[2].key, "government");
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_block() {
        let file = parse("owned = { 1 2 3 }").unwrap();
        assert_eq!(
            file.statements[0].value,
            Value::List {
                items: vec!["1".into(), "2".into(), "3".into()]
            }
        );
    }

    #[test]
    fn test_parse_empty_block_is_statement_block() {
        let file = parse("modifiers = { }").unwrap();
        assert_eq!(
            file.statements[0].value,
            Value::Block { statements: vec![] }
        );
    }

    #[test]
    fn test_parse_comparison_operators() {
        let file = parse("age >= 16\nprestige < 100\nculture != norse").unwrap();
        assert_eq!(file.statements[0].op, Operator::GreaterEq);
        assert_eq!(file.statements[1].op, Operator::Less);
        assert_eq!(file.statements[2].op, Operator::NotEquals);
    }

    #[test]
    fn test_parse_quoted_string_with_escapes() {
        let file = parse(r#"name = "Kingdom of \"France\"""#).unwrap();
        assert_eq!(
            file.statements[0].value,
            Value::Scalar {
                raw: "Kingdom of \"France\"".into()
            }
        );
    }

    #[test]
    fn test_parse_comments_ignored() {
        let src = "# header comment\ntag = FRA # trailing\n# footer";
        let file = parse(src).unwrap();
        assert_eq!(file.statements.len(), 1);
    }

    #[test]
    fn test_parse_double_equals_accepted() {
        let file = parse("scope == root").unwrap();
        assert_eq!(file.statements[0].op, Operator::Equals);
    }

    #[test]
    fn test_error_missing_operator() {
        let err = parse("tag FRA").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected operator"), "got: {}", msg);
    }

    #[test]
    fn test_error_unclosed_block_reports_line() {
        let err = parse("a = {\nb = 1\n").unwrap_err();
        match err {
            ScriptError::Syntax { line, ref message } => {
                assert!(message.contains("unclosed"));
                assert!(line >= 2);
            }
        }
    }

    #[test]
    fn test_error_unterminated_string() {
        let err = parse("name = \"oops").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_error_top_level_close_brace() {
        let err = parse("}").unwrap_err();
        assert!(err.to_string().contains("unexpected '}'"));
    }

    #[test]
    fn test_error_mixed_block() {
        let err = parse("x = { 1 2 a = b }").unwrap_err();
        assert!(err.to_string().contains("statement inside a list block"));
    }

    #[test]
    fn test_node_count_matches_structure() {
        let file = parse("a = { b = 1 c = { 2 3 } }").unwrap();
        // a(1) + block(1) + b(1) + scalar(1) + c(1) + list(1) + 2 items
        assert_eq!(file.node_count(), 8);
    }

    #[test]
    fn test_empty_input_is_empty_file() {
        let file = parse("").unwrap();
        assert!(file.statements.is_empty());
        assert_eq!(file.node_count(), 0);
    }
}
