//! Recursive descent parser for the flow language
//!
//! The parser keeps the current token and one token of lookahead. It never
//! aborts: every grammar violation is recorded as a [`ParseError`] and
//! parsing resumes with the next token, so one pass reports every independent
//! mistake. Callers must check [`Parser::errors`] before trusting the tree.
//!
//! ```text
//! program    := statement*
//! statement  := flowDecl | nodeDecl | configBlock | assignment
//! flowDecl   := "flow" STRING block
//! nodeDecl   := "node" STRING block
//! configBlock:= "config" block
//! block      := "{" statement* "}"
//! assignment := IDENT ":" literal
//! literal    := STRING | NUMBER | IDENT
//! ```

use std::fmt;

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Position, Token, TokenKind};

/// Deepest block nesting the parser descends into
pub const MAX_DEPTH: usize = 128;

/// A syntax diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Human-readable description
    pub message: String,
    /// Where the offending token starts
    pub position: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

/// Parser over the tokens of one source string
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peek: Token,
    errors: Vec<ParseError>,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Create a parser reading from `lexer`
    pub fn new(lexer: Lexer<'a>) -> Self {
        let placeholder = Token::new(TokenKind::Eof, "", Position::default());
        let mut parser = Self {
            lexer,
            current: placeholder.clone(),
            peek: placeholder,
            errors: Vec::new(),
            depth: 0,
        };
        parser.next_token();
        parser.next_token();
        parser
    }

    /// Convenience constructor from source text
    pub fn from_source(source: &'a str) -> Self {
        Self::new(Lexer::new(source))
    }

    /// Diagnostics collected so far
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Parse the whole input
    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while !self.current_is(TokenKind::Eof) {
            if let Some(statement) = self.parse_statement() {
                program.statements.push(statement);
            }
            self.next_token();
        }
        tracing::debug!(
            statements = program.statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        program
    }

    fn next_token(&mut self) {
        let mut upcoming = self.lexer.next_token();
        while upcoming.kind == TokenKind::Comment {
            upcoming = self.lexer.next_token();
        }
        self.current = std::mem::replace(&mut self.peek, upcoming);
    }

    fn current_is(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    /// Advance if the lookahead has the expected kind, otherwise record an error
    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.next_token();
            true
        } else {
            self.peek_error(kind);
            false
        }
    }

    fn peek_error(&mut self, expected: TokenKind) {
        let message = format!(
            "expected next token to be {}, got {} instead",
            expected, self.peek.kind
        );
        self.error_at(message, self.peek.position);
    }

    fn error_at(&mut self, message: String, position: Position) {
        self.errors.push(ParseError { message, position });
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.current.kind {
            TokenKind::Flow => self.parse_flow().map(Statement::Flow),
            TokenKind::Node => self.parse_node().map(Statement::Node),
            TokenKind::Config => self.parse_config().map(Statement::Config),
            TokenKind::Ident => self.parse_assignment().map(Statement::Assignment),
            kind if kind.is_soft_keyword() => self.parse_assignment().map(Statement::Assignment),
            // separators between statements
            TokenKind::Comma => None,
            kind => {
                let message = if kind == TokenKind::Illegal {
                    format!("illegal token {:?}", self.current.literal)
                } else {
                    format!("unexpected token {}", kind)
                };
                self.error_at(message, self.current.position);
                None
            }
        }
    }

    fn parse_flow(&mut self) -> Option<FlowStatement> {
        let token = self.current.clone();
        let name = self.parse_declaration_name()?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(FlowStatement { token, name, body })
    }

    fn parse_node(&mut self) -> Option<NodeStatement> {
        let token = self.current.clone();
        let name = self.parse_declaration_name()?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(NodeStatement { token, name, body })
    }

    fn parse_declaration_name(&mut self) -> Option<StringLiteral> {
        if !self.expect_peek(TokenKind::String) {
            return None;
        }
        Some(StringLiteral {
            token: self.current.clone(),
            value: self.current.literal.clone(),
        })
    }

    fn parse_config(&mut self) -> Option<ConfigStatement> {
        let token = self.current.clone();
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(ConfigStatement { token, body })
    }

    /// Called with `{` as the current token; leaves `}` (or `EOF`) current.
    fn parse_block(&mut self) -> BlockStatement {
        let token = self.current.clone();
        let mut statements = Vec::new();
        if self.depth >= MAX_DEPTH {
            self.error_at("block nesting too deep".to_string(), token.position);
            self.skip_block();
            return BlockStatement { token, statements };
        }

        self.depth += 1;
        self.next_token();
        while !self.current_is(TokenKind::RBrace) && !self.current_is(TokenKind::Eof) {
            if let Some(statement) = self.parse_statement() {
                statements.push(statement);
            }
            self.next_token();
        }

        if self.current_is(TokenKind::Eof) {
            let message = format!(
                "expected next token to be {}, got {} instead",
                TokenKind::RBrace,
                TokenKind::Eof
            );
            self.error_at(message, self.current.position);
        }
        self.depth -= 1;

        BlockStatement { token, statements }
    }

    /// Step over a block without building it, from its `{` to the matching
    /// `}` (or `EOF`).
    fn skip_block(&mut self) {
        let mut open = 1usize;
        while open > 0 {
            self.next_token();
            match self.current.kind {
                TokenKind::LBrace => open += 1,
                TokenKind::RBrace => open -= 1,
                TokenKind::Eof => {
                    let message = format!(
                        "expected next token to be {}, got {} instead",
                        TokenKind::RBrace,
                        TokenKind::Eof
                    );
                    self.error_at(message, self.current.position);
                    return;
                }
                _ => {}
            }
        }
    }

    fn parse_assignment(&mut self) -> Option<Assignment> {
        let token = self.current.clone();
        let name = Identifier {
            token: token.clone(),
            value: token.literal.clone(),
        };
        if !self.expect_peek(TokenKind::Colon) {
            return None;
        }
        // do not step onto a token that cannot be a value, so a closing
        // brace is still seen by the enclosing block
        if !starts_literal(self.peek.kind) {
            let message = format!(
                "expected next token to be a literal, got {} instead",
                self.peek.kind
            );
            self.error_at(message, self.peek.position);
            return None;
        }
        self.next_token();
        let value = self.parse_expression()?;
        Some(Assignment { token, name, value })
    }

    fn parse_expression(&mut self) -> Option<Expression> {
        let token = self.current.clone();
        match token.kind {
            TokenKind::String => Some(Expression::String(StringLiteral {
                value: token.literal.clone(),
                token,
            })),
            TokenKind::Number => match token.literal.parse::<f64>() {
                Ok(value) => Some(Expression::Number(NumberLiteral { token, value })),
                Err(_) => {
                    let message = format!("could not parse {:?} as number", token.literal);
                    self.error_at(message, token.position);
                    None
                }
            },
            kind if kind == TokenKind::Ident || kind.is_soft_keyword() => {
                Some(Expression::Identifier(Identifier {
                    value: token.literal.clone(),
                    token,
                }))
            }
            kind => {
                let message = format!("no expression can start with {} token", kind);
                self.error_at(message, token.position);
                None
            }
        }
    }
}

fn starts_literal(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::String | TokenKind::Number | TokenKind::Ident) || kind.is_soft_keyword()
}

/// Parse `source`, returning the program and any diagnostics
pub fn parse(source: &str) -> (Program, Vec<ParseError>) {
    let mut parser = Parser::from_source(source);
    let program = parser.parse_program();
    (program, parser.errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = r#"
// order intake
flow "orders" {
  config {
    retries: 3,
    timeout: 1000
  }
  node "ingest" {
    type: validate
    schema: "object"
  }
}
"#;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
        program
    }

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect()
    }

    #[test]
    fn test_parse_flow_with_node_and_config() {
        let program = parse_ok(ORDERS);
        assert_eq!(program.statements.len(), 1);

        let Statement::Flow(flow) = &program.statements[0] else {
            panic!("Expected flow statement");
        };
        assert_eq!(flow.name.value, "orders");
        assert_eq!(flow.body.statements.len(), 2);

        let Statement::Config(config) = &flow.body.statements[0] else {
            panic!("Expected config block");
        };
        assert_eq!(config.body.statements.len(), 2);
        match &config.body.statements[0] {
            Statement::Assignment(a) => {
                assert_eq!(a.name.value, "retries");
                assert!(matches!(&a.value, Expression::Number(n) if n.value == 3.0));
            }
            _ => panic!("Expected assignment"),
        }

        let Statement::Node(node) = &flow.body.statements[1] else {
            panic!("Expected node");
        };
        assert_eq!(node.name.value, "ingest");
        match &node.body.statements[0] {
            Statement::Assignment(a) => {
                assert_eq!(a.name.value, "type");
                assert!(matches!(&a.value, Expression::Identifier(i) if i.value == "validate"));
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_rendering_keeps_keywords_and_literals() {
        let program = parse_ok(ORDERS);
        let rendered = squash(&program.to_string());
        let source_without_comment: String = ORDERS
            .lines()
            .filter(|l| !l.trim_start().starts_with("//"))
            .collect();
        assert_eq!(rendered, squash(&source_without_comment));
    }

    #[test]
    fn test_rendered_program_reparses_identically() {
        let program = parse_ok(ORDERS);
        let reparsed = parse_ok(&program.to_string());
        assert_eq!(program.to_string(), reparsed.to_string());
    }

    #[test]
    fn test_top_level_statements() {
        let program = parse_ok("config { workers: 4 }\nname: demo\nnode \"solo\" {}");
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(program.statements[0], Statement::Config(_)));
        assert!(matches!(program.statements[1], Statement::Assignment(_)));
        assert!(matches!(program.statements[2], Statement::Node(_)));
    }

    #[test]
    fn test_empty_program() {
        let program = parse_ok("  // nothing here\n");
        assert!(program.statements.is_empty());
    }

    #[test]
    fn test_missing_flow_name() {
        let (_, errors) = parse("flow { }");
        assert!(!errors.is_empty());
        assert_eq!(
            errors[0].message,
            "expected next token to be STRING, got LBRACE instead"
        );
        assert_eq!(errors[0].position.column, 6);
    }

    #[test]
    fn test_missing_colon() {
        let (_, errors) = parse("flow \"f\" { retries 3 }");
        assert_eq!(
            errors[0].message,
            "expected next token to be COLON, got NUMBER instead"
        );
    }

    #[test]
    fn test_missing_value_keeps_enclosing_block() {
        let (program, errors) = parse("flow \"f\" { retries: }\nflow \"g\" {}");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("literal, got RBRACE"));
        assert_eq!(program.flows().count(), 2);
    }

    #[test]
    fn test_unclosed_block_reports_eof() {
        let (program, errors) = parse("flow \"f\" { node \"n\" { a: 1 }");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "expected next token to be RBRACE, got EOF instead"
        );
        // the partial flow is still returned
        assert_eq!(program.flows().count(), 1);
    }

    #[test]
    fn test_errors_accumulate_and_parsing_continues() {
        let source = r#"
flow "a" { x 1 }
flow "b" { node "n" { y: @ } }
flow "c" { z: 3 }
"#;
        let (program, errors) = parse(source);
        assert!(errors.len() >= 2, "errors: {:?}", errors);
        let names: Vec<_> = program.flows().map(|f| f.name.value.clone()).collect();
        assert!(names.contains(&"c".to_string()));
    }

    #[test]
    fn test_illegal_token_is_reported() {
        let (_, errors) = parse("@");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("illegal token"));
    }

    #[test]
    fn test_stray_closing_brace() {
        let (_, errors) = parse("}");
        assert_eq!(errors[0].message, "unexpected token RBRACE");
    }

    #[test]
    fn test_wiring_keywords_as_setting_names() {
        let program = parse_ok(
            "node \"n\" { nodeType: tag, from: \"a\", to: \"b\", inputs: 1, outputs: 2 }",
        );
        let Statement::Node(node) = &program.statements[0] else {
            panic!("Expected node");
        };
        let names: Vec<_> = node
            .body
            .statements
            .iter()
            .map(|s| match s {
                Statement::Assignment(a) => a.name.value.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["nodeType", "from", "to", "inputs", "outputs"]);
    }

    #[test]
    fn test_comments_are_discarded() {
        let program = parse_ok("flow \"f\" { // inline\n a: 1 // trailing\n }");
        let Statement::Flow(flow) = &program.statements[0] else {
            panic!("Expected flow");
        };
        assert_eq!(flow.body.statements.len(), 1);
    }

    #[test]
    fn test_unterminated_string_name_is_accepted() {
        let (program, errors) = parse("flow \"open");
        // the name is read to the end of input, so the block is missing
        assert_eq!(
            errors[0].message,
            "expected next token to be LBRACE, got EOF instead"
        );
        assert!(program.statements.is_empty());
    }

    fn nested_configs(depth: usize) -> String {
        format!(
            "flow \"f\" {{{}{} }}\nflow \"after\" {{}}",
            " config {".repeat(depth),
            " }".repeat(depth)
        )
    }

    #[test]
    fn test_deep_nesting_is_reported_not_followed() {
        let (program, errors) = parse(&nested_configs(10_000));
        assert_eq!(errors.len(), 1, "errors: {:?}", errors);
        assert_eq!(errors[0].message, "block nesting too deep");
        // parsing resumes after the skipped block
        let names: Vec<_> = program.flows().map(|f| f.name.value.clone()).collect();
        assert_eq!(names, vec!["f", "after"]);
    }

    #[test]
    fn test_nesting_up_to_the_limit_parses() {
        // the flow body itself is one level
        parse_ok(&nested_configs(MAX_DEPTH - 1));
        let (_, errors) = parse(&nested_configs(MAX_DEPTH));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_deep_unclosed_nesting_reports_eof() {
        let source = format!("flow \"f\" {{{}", " config {".repeat(1_000));
        let (_, errors) = parse(&source);
        // one for the skipped block, then every open block hits EOF
        assert_eq!(errors.len(), 2 + MAX_DEPTH);
        assert_eq!(errors[0].message, "block nesting too deep");
    }

    #[test]
    fn test_error_display_includes_position() {
        let (_, errors) = parse("flow {");
        assert!(errors[0].to_string().ends_with("(line 1, column 6)"));
    }
}
