//! Abstract syntax tree for the flow language
//!
//! Every node keeps the token it was built from so diagnostics and tooling
//! can point back into the source. Rendering back to text goes through
//! [`Printer`], which carries the nesting depth as an argument instead of
//! storing indentation on the nodes.

use std::fmt::{self, Write};

use crate::token::Token;

/// Common behaviour of all syntax tree nodes
pub trait AstNode: fmt::Display {
    /// Literal text of the token the node was built from
    fn token_literal(&self) -> &str;
}

/// Root of a parsed source file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top-level statements in source order
    pub statements: Vec<Statement>,
}

impl Program {
    /// Iterate over the `flow` declarations of the program
    pub fn flows(&self) -> impl Iterator<Item = &FlowStatement> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Flow(flow) => Some(flow),
            _ => None,
        })
    }
}

/// A statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `flow "name" { ... }`
    Flow(FlowStatement),
    /// `node "name" { ... }`
    Node(NodeStatement),
    /// `config { ... }`
    Config(ConfigStatement),
    /// `name: value`
    Assignment(Assignment),
}

/// `flow "name" { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStatement {
    /// The `flow` keyword
    pub token: Token,
    /// Flow name
    pub name: StringLiteral,
    /// Flow body
    pub body: BlockStatement,
}

/// `node "name" { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatement {
    /// The `node` keyword
    pub token: Token,
    /// Node name
    pub name: StringLiteral,
    /// Node body
    pub body: BlockStatement,
}

/// `config { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStatement {
    /// The `config` keyword
    pub token: Token,
    /// Settings
    pub body: BlockStatement,
}

/// `{ statement* }`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    /// The opening brace
    pub token: Token,
    /// Statements in source order
    pub statements: Vec<Statement>,
}

/// `name: value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The name token (an identifier or a wiring keyword)
    pub token: Token,
    /// Setting name
    pub name: Identifier,
    /// Setting value
    pub value: Expression,
}

/// Right-hand side of an assignment
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Bare identifier
    Identifier(Identifier),
    /// Quoted string
    String(StringLiteral),
    /// Number
    Number(NumberLiteral),
}

/// Bare identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    /// Source token
    pub token: Token,
    /// Identifier text
    pub value: String,
}

/// Quoted string
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    /// Source token
    pub token: Token,
    /// Contents without the quotes
    pub value: String,
}

/// Numeric literal
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    /// Source token
    pub token: Token,
    /// Parsed value
    pub value: f64,
}

impl Statement {
    /// First token of the statement
    pub fn token(&self) -> &Token {
        match self {
            Statement::Flow(s) => &s.token,
            Statement::Node(s) => &s.token,
            Statement::Config(s) => &s.token,
            Statement::Assignment(s) => &s.token,
        }
    }
}

impl Expression {
    /// Source token of the expression
    pub fn token(&self) -> &Token {
        match self {
            Expression::Identifier(e) => &e.token,
            Expression::String(e) => &e.token,
            Expression::Number(e) => &e.token,
        }
    }
}

macro_rules! impl_ast_node {
    ($($ty:ty => |$node:ident| $literal:expr),* $(,)?) => {
        $(
            impl AstNode for $ty {
                fn token_literal(&self) -> &str {
                    let $node = self;
                    $literal
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let mut out = String::new();
                    Printer::default().write(&mut out, self, 0)?;
                    f.write_str(&out)
                }
            }
        )*
    };
}

impl_ast_node! {
    Program => |p| p.statements.first().map_or("", |s| s.token().literal.as_str()),
    Statement => |s| &s.token().literal,
    FlowStatement => |s| &s.token.literal,
    NodeStatement => |s| &s.token.literal,
    ConfigStatement => |s| &s.token.literal,
    BlockStatement => |s| &s.token.literal,
    Assignment => |s| &s.token.literal,
    Expression => |e| &e.token().literal,
    Identifier => |e| &e.token.literal,
    StringLiteral => |e| &e.token.literal,
    NumberLiteral => |e| &e.token.literal,
}

/// Something the [`Printer`] can render at a given depth
pub trait Render {
    /// Write `self` to `out`, indenting nested lines relative to `depth`
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result;
}

/// Stateless pretty printer for syntax trees
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    /// Spaces per nesting level
    pub indent_width: usize,
}

impl Default for Printer {
    fn default() -> Self {
        Self { indent_width: 2 }
    }
}

impl Printer {
    /// Render a node to `out` at `depth`
    pub fn write<N: Render + ?Sized>(&self, out: &mut String, node: &N, depth: usize) -> fmt::Result {
        node.render(self, out, depth)
    }

    /// Render a node to a new string
    pub fn print<N: Render + ?Sized>(&self, node: &N) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = node.render(self, &mut out, 0);
        out
    }

    fn pad(&self, out: &mut String, depth: usize) {
        out.extend(std::iter::repeat_n(' ', depth * self.indent_width));
    }

    fn block(&self, out: &mut String, block: &BlockStatement, depth: usize) -> fmt::Result {
        if block.statements.is_empty() {
            return out.write_str("{}");
        }
        out.write_str("{\n")?;
        for statement in &block.statements {
            self.pad(out, depth + 1);
            statement.render(self, out, depth + 1)?;
            out.write_char('\n')?;
        }
        self.pad(out, depth);
        out.write_char('}')
    }
}

impl Render for Program {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                out.write_char('\n')?;
            }
            printer.pad(out, depth);
            statement.render(printer, out, depth)?;
            out.write_char('\n')?;
        }
        Ok(())
    }
}

impl Render for Statement {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        match self {
            Statement::Flow(s) => s.render(printer, out, depth),
            Statement::Node(s) => s.render(printer, out, depth),
            Statement::Config(s) => s.render(printer, out, depth),
            Statement::Assignment(s) => s.render(printer, out, depth),
        }
    }
}

impl Render for FlowStatement {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        write!(out, "{} ", self.token.literal)?;
        self.name.render(printer, out, depth)?;
        out.write_char(' ')?;
        printer.block(out, &self.body, depth)
    }
}

impl Render for NodeStatement {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        write!(out, "{} ", self.token.literal)?;
        self.name.render(printer, out, depth)?;
        out.write_char(' ')?;
        printer.block(out, &self.body, depth)
    }
}

impl Render for ConfigStatement {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        write!(out, "{} ", self.token.literal)?;
        printer.block(out, &self.body, depth)
    }
}

impl Render for BlockStatement {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        printer.block(out, self, depth)
    }
}

impl Render for Assignment {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        write!(out, "{}: ", self.name.value)?;
        self.value.render(printer, out, depth)
    }
}

impl Render for Expression {
    fn render(&self, printer: &Printer, out: &mut String, depth: usize) -> fmt::Result {
        match self {
            Expression::Identifier(e) => e.render(printer, out, depth),
            Expression::String(e) => e.render(printer, out, depth),
            Expression::Number(e) => e.render(printer, out, depth),
        }
    }
}

impl Render for Identifier {
    fn render(&self, _: &Printer, out: &mut String, _: usize) -> fmt::Result {
        out.write_str(&self.value)
    }
}

impl Render for StringLiteral {
    fn render(&self, _: &Printer, out: &mut String, _: usize) -> fmt::Result {
        write!(out, "\"{}\"", self.value)
    }
}

impl Render for NumberLiteral {
    fn render(&self, _: &Printer, out: &mut String, _: usize) -> fmt::Result {
        out.write_str(&self.token.literal)
    }
}
