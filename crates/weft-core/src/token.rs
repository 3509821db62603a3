//! Tokens produced by the flow language lexer

use std::fmt;

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A byte the lexer does not recognise
    Illegal,
    /// End of input
    Eof,
    /// `// ...` line comment
    Comment,

    /// Bare identifier
    Ident,
    /// Double-quoted string literal
    String,
    /// Unsigned integer literal
    Number,

    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `:`
    Colon,
    /// `,`
    Comma,

    /// `flow`
    Flow,
    /// `node`
    Node,
    /// `config`
    Config,
    /// `nodeType`
    NodeType,
    /// `type`
    Type,
    /// `from`
    From,
    /// `to`
    To,
    /// `inputs`
    Inputs,
    /// `outputs`
    Outputs,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("flow", TokenKind::Flow),
    ("node", TokenKind::Node),
    ("config", TokenKind::Config),
    ("nodeType", TokenKind::NodeType),
    ("type", TokenKind::Type),
    ("from", TokenKind::From),
    ("to", TokenKind::To),
    ("inputs", TokenKind::Inputs),
    ("outputs", TokenKind::Outputs),
];

impl TokenKind {
    /// Resolve an identifier against the keyword table.
    ///
    /// Anything not in the table is a plain [`TokenKind::Ident`].
    pub fn lookup_ident(ident: &str) -> TokenKind {
        KEYWORDS
            .iter()
            .find(|(word, _)| *word == ident)
            .map(|(_, kind)| *kind)
            .unwrap_or(TokenKind::Ident)
    }

    /// Whether this kind is one of the reserved words
    pub fn is_keyword(self) -> bool {
        KEYWORDS.iter().any(|(_, kind)| *kind == self)
    }

    /// Keywords that describe node wiring and may be used as setting names
    pub fn is_soft_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::NodeType
                | TokenKind::Type
                | TokenKind::From
                | TokenKind::To
                | TokenKind::Inputs
                | TokenKind::Outputs
        )
    }

    /// Upper-case name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Eof => "EOF",
            TokenKind::Comment => "COMMENT",
            TokenKind::Ident => "IDENT",
            TokenKind::String => "STRING",
            TokenKind::Number => "NUMBER",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::Colon => "COLON",
            TokenKind::Comma => "COMMA",
            TokenKind::Flow => "FLOW",
            TokenKind::Node => "NODE",
            TokenKind::Config => "CONFIG",
            TokenKind::NodeType => "NODE_TYPE",
            TokenKind::Type => "TYPE",
            TokenKind::From => "FROM",
            TokenKind::To => "TO",
            TokenKind::Inputs => "INPUTS",
            TokenKind::Outputs => "OUTPUTS",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of a token in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column within the line
    pub column: usize,
    /// Byte offset from the start of the input
    pub offset: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A lexical token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Source text of the token (string contents without quotes)
    pub literal: String,
    /// Where the token starts
    pub position: Position,
}

impl Token {
    /// Create a token
    pub fn new(kind: TokenKind, literal: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            position,
        }
    }

    /// Whether this is the end-of-input sentinel
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::String | TokenKind::Number | TokenKind::Ident | TokenKind::Illegal => {
                write!(f, "{}({})", self.kind, self.literal)
            }
            TokenKind::Comment => write!(f, "COMMENT({})", self.literal),
            _ => write!(f, "{}", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("flow", TokenKind::Flow)]
    #[case("node", TokenKind::Node)]
    #[case("config", TokenKind::Config)]
    #[case("nodeType", TokenKind::NodeType)]
    #[case("type", TokenKind::Type)]
    #[case("from", TokenKind::From)]
    #[case("to", TokenKind::To)]
    #[case("inputs", TokenKind::Inputs)]
    #[case("outputs", TokenKind::Outputs)]
    fn test_keyword_lookup(#[case] word: &str, #[case] expected: TokenKind) {
        assert_eq!(TokenKind::lookup_ident(word), expected);
        assert!(expected.is_keyword());
    }

    #[test]
    fn test_non_keywords_are_identifiers() {
        assert_eq!(TokenKind::lookup_ident("retries"), TokenKind::Ident);
        assert_eq!(TokenKind::lookup_ident("Flow"), TokenKind::Ident);
        assert_eq!(TokenKind::lookup_ident("nodetype"), TokenKind::Ident);
    }

    #[test]
    fn test_soft_keywords() {
        assert!(TokenKind::Type.is_soft_keyword());
        assert!(TokenKind::From.is_soft_keyword());
        assert!(!TokenKind::Flow.is_soft_keyword());
        assert!(!TokenKind::Config.is_soft_keyword());
    }

    #[test]
    fn test_token_display() {
        let pos = Position::default();
        assert_eq!(
            Token::new(TokenKind::String, "myFlow", pos).to_string(),
            "STRING(myFlow)"
        );
        assert_eq!(Token::new(TokenKind::LBrace, "{", pos).to_string(), "LBRACE");
    }
}
