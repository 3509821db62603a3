//! Lexer for the flow language
//!
//! The lexer never fails. Bytes it does not understand become
//! [`TokenKind::Illegal`] tokens and an unterminated string yields whatever
//! was read before the end of input; surfacing those is left to the parser.
//!
//! Positions follow a fixed scheme: the column counter is incremented for
//! every character read, including newlines, and reset to zero when a newline
//! is read. The first character of every line is therefore column 1.

use crate::token::{Position, Token, TokenKind};

/// Single-pass lexer over one source string
pub struct Lexer<'a> {
    input: &'a str,
    /// Byte offset of `ch`
    position: usize,
    /// Byte offset of the character after `ch`
    read_position: usize,
    ch: Option<char>,
    line: usize,
    column: usize,
    at_end: bool,
    emitted_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned on the first character of `input`
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Self {
            input,
            position: 0,
            read_position: 0,
            ch: None,
            line: 1,
            column: 0,
            at_end: false,
            emitted_eof: false,
        };
        lexer.read_char();
        lexer
    }

    /// Lex the whole input, up to and including the `EOF` token
    pub fn tokenize(input: &str) -> Vec<Token> {
        Lexer::new(input).collect()
    }

    /// Produce the next token. Once the input is exhausted this keeps
    /// returning `EOF`.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.current_position();

        let Some(ch) = self.ch else {
            return Token::new(TokenKind::Eof, "", start);
        };

        match ch {
            '"' => {
                let literal = self.read_string();
                Token::new(TokenKind::String, literal, start)
            }
            '/' if self.peek_char() == Some('/') => {
                let literal = self.read_comment();
                Token::new(TokenKind::Comment, literal, start)
            }
            c if is_ident_start(c) => {
                let ident = self.read_identifier();
                Token::new(TokenKind::lookup_ident(ident), ident, start)
            }
            c if c.is_ascii_digit() => {
                let number = self.read_number();
                Token::new(TokenKind::Number, number, start)
            }
            '{' => self.single(TokenKind::LBrace, start),
            '}' => self.single(TokenKind::RBrace, start),
            '[' => self.single(TokenKind::LBracket, start),
            ']' => self.single(TokenKind::RBracket, start),
            ':' => self.single(TokenKind::Colon, start),
            ',' => self.single(TokenKind::Comma, start),
            other => {
                self.read_char();
                Token::new(TokenKind::Illegal, other.to_string(), start)
            }
        }
    }

    fn single(&mut self, kind: TokenKind, start: Position) -> Token {
        let literal = &self.input[self.position..self.read_position];
        let token = Token::new(kind, literal, start);
        self.read_char();
        token
    }

    fn read_char(&mut self) {
        if self.at_end {
            return;
        }
        self.position = self.read_position;
        self.ch = self.input[self.read_position..].chars().next();
        match self.ch {
            Some(c) => self.read_position += c.len_utf8(),
            None => self.at_end = true,
        }

        self.column += 1;
        if self.ch == Some('\n') {
            self.line += 1;
            self.column = 0;
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.read_position..].chars().next()
    }

    fn current_position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch, Some(' ' | '\t' | '\r' | '\n')) {
            self.read_char();
        }
    }

    /// Reads from the opening quote to the closing one (or end of input).
    /// Escaped characters are kept verbatim.
    fn read_string(&mut self) -> &'a str {
        self.read_char();
        let start = self.position;
        loop {
            match self.ch {
                None | Some('"') => break,
                Some('\\') => {
                    self.read_char();
                    self.read_char();
                }
                Some(_) => self.read_char(),
            }
        }
        let literal = &self.input[start..self.position];
        if self.ch == Some('"') {
            self.read_char();
        }
        literal
    }

    fn read_comment(&mut self) -> String {
        // skip the two slashes
        self.read_char();
        self.read_char();
        let start = self.position;
        while !matches!(self.ch, None | Some('\n')) {
            self.read_char();
        }
        self.input[start..self.position].trim().to_string()
    }

    fn read_identifier(&mut self) -> &'a str {
        let start = self.position;
        while self.ch.is_some_and(is_ident_continue) {
            self.read_char();
        }
        &self.input[start..self.position]
    }

    fn read_number(&mut self) -> &'a str {
        let start = self.position;
        while self.ch.is_some_and(|c| c.is_ascii_digit()) {
            self.read_char();
        }
        &self.input[start..self.position]
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields every token including the first `EOF`, then stops.
    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        let token = self.next_token();
        if token.is_eof() {
            self.emitted_eof = true;
        }
        Some(token)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
