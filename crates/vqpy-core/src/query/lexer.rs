/// Lexer for tokenizing VQL programs
///
/// Converts raw program text into a stream of tokens for parsing.
use std::fmt;

/// Token types produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Declarations
    /// `MODEL`
    Model,
    /// `CLASS`
    Class,
    /// `EXTENDS`
    Extends,
    /// `PROPERTY`
    Property,
    /// `HISTORY`
    History,
    /// `QUERY`
    Query,

    // Query keywords
    /// `SELECT`
    Select,
    /// `FROM`
    From,
    /// `WHERE`
    Where,
    /// `ORDER BY`
    OrderBy,
    /// `LIMIT`
    Limit,
    /// `OFFSET`
    Offset,
    /// `AS`
    As,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `NOT`
    Not,
    /// `LIKE`
    Like,
    /// `IN`
    In,
    /// `BETWEEN`
    Between,
    /// `IS`
    Is,
    /// `self`
    SelfRef,

    // Aggregate functions
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `MIN`
    Min,
    /// `MAX`
    Max,

    // Comparison operators
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,

    // Arithmetic operators (`*` is Asterisk)
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `/`
    Slash,
    /// `%`
    Percent,

    // Literals
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// Quoted string literal
    String(String),
    /// `TRUE` or `FALSE`
    Boolean(bool),
    /// `NULL`
    Null,

    /// Name of a model, class, property or query
    Identifier(String),

    // Punctuation
    /// `*`
    Asterisk,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `->`
    Arrow,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,

    // Sort direction
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,

    /// End of input
    Eof,
}

/// Reserved words, matched case-insensitively. `ORDER BY` is handled apart.
const KEYWORDS: &[(&str, Token)] = &[
    ("MODEL", Token::Model),
    ("CLASS", Token::Class),
    ("EXTENDS", Token::Extends),
    ("PROPERTY", Token::Property),
    ("HISTORY", Token::History),
    ("QUERY", Token::Query),
    ("SELECT", Token::Select),
    ("FROM", Token::From),
    ("WHERE", Token::Where),
    ("LIMIT", Token::Limit),
    ("OFFSET", Token::Offset),
    ("AS", Token::As),
    ("AND", Token::And),
    ("OR", Token::Or),
    ("NOT", Token::Not),
    ("LIKE", Token::Like),
    ("IN", Token::In),
    ("BETWEEN", Token::Between),
    ("IS", Token::Is),
    ("SELF", Token::SelfRef),
    ("COUNT", Token::Count),
    ("SUM", Token::Sum),
    ("AVG", Token::Avg),
    ("MIN", Token::Min),
    ("MAX", Token::Max),
    ("ASC", Token::Asc),
    ("DESC", Token::Desc),
    ("TRUE", Token::Boolean(true)),
    ("FALSE", Token::Boolean(false)),
    ("NULL", Token::Null),
];

/// Single-character symbols
const SYMBOLS: &[(char, Token)] = &[
    ('*', Token::Asterisk),
    (',', Token::Comma),
    (';', Token::Semicolon),
    ('(', Token::LeftParen),
    (')', Token::RightParen),
    ('{', Token::LeftBrace),
    ('}', Token::RightBrace),
    ('[', Token::LeftBracket),
    (']', Token::RightBracket),
    ('+', Token::Plus),
    ('/', Token::Slash),
    ('%', Token::Percent),
    ('=', Token::Eq),
];

fn keyword(word: &str) -> Option<Token> {
    KEYWORDS
        .iter()
        .find(|(text, _)| text.eq_ignore_ascii_case(word))
        .map(|(_, token)| token.clone())
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((text, _)) = KEYWORDS.iter().find(|(_, token)| token == self) {
            return f.write_str(text);
        }
        if let Some((symbol, _)) = SYMBOLS.iter().find(|(_, token)| token == self) {
            return write!(f, "{}", symbol);
        }
        match self {
            Token::OrderBy => write!(f, "ORDER BY"),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Minus => write!(f, "-"),
            Token::Arrow => write!(f, "->"),
            Token::Integer(i) => write!(f, "{}", i),
            Token::Float(x) => write!(f, "{}", x),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Eof => write!(f, "end of input"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Lexer state
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    /// Create a new lexer from input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments();

        if self.position >= self.input.len() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        if let Some((_, token)) = SYMBOLS.iter().find(|(symbol, _)| *symbol == ch) {
            self.advance();
            return Ok(token.clone());
        }

        // Two-character operators
        match ch {
            '-' => {
                self.advance();
                if self.peek_is('>') {
                    self.advance();
                    return Ok(Token::Arrow);
                }
                return Ok(Token::Minus);
            }
            '<' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    return Ok(Token::Le);
                }
                return Ok(Token::Lt);
            }
            '>' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    return Ok(Token::Ge);
                }
                return Ok(Token::Gt);
            }
            '!' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    return Ok(Token::Ne);
                }
                return Err(LexerError::UnexpectedCharacter(ch));
            }
            '\'' => return self.read_string(),
            _ => {}
        }

        // Numbers
        if ch.is_ascii_digit() {
            return self.read_number();
        }

        // Identifiers and keywords
        if ch.is_alphabetic() || ch == '_' {
            return self.read_identifier_or_keyword();
        }

        Err(LexerError::UnexpectedCharacter(ch))
    }

    /// Tokenize entire input into vector of tokens
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// True when the character at the current position is `expected`
    fn peek_is(&self, expected: char) -> bool {
        self.input.get(self.position) == Some(&expected)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.position < self.input.len() && self.current_char().is_whitespace() {
                self.advance();
            }
            // `--` line comment
            if self.peek_is('-') && self.peek_char() == Some('-') {
                while self.position < self.input.len() && self.current_char() != '\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.position;
        let mut has_dot = false;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot && self.peek_char().is_some_and(|c| c.is_ascii_digit())
            {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let num_str: String = self.input[start..self.position].iter().collect();

        if has_dot {
            num_str
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| LexerError::InvalidNumber(num_str))
        } else {
            num_str
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| LexerError::InvalidNumber(num_str))
        }
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        self.advance(); // skip opening quote
        let start = self.position;

        while self.position < self.input.len() && self.current_char() != '\'' {
            self.advance();
        }

        if self.position >= self.input.len() {
            return Err(LexerError::UnterminatedString);
        }

        let string: String = self.input[start..self.position].iter().collect();
        self.advance(); // skip closing quote

        Ok(Token::String(string))
    }

    fn read_identifier_or_keyword(&mut self) -> Result<Token, LexerError> {
        let start = self.position;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();

        // ORDER BY is the only two-word keyword
        if text.eq_ignore_ascii_case("ORDER") {
            let rollback = self.position;
            self.skip_whitespace_and_comments();
            let next = self.position;
            while self.position < self.input.len() && self.current_char().is_alphabetic() {
                self.advance();
            }
            let word: String = self.input[next..self.position].iter().collect();
            if word.eq_ignore_ascii_case("BY") {
                return Ok(Token::OrderBy);
            }
            self.position = rollback;
        }

        let token = keyword(&text).unwrap_or(Token::Identifier(text));

        Ok(token)
    }
}

/// Lexer errors
#[derive(Debug, Clone, PartialEq)]
pub enum LexerError {
    /// A character that starts no token
    UnexpectedCharacter(char),
    /// Numeric literal that does not parse or overflows
    InvalidNumber(String),
    /// Input ended inside a quoted string
    UnterminatedString,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter(ch) => write!(f, "Unexpected character: '{}'", ch),
            LexerError::InvalidNumber(s) => write!(f, "Invalid number: '{}'", s),
            LexerError::UnterminatedString => write!(f, "Unterminated string literal"),
        }
    }
}

impl std::error::Error for LexerError {}
