use std::fmt::Display;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::expr::Prefix;

/// Text of the synthetic token produced at the end of a line.
pub const NEWLINE: &str = "\n";

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum LexError {
    #[error("unterminated `{{{{` block")]
    #[diagnostic(
        code(lex::unterminated_block),
        help("every opening double brace needs a matching closing double brace")
    )]
    UnterminatedBlock {
        #[label("block opened here")]
        span: SourceSpan,
    },

    #[error("unterminated command text")]
    #[diagnostic(
        code(lex::unterminated_command),
        help("the script ends right after a `\\` line continuation")
    )]
    UnterminatedCommand {
        #[label("this command")]
        span: SourceSpan,
    },
}

impl LexError {
    pub fn span(&self) -> SourceSpan {
        match self {
            LexError::UnterminatedBlock { span } | LexError::UnterminatedCommand { span } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Semicolon,
    Ident,
    Colon,
    LeftBrace,
    RightBrace,
    Prefix,
    Command,
}

impl Token<'_> {
    /// The synthetic end-of-line marker.
    pub fn is_newline(&self) -> bool {
        self.kind == TokenKind::Semicolon && self.literal == NEWLINE
    }

    /// A `;` written in the source.
    pub fn is_semicolon(&self) -> bool {
        self.kind == TokenKind::Semicolon && self.literal == ";"
    }

    /// Short human description used in error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Semicolon if self.is_newline() => "end of line".to_string(),
            TokenKind::Command => "command text".to_string(),
            _ => format!("`{}`", self.literal),
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Semicolon if self.is_newline() => write!(f, "NEWLINE"),
            TokenKind::Semicolon => write!(f, "SEMICOLON {lit}"),
            TokenKind::Ident => write!(f, "IDENTIFIER {lit}"),
            TokenKind::Colon => write!(f, "COLON {lit}"),
            TokenKind::LeftBrace => write!(f, "LEFT_BRACES {lit}"),
            TokenKind::RightBrace => write!(f, "RIGHT_BRACES {lit}"),
            TokenKind::Prefix => write!(f, "PREFIX {lit}"),
            TokenKind::Command => write!(f, "COMMAND {lit:?}"),
        }
    }
}

/// Where the next token sits in the grammar.
///
/// `:`, `{{`, `}}` and the prefix characters are only structural at the
/// start of a statement. As operands (key sequences, option values,
/// arguments) they are ordinary identifier characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Start,
    Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// A `:` was just produced.
    Opened,
    /// A prefix was just produced.
    Prefixed,
    /// Inside the braces of `${{ ... }}`.
    Braced { open: usize },
    /// Command text of a braced command was produced, `}}` comes next.
    Closing,
    /// Newline markers still owed.
    Newlines(usize),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Line,
    Brace { open: usize },
}

/// One-token cursor over a script.
///
/// The current token is replaced on every [`Scanner::scan`]. A lexical
/// error is recorded once and turns the cursor into end of input.
pub struct Scanner<'de> {
    whole: &'de str,
    byte: usize,
    mode: Mode,
    blocks: Vec<Block>,
    token: Token<'de>,
    error: Option<LexError>,
}

impl<'de> Scanner<'de> {
    pub fn new(input: &'de str) -> Self {
        Scanner {
            whole: input,
            byte: 0,
            mode: Mode::Normal,
            blocks: Vec::new(),
            token: Token {
                kind: TokenKind::Eof,
                literal: "",
                span: SourceSpan::from(0..0),
            },
            error: None,
        }
    }

    pub fn token(&self) -> Token<'de> {
        self.token
    }

    pub fn error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    /// Advances to the next token and reports whether input remains.
    pub fn scan(&mut self, at: Position) -> bool {
        let next = match self.mode {
            Mode::Done => return false,
            Mode::Newlines(owed) => {
                self.mode = if owed > 1 {
                    Mode::Newlines(owed - 1)
                } else {
                    Mode::Normal
                };
                Ok(self.newline(self.byte, 0))
            }
            Mode::Opened => self.opened(),
            Mode::Prefixed => self.command(),
            Mode::Braced { open } => self.braced(open),
            Mode::Closing => self.closing(),
            Mode::Normal => self.normal(at),
        };

        self.token = match next {
            Ok(token) => token,
            Err(e) => {
                self.error = Some(e);
                self.end_token()
            }
        };
        if self.token.kind == TokenKind::Eof {
            self.mode = Mode::Done;
        }
        self.token.kind != TokenKind::Eof
    }

    fn rest(&self) -> &'de str {
        &self.whole[self.byte..]
    }

    fn skip_blanks(&mut self) {
        let rest = self.rest();
        self.byte += rest.len() - rest.trim_start_matches([' ', '\t']).len();
    }

    fn take(&mut self, kind: TokenKind, len: usize) -> Token<'de> {
        let start = self.byte;
        self.byte += len;
        Token {
            kind,
            literal: &self.whole[start..self.byte],
            span: SourceSpan::from(start..self.byte),
        }
    }

    fn newline(&self, at: usize, len: usize) -> Token<'de> {
        Token {
            kind: TokenKind::Semicolon,
            literal: NEWLINE,
            span: SourceSpan::from(at..at + len),
        }
    }

    fn end_token(&self) -> Token<'de> {
        Token {
            kind: TokenKind::Eof,
            literal: "",
            span: SourceSpan::from(self.whole.len()..self.whole.len()),
        }
    }

    fn owe(&mut self, newlines: usize) {
        if newlines > 0 {
            self.mode = Mode::Newlines(newlines);
        }
    }

    /// Closes every line list on top of the block stack.
    fn close_lines(&mut self) -> usize {
        let mut closed = 0;
        while let Some(Block::Line) = self.blocks.last() {
            self.blocks.pop();
            closed += 1;
        }
        closed
    }

    fn normal(&mut self, at: Position) -> Result<Token<'de>, LexError> {
        loop {
            let Some(c) = self.rest().chars().next() else {
                return self.end();
            };
            if !c.is_whitespace() {
                break;
            }
            self.byte += c.len_utf8();
            if c == '\n' {
                let closed = self.close_lines();
                if closed > 0 {
                    self.owe(closed - 1);
                    return Ok(self.newline(self.byte - 1, 1));
                }
            }
        }

        let rest = self.rest();
        if rest.starts_with(';') {
            return Ok(self.take(TokenKind::Semicolon, 1));
        }
        if at == Position::Start {
            if rest.starts_with("{{") {
                self.blocks.push(Block::Brace { open: self.byte });
                return Ok(self.take(TokenKind::LeftBrace, 2));
            }
            if rest.starts_with("}}") {
                if let Some(Block::Brace { .. }) = self.blocks.last() {
                    self.blocks.pop();
                }
                return Ok(self.take(TokenKind::RightBrace, 2));
            }
            if rest.starts_with(':') {
                self.mode = Mode::Opened;
                return Ok(self.take(TokenKind::Colon, 1));
            }
            if rest.starts_with(|c: char| Prefix::from_char(c).is_some()) {
                self.mode = Mode::Prefixed;
                return Ok(self.take(TokenKind::Prefix, 1));
            }
        }

        let len = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        Ok(self.take(TokenKind::Ident, len))
    }

    fn end(&mut self) -> Result<Token<'de>, LexError> {
        let closed = self.close_lines();
        if closed > 0 {
            self.owe(closed - 1);
            return Ok(self.newline(self.byte, 0));
        }
        let unclosed = self.blocks.iter().rev().find_map(|block| match block {
            Block::Brace { open } => Some(*open),
            Block::Line => None,
        });
        if let Some(open) = unclosed {
            return Err(LexError::UnterminatedBlock {
                span: SourceSpan::from(open..open + 2),
            });
        }
        Ok(self.end_token())
    }

    /// Right after `:`, decides between a braced list and a line list.
    fn opened(&mut self) -> Result<Token<'de>, LexError> {
        self.mode = Mode::Normal;
        self.skip_blanks();
        if self.rest().starts_with("{{") {
            self.blocks.push(Block::Brace { open: self.byte });
            return Ok(self.take(TokenKind::LeftBrace, 2));
        }
        self.blocks.push(Block::Line);
        self.normal(Position::Start)
    }

    /// Right after a prefix: either `{{` or raw text up to the end of line.
    fn command(&mut self) -> Result<Token<'de>, LexError> {
        self.skip_blanks();
        if self.rest().starts_with("{{") {
            self.mode = Mode::Braced { open: self.byte };
            return Ok(self.take(TokenKind::LeftBrace, 2));
        }

        let rest = self.rest();
        let start = self.byte;
        let mut from = 0;
        let end = loop {
            match rest[from..].find('\n') {
                Some(i) if rest[..from + i].trim_end_matches('\r').ends_with('\\') => {
                    from += i + 1
                }
                Some(i) => break Some(from + i),
                None => break None,
            }
        };

        let text = match end {
            Some(end) => {
                self.byte += end + 1;
                &rest[..end]
            }
            None if rest.trim_end_matches('\r').ends_with('\\') => {
                return Err(LexError::UnterminatedCommand {
                    span: SourceSpan::from(start..self.whole.len()),
                });
            }
            None => {
                self.byte += rest.len();
                rest
            }
        };
        let text = text.trim_end_matches('\r');

        // one newline for the command itself, one per line list it ends
        let closed = self.close_lines();
        self.mode = Mode::Newlines(1 + closed);
        Ok(Token {
            kind: TokenKind::Command,
            literal: text,
            span: SourceSpan::from(start..start + text.len()),
        })
    }

    fn braced(&mut self, open: usize) -> Result<Token<'de>, LexError> {
        let Some(end) = self.rest().find("}}") else {
            return Err(LexError::UnterminatedBlock {
                span: SourceSpan::from(open..open + 2),
            });
        };
        self.mode = Mode::Closing;
        Ok(self.take(TokenKind::Command, end))
    }

    fn closing(&mut self) -> Result<Token<'de>, LexError> {
        self.mode = Mode::Normal;
        Ok(self.take(TokenKind::RightBrace, 2))
    }
}
