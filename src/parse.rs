use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::{
    Expr, Prefix,
    lex::{LexError, Position, Scanner, Token, TokenKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    IncompleteInput,
}

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum ParseError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexical(#[from] LexError),

    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(parse::syntax))]
    Syntax {
        expected: &'static str,
        found: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unexpected end of input, expected {expected}")]
    #[diagnostic(
        code(parse::incomplete),
        help("the script ends before this statement is complete")
    )]
    Incomplete {
        expected: &'static str,
        #[label("input ends here")]
        span: SourceSpan,
    },
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Lexical(_) => ErrorKind::Lexical,
            ParseError::Syntax { .. } => ErrorKind::Syntax,
            ParseError::Incomplete { .. } => ErrorKind::IncompleteInput,
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            ParseError::Lexical(e) => e.span(),
            ParseError::Syntax { span, .. } | ParseError::Incomplete { span, .. } => *span,
        }
    }

    /// 1-based line of `src` the error points at.
    pub fn line(&self, src: &str) -> usize {
        let offset = self.span().offset().min(src.len());
        src[..offset].matches('\n').count() + 1
    }
}

/// Recursive-descent parser producing one [`Expr`] per statement.
///
/// The first error is sticky: every later call reports it again.
pub struct Parser<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    scanner: Scanner<'de>,
    expr: Option<Expr<'de>>,
    error: Option<ParseError>,
    trace: Option<Box<dyn FnMut(&Expr<'de>) + 'de>>,
    tokens: Option<Vec<Token<'de>>>,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        let mut scanner = Scanner::new(whole);
        scanner.scan(Position::Start);
        Parser {
            filename,
            whole,
            scanner,
            expr: None,
            error: None,
            trace: None,
            tokens: None,
        }
    }

    /// Calls `trace` with every node as it is built, nested nodes first.
    pub fn with_trace(mut self, trace: impl FnMut(&Expr<'de>) + 'de) -> Self {
        self.trace = Some(Box::new(trace));
        self
    }

    /// Keeps every token the parser moves over, see [`Parser::tokens`].
    pub fn record_tokens(mut self) -> Self {
        self.tokens = Some(vec![self.scanner.token()]);
        self
    }

    pub fn tokens(&self) -> &[Token<'de>] {
        self.tokens.as_deref().unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// The expression kept by the last [`Parser::parse`].
    pub fn expr(&self) -> Option<&Expr<'de>> {
        self.expr.as_ref()
    }

    pub fn into_expr(self) -> Option<Expr<'de>> {
        self.expr
    }

    /// Renders `error` against this parser's source.
    pub fn report(&self, error: ParseError) -> Report {
        Report::new(error).with_source_code(NamedSource::new(
            self.filename.unwrap_or("<input>"),
            self.whole.to_string(),
        ))
    }

    /// Parses one statement and keeps it. False on end of input or error,
    /// check [`Parser::error`] to tell them apart.
    pub fn parse(&mut self) -> bool {
        self.expr = self.parse_expr().ok().flatten();
        self.expr.is_some()
    }

    /// Parses the next statement, `Ok(None)` at a clean end of input.
    pub fn parse_expr(&mut self) -> Result<Option<Expr<'de>>, ParseError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.statement().inspect_err(|e| self.error = Some(e.clone()))
    }

    fn statement(&mut self) -> Result<Option<Expr<'de>>, ParseError> {
        self.skip_semicolons();
        if self.scanner.token().kind == TokenKind::Eof {
            return match self.scanner.error() {
                Some(e) => Err(e.clone().into()),
                None => Ok(None),
            };
        }
        self.expression().map(Some)
    }

    fn advance(&mut self, at: Position) {
        let more = self.scanner.scan(at);
        if let Some(tokens) = &mut self.tokens {
            let token = self.scanner.token();
            if more || tokens.last() != Some(&token) {
                tokens.push(token);
            }
        }
    }

    fn skip_semicolons(&mut self) {
        while self.scanner.token().is_semicolon() {
            self.advance(Position::Start);
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = self.scanner.token();
        if token.kind == TokenKind::Eof {
            if let Some(e) = self.scanner.error() {
                return e.clone().into();
            }
            return ParseError::Incomplete {
                expected,
                span: token.span,
            };
        }
        ParseError::Syntax {
            expected,
            found: token.describe(),
            span: token.span,
        }
    }

    fn expression(&mut self) -> Result<Expr<'de>, ParseError> {
        self.skip_semicolons();
        let token = self.scanner.token();
        let expr = match token.kind {
            TokenKind::Ident => match token.literal {
                "set" => self.set()?,
                "map" => {
                    let keys = self.operand("a key sequence")?;
                    self.advance(Position::Start);
                    let body = Box::new(self.expression()?);
                    Expr::Map { keys, body }
                }
                "cmd" => {
                    let name = self.operand("a command name")?;
                    self.advance(Position::Start);
                    let body = Box::new(self.expression()?);
                    Expr::Cmd { name, body }
                }
                name => self.call(name)?,
            },
            TokenKind::Colon => self.list()?,
            TokenKind::Prefix => self.exec(token)?,
            _ => return Err(self.unexpected("an expression")),
        };

        if let Some(e) = self.scanner.error() {
            return Err(e.clone().into());
        }
        if let Some(trace) = self.trace.as_mut() {
            trace(&expr);
        }
        Ok(expr)
    }

    fn operand(&mut self, expected: &'static str) -> Result<&'de str, ParseError> {
        self.advance(Position::Operand);
        let token = self.scanner.token();
        if token.kind == TokenKind::Ident {
            Ok(token.literal)
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Ends a statement at `;`. A newline is left for the line list it
    /// closes.
    fn terminate(&mut self) -> Result<(), ParseError> {
        let token = self.scanner.token();
        if token.is_semicolon() {
            self.advance(Position::Start);
            Ok(())
        } else if token.is_newline() {
            Ok(())
        } else {
            Err(self.unexpected("`;`"))
        }
    }

    fn semicolon(&mut self) -> Result<(), ParseError> {
        if self.scanner.token().is_semicolon() {
            self.advance(Position::Start);
            Ok(())
        } else {
            Err(self.unexpected("`;`"))
        }
    }

    fn set(&mut self) -> Result<Expr<'de>, ParseError> {
        let option = self.operand("an option name")?;
        self.advance(Position::Operand);

        let token = self.scanner.token();
        let value = if token.kind == TokenKind::Ident {
            self.advance(Position::Operand);
            token.literal
        } else {
            ""
        };

        self.terminate()?;
        Ok(Expr::Set { option, value })
    }

    fn call(&mut self, name: &'de str) -> Result<Expr<'de>, ParseError> {
        let mut args = Vec::new();
        loop {
            self.advance(Position::Operand);
            let token = self.scanner.token();
            if token.kind != TokenKind::Ident {
                break;
            }
            args.push(token.literal);
        }

        self.terminate()?;
        Ok(Expr::Call { name, args })
    }

    fn list(&mut self) -> Result<Expr<'de>, ParseError> {
        self.advance(Position::Start);

        let mut body = Vec::new();
        if self.scanner.token().kind == TokenKind::LeftBrace {
            self.advance(Position::Start);
            loop {
                self.skip_semicolons();
                if self.scanner.token().kind == TokenKind::RightBrace && !body.is_empty() {
                    break;
                }
                body.push(self.expression()?);
            }
            self.advance(Position::Operand);
            self.semicolon()?;
        } else {
            loop {
                self.skip_semicolons();
                if self.scanner.token().is_newline() && !body.is_empty() {
                    break;
                }
                body.push(self.expression()?);
            }
            self.advance(Position::Start);
        }

        Ok(Expr::List { body })
    }

    fn exec(&mut self, token: Token<'de>) -> Result<Expr<'de>, ParseError> {
        let prefix = token
            .literal
            .chars()
            .next()
            .and_then(Prefix::from_char)
            .ok_or_else(|| self.unexpected("a command prefix"))?;
        self.advance(Position::Operand);

        let text = if self.scanner.token().kind == TokenKind::LeftBrace {
            self.advance(Position::Operand);
            let text = self.command_text()?;
            self.advance(Position::Operand);
            if self.scanner.token().kind != TokenKind::RightBrace {
                return Err(self.unexpected("`}}`"));
            }
            self.advance(Position::Operand);
            self.semicolon()?;
            text
        } else {
            let text = self.command_text()?;
            self.advance(Position::Operand);
            if !self.scanner.token().is_newline() {
                return Err(self.unexpected("end of line"));
            }
            self.advance(Position::Start);
            text
        };

        Ok(Expr::Exec { prefix, text })
    }

    fn command_text(&self) -> Result<&'de str, ParseError> {
        let token = self.scanner.token();
        if token.kind == TokenKind::Command {
            Ok(token.literal)
        } else {
            Err(self.unexpected("command text"))
        }
    }
}

impl<'de> Iterator for Parser<'de> {
    type Item = Result<Expr<'de>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error.is_some() {
            return None;
        }
        self.parse_expr().transpose()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_one(src: &str) -> Result<Option<Expr<'_>>, ParseError> {
        Parser::new(None, src).parse_expr()
    }

    fn set<'a>(option: &'a str, value: &'a str) -> Expr<'a> {
        Expr::Set { option, value }
    }

    fn call<'a>(name: &'a str, args: &[&'a str]) -> Expr<'a> {
        Expr::Call {
            name,
            args: args.to_vec(),
        }
    }

    #[test]
    fn set_flag() {
        assert_eq!(parse_one("set nohidden;"), Ok(Some(set("nohidden", ""))));
    }

    #[test]
    fn set_value() {
        assert_eq!(
            parse_one("set ratios 1:2:3;"),
            Ok(Some(set("ratios", "1:2:3")))
        );
    }

    #[test]
    fn map_call() {
        assert_eq!(
            parse_one("map gg top;"),
            Ok(Some(Expr::Map {
                keys: "gg",
                body: Box::new(call("top", &[])),
            }))
        );
    }

    #[test]
    fn cmd_raw_exec() {
        assert_eq!(
            parse_one("cmd usage $du -sh .|less\n"),
            Ok(Some(Expr::Cmd {
                name: "usage",
                body: Box::new(Expr::Exec {
                    prefix: Prefix::Dollar,
                    text: "du -sh .|less",
                }),
            }))
        );
    }

    #[test]
    fn braced_list() {
        assert_eq!(
            parse_one(":{{ set hidden; set preview; }};"),
            Ok(Some(Expr::List {
                body: vec![set("hidden", ""), set("preview", "")],
            }))
        );
    }

    #[test]
    fn call_keeps_argument_order() {
        assert_eq!(
            parse_one("open a b c;"),
            Ok(Some(call("open", &["a", "b", "c"])))
        );
    }

    #[test]
    fn braced_exec() {
        assert_eq!(
            parse_one("!{{ make all }};"),
            Ok(Some(Expr::Exec {
                prefix: Prefix::Bang,
                text: " make all ",
            }))
        );
    }

    #[test]
    fn line_list_ends_at_newline() {
        let mut parser = Parser::new(None, "map x : set a; redraw\nquit;");
        assert_eq!(
            parser.parse_expr(),
            Ok(Some(Expr::Map {
                keys: "x",
                body: Box::new(Expr::List {
                    body: vec![set("a", ""), call("redraw", &[])],
                }),
            }))
        );
        assert_eq!(parser.parse_expr(), Ok(Some(call("quit", &[]))));
        assert_eq!(parser.parse_expr(), Ok(None));
    }

    #[test]
    fn line_list_ending_in_raw_exec() {
        let mut parser = Parser::new(None, ": set a; $echo hi\nquit;");
        assert_eq!(
            parser.parse_expr(),
            Ok(Some(Expr::List {
                body: vec![
                    set("a", ""),
                    Expr::Exec {
                        prefix: Prefix::Dollar,
                        text: "echo hi",
                    },
                ],
            }))
        );
        assert_eq!(parser.parse_expr(), Ok(Some(call("quit", &[]))));
    }

    #[test]
    fn stray_semicolons_are_skipped() {
        assert_eq!(parse_one(";; ;quit;"), Ok(Some(call("quit", &[]))));
        assert_eq!(parse_one(" ;\n; "), Ok(None));
    }

    #[test]
    fn truncated_map_is_incomplete() {
        let mut parser = Parser::new(None, "map gg");
        assert!(!parser.parse());
        assert_eq!(
            parser.error().map(ParseError::kind),
            Some(ErrorKind::IncompleteInput)
        );
        assert_eq!(parser.into_expr(), None);
    }

    #[test]
    fn into_expr_hands_over_the_kept_tree() {
        let mut parser = Parser::new(None, "map N ?foo bar\n");
        assert!(parser.parse());
        assert_eq!(
            parser.into_expr(),
            Some(Expr::Map {
                keys: "N",
                body: Box::new(Expr::Exec {
                    prefix: Prefix::Question,
                    text: "foo bar",
                }),
            })
        );
    }

    #[test]
    fn unterminated_exec_block_is_lexical() {
        let mut parser = Parser::new(None, "$ {{ echo hi");
        assert!(!parser.parse());
        assert_eq!(
            parser.error().map(ParseError::kind),
            Some(ErrorKind::Lexical)
        );
    }

    #[test]
    fn clean_end_is_not_an_error() {
        let mut parser = Parser::new(None, "   \n");
        assert!(!parser.parse());
        assert_eq!(parser.error(), None);
    }

    #[test]
    fn unknown_leading_token_is_syntax_error() {
        let error = parse_one("}} quit;").expect_err("syntax error");
        assert_eq!(error.kind(), ErrorKind::Syntax);
        assert_eq!(error.to_string(), "expected an expression, found `}}`");
    }

    #[test]
    fn empty_list_is_rejected() {
        let error = parse_one(":{{ }};").expect_err("empty list");
        assert_eq!(error.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn set_with_too_many_operands() {
        let error = parse_one("set a b c;").expect_err("syntax error");
        assert_eq!(
            error,
            ParseError::Syntax {
                expected: "`;`",
                found: "`c`".to_string(),
                span: SourceSpan::from(8..9),
            }
        );
    }

    #[test]
    fn braced_exec_needs_semicolon() {
        let error = parse_one("${{ ls }} quit;").expect_err("syntax error");
        assert_eq!(error.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn error_is_sticky() {
        let mut parser = Parser::new(None, "map gg");
        let first = parser.parse_expr().expect_err("incomplete");
        assert_eq!(parser.parse_expr(), Err(first.clone()));
        assert_eq!(parser.error(), Some(&first));
    }

    #[test]
    fn lexical_error_aborts_statement() {
        let error = parse_one(":{{ open a;").expect_err("lexical");
        assert_eq!(error.kind(), ErrorKind::Lexical);
    }

    #[test]
    fn trace_sees_nested_nodes_first() {
        let mut seen = Vec::new();
        {
            let mut parser =
                Parser::new(None, "map gg top;").with_trace(|expr| seen.push(expr.to_string()));
            assert!(parser.parse());
        }
        assert_eq!(seen, vec!["top;".to_string(), "map gg top;".to_string()]);
    }

    #[test]
    fn error_line() {
        let src = "set a;\nset b;\nmap x";
        let error = parse_one_after(src, 2);
        assert_eq!(error.line(src), 3);
    }

    fn parse_one_after(src: &str, skip: usize) -> ParseError {
        let mut parser = Parser::new(None, src);
        for _ in 0..skip {
            parser.parse_expr().expect("statement");
        }
        parser.parse_expr().expect_err("error")
    }
}
