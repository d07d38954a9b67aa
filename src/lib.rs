//! Scanner and parser for the command language of a terminal file manager's
//! configuration scripts: options (`set`), key bindings (`map`), macros
//! (`cmd`), calls, prefixed shell commands and lists.
//!
//! ```
//! use lf_script::{Expr, parse_script};
//!
//! let exprs = parse_script(None, "set hidden;\nmap gg top;").unwrap();
//! assert_eq!(exprs[0], Expr::Set { option: "hidden", value: "" });
//! ```

pub mod expr;
pub mod lex;
pub mod parse;

pub use expr::{Expr, Prefix};
pub use lex::{LexError, Scanner, Token, TokenKind};
pub use parse::{ErrorKind, ParseError, Parser};

/// Parses a whole script. The first error rejects all of it.
pub fn parse_script<'de>(
    filename: Option<&'de str>,
    src: &'de str,
) -> Result<Vec<Expr<'de>>, ParseError> {
    Parser::new(filename, src).collect()
}
