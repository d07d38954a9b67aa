use std::fmt::Display;

/// Leading symbol of an exec expression. What each one runs is up to the
/// evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    Dollar,
    Bang,
    Ampersand,
    Slash,
    Question,
}

impl Prefix {
    pub fn from_char(c: char) -> Option<Prefix> {
        match c {
            '$' => Some(Prefix::Dollar),
            '!' => Some(Prefix::Bang),
            '&' => Some(Prefix::Ampersand),
            '/' => Some(Prefix::Slash),
            '?' => Some(Prefix::Question),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Prefix::Dollar => '$',
            Prefix::Bang => '!',
            Prefix::Ampersand => '&',
            Prefix::Slash => '/',
            Prefix::Question => '?',
        }
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One parsed statement. All text borrows from the script.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'de> {
    /// `set option value;` where an omitted value is empty.
    Set { option: &'de str, value: &'de str },
    /// `map keys <expr>`
    Map { keys: &'de str, body: Box<Expr<'de>> },
    /// `cmd name <expr>`
    Cmd { name: &'de str, body: Box<Expr<'de>> },
    /// `name args...;`
    Call { name: &'de str, args: Vec<&'de str> },
    /// A prefixed shell or search command.
    Exec { prefix: Prefix, text: &'de str },
    /// `:` list, never empty.
    List { body: Vec<Expr<'de>> },
}

/// Whether command text survives being written as `$text` on one line.
fn fits_line(text: &str) -> bool {
    !text.starts_with([' ', '\t'])
        && !text.starts_with("{{")
        && !text.ends_with(['\\', '\r'])
        && text
            .match_indices('\n')
            .all(|(i, _)| text[..i].trim_end_matches('\r').ends_with('\\'))
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Set { option, value } if value.is_empty() => write!(f, "set {option};"),
            Expr::Set { option, value } => write!(f, "set {option} {value};"),
            Expr::Map { keys, body } => write!(f, "map {keys} {body}"),
            Expr::Cmd { name, body } => write!(f, "cmd {name} {body}"),
            Expr::Call { name, args } => {
                write!(f, "{name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ";")
            }
            Expr::Exec { prefix, text } if fits_line(text) => writeln!(f, "{prefix}{text}"),
            Expr::Exec { prefix, text } => write!(f, "{prefix}{{{{{text}}}}};"),
            Expr::List { body } => {
                write!(f, ":{{{{ ")?;
                for expr in body {
                    write!(f, "{expr} ")?;
                }
                write!(f, "}}}};")
            }
        }
    }
}
