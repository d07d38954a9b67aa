use std::fs;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use lf_script::ParseError;
use miette::IntoDiagnostic;
use miette::WrapErr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect file manager command scripts")]
struct Args {
    /// Log every parsed node.
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the token stream.
    Tokenize {
        #[command(flatten)]
        source: Source,
    },
    /// Print every statement in canonical form.
    Parse {
        #[command(flatten)]
        source: Source,
    },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct Source {
    /// Script file to read.
    filename: Option<PathBuf>,

    /// Script given inline.
    #[arg(short = 'e', long = "expr")]
    inline: Option<String>,
}

impl Source {
    fn load(&self) -> miette::Result<(String, String)> {
        match (&self.filename, &self.inline) {
            (Some(filename), _) => {
                let contents = fs::read_to_string(filename)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;
                Ok((filename.display().to_string(), contents))
            }
            (None, Some(inline)) => Ok(("<expr>".to_string(), inline.clone())),
            (None, None) => Err(miette::miette!("no script given")),
        }
    }
}

fn init_tracing(trace: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if trace { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn fail(parser: &lf_script::Parser<'_>, src: &str, e: ParseError) -> ! {
    eprintln!("[line {}] Error: {e}", e.line(src));
    eprintln!("{:?}", parser.report(e));
    std::process::exit(65);
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_tracing(args.trace);

    match args.command {
        Commands::Tokenize { source } => {
            let (name, contents) = source.load()?;
            let mut parser = lf_script::Parser::new(Some(name.as_str()), &contents).record_tokens();
            let parsed: Result<Vec<_>, _> = parser.by_ref().collect();
            for token in parser.tokens() {
                println!("{token}");
            }
            if let Err(e) = parsed {
                fail(&parser, &contents, e);
            }
        }
        Commands::Parse { source } => {
            let (name, contents) = source.load()?;
            let mut parser = lf_script::Parser::new(Some(name.as_str()), &contents)
                .with_trace(|expr| tracing::debug!(%expr, "parsed"));
            let parsed: Result<Vec<_>, _> = parser.by_ref().collect();
            let exprs = match parsed {
                Ok(exprs) => exprs,
                Err(e) => fail(&parser, &contents, e),
            };
            tracing::info!(statements = exprs.len(), "parsed {name}");
            for expr in exprs {
                let expr = expr.to_string();
                if expr.ends_with('\n') {
                    print!("{expr}");
                } else {
                    println!("{expr}");
                }
            }
        }
    }
    Ok(())
}
