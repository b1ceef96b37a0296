//! Command-line front end for the editor tools.
//!
//! Prints the same reports the editor panel shows, so results can be
//! checked from scripts.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use xmltools::error::Outcome;
use xmltools::parser::ParseOptions;
use xmltools::report;
use xmltools::tools::{self, ParsedTree};

/// Check XML well-formedness, compile RelaxNG schemas, and run `XPath`
/// queries.
#[derive(Parser, Debug)]
#[command(name = "xmltools", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    parse: ParseArgs,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Keep parsing after recoverable errors and report all of them.
    #[arg(long, global = true)]
    recover: bool,

    /// Maximum element nesting depth.
    #[arg(long, value_name = "N", global = true)]
    max_depth: Option<u32>,
}

impl ParseArgs {
    fn options(&self) -> ParseOptions {
        let options = ParseOptions::default().recover(self.recover);
        match self.max_depth {
            Some(depth) => options.max_depth(depth),
            None => options,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a document for well-formedness.
    Validate {
        /// Input file, or `-` for stdin.
        file: String,
    },
    /// Compile a document as a RelaxNG schema.
    #[command(name = "relaxng")]
    RelaxNg {
        /// Schema file, or `-` for stdin.
        file: String,
    },
    /// Evaluate an `XPath` expression against a document.
    Xpath {
        /// Input file, or `-` for stdin.
        file: String,
        /// Expression evaluated with the root element as context.
        expression: String,
    },
    /// Validate a document against a RelaxNG schema.
    Check {
        /// Instance file, or `-` for stdin.
        file: String,
        /// RelaxNG schema file.
        #[arg(long, value_name = "RNG")]
        schema: String,
    },
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_PARSE_ERROR: u8 = 1;
const EXIT_VALIDATION_ERROR: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("xmltools: {e:#}");
            ExitCode::from(EXIT_PARSE_ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<u8> {
    let options = cli.parse.options();
    match &cli.command {
        Command::Validate { file } => {
            let xml = parse_input(file, &options)?;
            emit(&report::validation_report(file, &xml));
            Ok(exit_for(&xml, EXIT_PARSE_ERROR))
        }
        Command::RelaxNg { file } => {
            let xml = parse_input(file, &options)?;
            let schema = xml.success().map(tools::compile_schema);
            emit(&report::relaxng_report(file, &xml, schema.as_ref()));
            Ok(match schema {
                Some(schema) => exit_for(&schema, EXIT_VALIDATION_ERROR),
                None => EXIT_PARSE_ERROR,
            })
        }
        Command::Xpath { file, expression } => {
            let xml = parse_input(file, &options)?;
            let result = xml.success().map(|tree| tools::evaluate(tree, expression));
            emit(&report::xpath_report(&xml, result.as_deref()));
            Ok(EXIT_SUCCESS)
        }
        Command::Check { file, schema } => check(file, schema, &options),
    }
}

fn check(file: &str, schema_file: &str, options: &ParseOptions) -> Result<u8> {
    let schema_xml = parse_input(schema_file, options)?;
    let compiled = schema_xml.success().map(tools::compile_schema);
    let handle = match compiled {
        Some(Outcome::Success(handle)) => handle,
        compiled => {
            emit(&report::relaxng_report(
                schema_file,
                &schema_xml,
                compiled.as_ref(),
            ));
            return Ok(schema_failure_exit(compiled.as_ref()));
        }
    };

    let xml = parse_input(file, options)?;
    let validity = xml.success().map(|tree: &ParsedTree| handle.validate(tree));
    emit(&report::instance_report(file, &xml, validity.as_ref()));
    Ok(match validity {
        Some(validity) => exit_for(&validity, EXIT_VALIDATION_ERROR),
        None => EXIT_PARSE_ERROR,
    })
}

/// Prints a report, ending it with exactly one newline.
fn emit(report: &str) {
    if report.ends_with('\n') {
        print!("{report}");
    } else {
        println!("{report}");
    }
}

fn exit_for<T>(outcome: &Outcome<T>, failure: u8) -> u8 {
    if outcome.is_success() {
        EXIT_SUCCESS
    } else {
        failure
    }
}

/// Exit code for a schema that could not be used. `compiled` is `None` when
/// the schema file itself is not well-formed.
fn schema_failure_exit<T>(compiled: Option<&Outcome<T>>) -> u8 {
    match compiled {
        None => EXIT_PARSE_ERROR,
        Some(_) => EXIT_VALIDATION_ERROR,
    }
}

/// Reads and parses a file, or stdin when `path` is `-`. Invalid UTF-8 is
/// reported like any other parse failure rather than as an I/O error.
fn parse_input(path: &str, options: &ParseOptions) -> Result<Outcome<ParsedTree>> {
    Ok(tools::validate_bytes_with_options(&read_input(path)?, options))
}

fn read_input(path: &str) -> Result<Vec<u8>> {
    if path == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        fs::read(path).with_context(|| format!("failed to read {path}"))
    }
}
