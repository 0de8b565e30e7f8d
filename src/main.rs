use clap::{Parser as ClapParser, Subcommand};
use formql::cli::{self, CheckOptions, CheckResult, CliError, RunOptions};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "formql")]
#[command(about = "FormQL - A restricted SELECT/UPDATE query compiler for form submissions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Schema snapshot JSON file (omit to query internal tables only)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Compiler configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Upper bound for LIMIT
    #[arg(long)]
    max_limit: Option<u64>,

    /// LIMIT applied to SELECTs without one
    #[arg(long)]
    default_limit: Option<u64>,

    /// Pretty-print the output
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query and print the plan or the errors
    Check {
        /// The FormQL query to check
        query: String,

        #[command(flatten)]
        args: CompileArgs,

        /// Only validate syntax, don't bind against the schema
        #[arg(long)]
        syntax_only: bool,
    },

    /// Compile a query and execute it over JSON records
    Run {
        /// The FormQL query to run
        query: String,

        #[command(flatten)]
        args: CompileArgs,

        /// JSON array of records (reads from stdin if not provided)
        #[arg(short, long)]
        records: Option<PathBuf>,
    },

    /// List the available functions
    Functions,

    /// List documentation categories
    Docs,

    /// Show documentation for a specific category
    Doc {
        /// Category name (use 'formql docs' to list categories)
        category: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FORMQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            query,
            args,
            syntax_only,
        } => run_check(query, args, syntax_only),
        Commands::Run {
            query,
            args,
            records,
        } => run_query(query, args, records),
        Commands::Functions => {
            print!("{}", cli::function_listing());
            Ok(true)
        }
        Commands::Docs => {
            print!("{}", cli::get_docs_overview());
            Ok(true)
        }
        Commands::Doc { category } => cli::get_doc_category(&category).map(|content| {
            print!("{}", content);
            true
        }),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }?;
    println!("{}", json);
    Ok(())
}

/// Returns whether the query compiled cleanly.
fn run_check(query: String, args: CompileArgs, syntax_only: bool) -> Result<bool, CliError> {
    let options = CheckOptions {
        query,
        schema: cli::load_schema(args.schema.as_deref())?,
        config: cli::load_config(args.config.as_deref(), args.max_limit, args.default_limit)?,
        syntax_only,
    };

    let result = cli::execute_check(&options)?;
    match &result {
        CheckResult::SyntaxValid => println!("Syntax is valid"),
        CheckResult::Compiled(outcome) => print_json(outcome, args.pretty)?,
    }
    Ok(result.is_ok())
}

fn run_query(query: String, args: CompileArgs, records: Option<PathBuf>) -> Result<bool, CliError> {
    let records = match records {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
        None => None,
    };

    let options = RunOptions {
        query,
        schema: cli::load_schema(args.schema.as_deref())?,
        config: cli::load_config(args.config.as_deref(), args.max_limit, args.default_limit)?,
        records,
    };

    let output = cli::execute_run(&options)?;
    print_json(&output.to_json(), args.pretty)?;
    Ok(true)
}
