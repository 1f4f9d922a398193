use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lispy::repl::{self, ReplOptions};
use lispy::{Config, Interpreter, MAX_EVAL_DEPTH};

/// lispy is a small Lisp with quoted forms, closures, currying and errors as
/// values.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source files to load, in order, before the REPL starts.
    files: Vec<PathBuf>,

    /// Exit after loading the files instead of starting the REPL.
    #[arg(long)]
    no_repl: bool,

    /// Maximum nesting depth of evaluation.
    #[arg(long, default_value_t = MAX_EVAL_DEPTH)]
    max_depth: usize,

    /// Print the syntax tree of each REPL line before evaluating it.
    #[arg(long)]
    print_tree: bool,

    /// Tracing filter such as `lispy=debug`; takes precedence over RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

/// Install a stderr subscriber when a filter is given or RUST_LOG is set
fn init_tracing(directive: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match directive {
        Some(directive) => match EnvFilter::try_new(directive) {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!("Ignoring invalid log filter '{directive}': {err}");
                return;
            }
        },
        None if std::env::var("RUST_LOG").is_ok() => EnvFilter::from_default_env(),
        None => return,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn run(args: Args) -> Result<(), lispy::Error> {
    let interp = Interpreter::with_config(Config {
        max_eval_depth: args.max_depth,
    });

    for file in &args.files {
        let result = interp.load_file(file);
        if result.is_error() {
            interp.write_line(&result.to_string());
        }
    }
    interp.flush();

    if args.no_repl {
        return Ok(());
    }
    repl::run(
        &interp,
        ReplOptions {
            print_tree: args.print_tree,
        },
    )
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    let result = panic::catch_unwind(|| run(args));

    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
        Err(panic_info) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }
            ExitCode::FAILURE
        }
    }
}
