//! Interactive read-eval-print loop.

use std::io::{self, Write};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

use crate::builtinops::{BuiltinOp, builtin_ops, find_builtin};
use crate::datum::{Datum, Procedure};
use crate::environment::Environment;
use crate::evaluator::Interpreter;
use crate::{Error, EvalError, syntax};

pub const PROMPT: &str = "lispy> ";

/// REPL options
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplOptions {
    /// Dump the syntax tree of every line before evaluating it
    pub print_tree: bool,
}

/// Meta commands understood by the REPL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command<'a> {
    /// `:help`, or `:help <name>` for a single builtin
    Help(Option<&'a str>),
    Env,
    Quit,
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let mut words = line.split_whitespace();
    let command = match (words.next()?, words.next()) {
        (":help", topic) => Command::Help(topic),
        (":env", None) => Command::Env,
        (":quit" | ":exit", None) => Command::Quit,
        _ => return None,
    };
    // At most one argument
    words.next().is_none().then_some(command)
}

/// Run the loop until `:quit`, Ctrl-C or Ctrl-D
pub fn run(interp: &Interpreter, options: ReplOptions) -> Result<(), Error> {
    println!("Lispy Version {}", env!("CARGO_PKG_VERSION"));
    println!("Type :help for commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // History is a convenience; a failure to record it is not fatal
                if let Err(err) = rl.add_history_entry(line) {
                    debug!(%err, "could not add history entry");
                }

                match parse_command(line) {
                    Some(Command::Help(topic)) => {
                        let printed = match topic {
                            Some(name) => write_builtin_help(&mut io::stdout(), name),
                            None => write_help(&mut io::stdout()),
                        };
                        if let Err(err) = printed {
                            warn!(%err, "failed to print help");
                        }
                        continue;
                    }
                    Some(Command::Env) => {
                        if let Err(err) = write_environment(&mut io::stdout(), interp.globals()) {
                            warn!(%err, "failed to print environment");
                        }
                        continue;
                    }
                    Some(Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    None => {}
                }

                if options.print_tree {
                    match syntax::parse_program(line) {
                        Ok(tree) => print!("{tree}"),
                        Err(err) => println!("Error: {err}"),
                    }
                }

                // Unreadable input is reported like any other error value
                let result = interp
                    .eval_source(line)
                    .unwrap_or_else(|err| EvalError::Syntax(err.to_string()).into());
                println!("{result}");
                interp.flush();
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn write_op(out: &mut impl Write, op: &BuiltinOp) -> io::Result<()> {
    writeln!(out, "  {:<6} {:<14} {}", op.name, op.arity.to_string(), op.summary)
}

fn write_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  :help      - Show this help message")?;
    writeln!(out, "  :help NAME - Describe one builtin")?;
    writeln!(out, "  :env       - Show current environment bindings")?;
    writeln!(out, "  :quit      - Exit the interpreter")?;
    writeln!(out, "  :exit      - Exit the interpreter")?;
    writeln!(out, "  Ctrl+C     - Exit the interpreter")?;
    writeln!(out)?;
    writeln!(out, "Builtins:")?;
    for op in builtin_ops() {
        write_op(out, op)?;
    }
    writeln!(out)?;
    writeln!(out, "Examples:")?;
    writeln!(out, "  + 1 2 3")?;
    writeln!(out, "  fun {{add a b}} {{+ a b}}")?;
    writeln!(out, "  (add 1) 2")?;
    writeln!(out, "  head {{1 2 3}}")
}

fn write_builtin_help(out: &mut impl Write, name: &str) -> io::Result<()> {
    match find_builtin(name) {
        Some(op) => write_op(out, op),
        None => writeln!(out, "No builtin named '{name}'."),
    }
}

/// Render every visible binding, builtins first
fn write_environment(out: &mut impl Write, env: &Environment) -> io::Result<()> {
    let bindings = env.bindings();

    if bindings.is_empty() {
        return writeln!(out, "Environment is empty.");
    }

    writeln!(out, "Environment bindings ({} total):", bindings.len())?;
    writeln!(out)?;

    let (builtins, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Datum::Procedure(Procedure::Builtin(_))));

    if !builtins.is_empty() {
        writeln!(out, "Built-in functions ({}):", builtins.len())?;
        // Four columns
        for row in builtins.chunks(4) {
            let line: String = row.iter().map(|(name, _)| format!("  {name:<8}")).collect();
            writeln!(out, "{}", line.trim_end())?;
        }
        writeln!(out)?;
    }

    if !user_defined.is_empty() {
        writeln!(out, "User-defined values ({}):", user_defined.len())?;
        for (name, value) in user_defined {
            writeln!(out, "  {name} = {value}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn render(write: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_command() {
        let cases = vec![
            (":help", Some(Command::Help(None))),
            (":help def", Some(Command::Help(Some("def")))),
            (":help  \\ ", Some(Command::Help(Some("\\")))),
            (":help a b", None),
            (":env", Some(Command::Env)),
            (":env x", None),
            (":quit", Some(Command::Quit)),
            (":exit", Some(Command::Quit)),
            (":unknown", None),
            ("+ 1 2", None),
        ];
        for (line, expected) in cases {
            assert_eq!(parse_command(line), expected, "line {line}");
        }
    }

    #[test]
    fn test_help_lists_every_builtin() {
        let help = render(|out| write_help(out));
        for op in builtin_ops() {
            assert!(
                help.lines().any(|line| line.trim_start().starts_with(op.name)),
                "missing {}",
                op.name
            );
        }
    }

    #[test]
    fn test_help_for_one_builtin() {
        let text = render(|out| write_builtin_help(out, "head"));
        assert_eq!(text.split_whitespace().next(), Some("head"));
        assert!(text.contains("1"), "got {text}");
        assert_eq!(text.lines().count(), 1);

        assert_eq!(
            render(|out| write_builtin_help(out, "nope")),
            "No builtin named 'nope'.\n"
        );
    }

    #[test]
    fn test_format_environment() {
        let interp = Interpreter::new();
        interp.eval_source("def {answer} 42").unwrap();

        let text = render(|out| write_environment(out, interp.globals()));
        let total = builtin_ops().len() + 1;
        assert!(text.starts_with(&format!("Environment bindings ({total} total):")));
        assert!(text.contains(&format!("Built-in functions ({}):", builtin_ops().len())));
        assert!(text.contains("User-defined values (1):\n  answer = 42\n"));

        assert_eq!(
            render(|out| write_environment(out, &Environment::default())),
            "Environment is empty.\n"
        );
    }
}
