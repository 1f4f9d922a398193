//! The interpreter session: evaluation of values, procedure application and
//! file loading.
//!
//! Evaluation is a direct recursive walk over [`Datum`] trees. Symbols are
//! looked up, active forms are reduced and applied, and everything else is
//! self-evaluating. An active form always evaluates every child before it
//! looks for errors, so side effects of children after a failing sibling still
//! happen:
//!
//! ```text
//! lispy> (print 1) (/ 1 0) (print 2)
//! 1
//! 2
//! Error: Division By Zero!
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::iter;
use std::path::Path;

use tracing::{instrument, trace, warn};

use crate::builtinops::builtin_ops;
use crate::datum::{Closure, Datum, Procedure, VARIADIC_MARKER};
use crate::environment::{EnvRef, Environment};
use crate::{EvalError, Error, MAX_EVAL_DEPTH, reader, syntax};

/// Evaluation limits of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum nesting of active form evaluation
    pub max_eval_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// An interpreter session: the root environment, evaluation limits and the
/// sink that `print` and `load` write to.
pub struct Interpreter {
    globals: EnvRef,
    config: Config,
    depth: Cell<usize>,
    output: RefCell<Box<dyn Write>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

/// Restores the depth counter when an evaluation level is left, including by
/// unwinding.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
    saved: usize,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.saved);
    }
}

impl Interpreter {
    /// A session with default limits writing to stdout
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let globals = Environment::new_root();
        for op in builtin_ops() {
            globals.define_local(op.name, op.procedure());
        }
        Interpreter {
            globals,
            config,
            depth: Cell::new(0),
            output: RefCell::new(Box::new(io::stdout())),
        }
    }

    /// Redirect `print` output and load diagnostics
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = RefCell::new(Box::new(output));
        self
    }

    /// The root environment
    pub fn globals(&self) -> &EnvRef {
        &self.globals
    }

    /// Evaluate `expr` in `env`.
    pub fn eval(&self, env: &EnvRef, expr: Datum) -> Datum {
        trace!(%expr, "eval");
        match expr {
            Datum::Symbol(name) => env.lookup(&name).unwrap_or_else(Datum::from),
            Datum::Active(children) => self.eval_active(env, children),
            other => other,
        }
    }

    fn eval_active(&self, env: &EnvRef, children: Vec<Datum>) -> Datum {
        let depth = self.depth.get();
        if depth >= self.config.max_eval_depth {
            warn!(max = self.config.max_eval_depth, "evaluation depth limit exceeded");
            return EvalError::DepthExceeded(self.config.max_eval_depth).into();
        }
        self.depth.set(depth + 1);
        let _guard = DepthGuard {
            depth: &self.depth,
            saved: depth,
        };

        ensure_sufficient_stack(|| self.reduce_active(env, children))
    }

    fn reduce_active(&self, env: &EnvRef, children: Vec<Datum>) -> Datum {
        // Every child is evaluated before any error is considered
        let mut values: Vec<Datum> = children
            .into_iter()
            .map(|child| self.eval(env, child))
            .collect();

        if let Some(index) = values.iter().position(Datum::is_error) {
            return values.swap_remove(index);
        }

        match values.len() {
            0 => Datum::Active(values),
            1 => match values.pop() {
                Some(Datum::Procedure(procedure)) => self.apply(env, procedure, Vec::new()),
                Some(value) => value,
                None => Datum::unit(),
            },
            _ => {
                let mut values = values.into_iter();
                match values.next() {
                    Some(Datum::Procedure(procedure)) => {
                        self.apply(env, procedure, values.collect())
                    }
                    Some(other) => EvalError::NotAFunction(other.type_name()).into(),
                    None => Datum::unit(),
                }
            }
        }
    }

    /// Apply `procedure` to already evaluated `args`.
    ///
    /// `env` is the caller's environment; builtins such as `=` and `\` act on
    /// it, while closures only ever see their captured scope.
    #[instrument(level = "debug", skip_all, fields(procedure = %procedure.name(), argc = args.len()))]
    pub fn apply(&self, env: &EnvRef, procedure: Procedure, args: Vec<Datum>) -> Datum {
        match procedure {
            Procedure::Builtin(op) => op.invoke(self, env, args),
            Procedure::Closure(closure) => self
                .call_closure(closure, args)
                .unwrap_or_else(Datum::from),
        }
    }

    /// Bind arguments to formals in a fresh child of the captured scope.
    ///
    /// Fewer arguments than formals produce a partially applied closure over
    /// the new scope; more arguments than formals are an error.
    fn call_closure(&self, closure: Closure, args: Vec<Datum>) -> Result<Datum, EvalError> {
        let Closure { formals, body, env } = closure;
        let call_env = Environment::child(&env);
        let given = args.len();
        let expected = formals.len();
        let mut formals = VecDeque::from(formals);

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let Some(formal) = formals.pop_front() else {
                return Err(EvalError::TooManyArguments {
                    got: given,
                    expected,
                });
            };

            if formal == VARIADIC_MARKER {
                let capture = single_capture(&mut formals)?;
                let rest: Vec<Datum> = iter::once(arg).chain(args).collect();
                call_env.define_local(&capture, Datum::Quoted(rest));
                break;
            }
            call_env.define_local(&formal, arg);
        }

        // A rest parameter that received nothing is bound to {}
        if formals.front().is_some_and(|formal| formal == VARIADIC_MARKER) {
            formals.pop_front();
            let capture = single_capture(&mut formals)?;
            call_env.define_local(&capture, Datum::Quoted(Vec::new()));
        }

        if formals.is_empty() {
            Ok(self.eval(&call_env, Datum::Active(body)))
        } else {
            let partial = Closure::new(formals.into(), body, call_env);
            Ok(Datum::Procedure(Procedure::Closure(partial)))
        }
    }

    /// Parse `source` and evaluate all of it as a single active form in the
    /// root environment.
    pub fn eval_source(&self, source: &str) -> Result<Datum, Error> {
        let tree = syntax::parse_program(source)?;
        Ok(self.eval(&self.globals, reader::read(&tree)))
    }

    /// Evaluate every top-level expression of a file in the root environment.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Datum {
        self.load_file_in(&self.globals, path)
    }

    /// Evaluate every top-level expression of a file in `env`.
    ///
    /// Expressions are evaluated one at a time; an error result is written to
    /// the output sink and loading carries on with the next expression. The
    /// result is `()` unless the file cannot be read or parsed.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_file_in(&self, env: &EnvRef, path: impl AsRef<Path>) -> Datum {
        let path = path.as_ref();
        let expressions = match read_source_file(path) {
            Ok(expressions) => expressions,
            Err(err) => {
                let reason = match err {
                    Error::Io { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                return EvalError::Load {
                    path: path.display().to_string(),
                    reason,
                }
                .into();
            }
        };

        for expr in expressions {
            let result = self.eval(env, expr);
            if result.is_error() {
                self.write_line(&result.to_string());
            }
        }
        Datum::unit()
    }

    /// Write one line to the output sink
    pub fn write_line(&self, line: &str) {
        let mut output = self.output.borrow_mut();
        if let Err(err) = writeln!(output, "{line}") {
            warn!(%err, "failed to write output");
        }
    }

    pub fn flush(&self) {
        if let Err(err) = self.output.borrow_mut().flush() {
            warn!(%err, "failed to flush output");
        }
    }
}

/// Parse a source file into its top-level expressions
pub fn read_source_file(path: &Path) -> Result<Vec<Datum>, Error> {
    let source = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = syntax::parse_program(&source)?;
    Ok(reader::read_program(&tree))
}

/// Stack left before a deeper evaluation level moves to a fresh segment
const RED_ZONE: usize = 100 * 1024;

/// Size of each additional stack segment
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, growing the native stack first if it is nearly exhausted.
///
/// Evaluation depth is then bounded by [`Config::max_eval_depth`] alone, not
/// by the stack size of the calling thread.
#[inline]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// The single capture name that must follow `&`
fn single_capture(formals: &mut VecDeque<String>) -> Result<String, EvalError> {
    if formals.len() != 1 {
        return Err(EvalError::VariadicFormat);
    }
    formals.pop_front().ok_or(EvalError::VariadicFormat)
}
