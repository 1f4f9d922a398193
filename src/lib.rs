//! Lispy - a minimal tree-walking Lisp
//!
//! This crate implements a small Lisp-family language with two list forms:
//! active forms `( ... )`, which are evaluated as procedure application, and
//! quoted forms `{ ... }`, which are inert data. Procedures are first class
//! (builtins and user closures), closures capture their defining environment
//! lexically, and errors are ordinary values rather than exceptions.
//!
//! ```text
//! lispy> + 1 2 3
//! 6
//! lispy> fun {add a b} {+ a b}
//! ()
//! lispy> (add 1) 2
//! 3
//! lispy> head {1 2 3}
//! {1}
//! lispy> / 1 0
//! Error: Division By Zero!
//! ```
//!
//! ## Error values
//!
//! Every operation that can fail returns a [`datum::Datum::Error`] in place of
//! its normal result. The evaluator evaluates every child of an active form and
//! then returns the first error among them, so side effects of later siblings
//! still happen. Errors then propagate unchanged to the top level.
//!
//! ## Modules
//!
//! - `datum`: the runtime value type and its printed form
//! - `environment`: lexical scopes chained through parent links
//! - `evaluator`: the interpreter session, evaluation and procedure application
//! - `builtinops`: the registry of primitive procedures
//! - `syntax`: source text to a generic tagged syntax tree
//! - `reader`: syntax tree to runtime values
//! - `repl`: the interactive front end

use std::fmt;
use std::path::PathBuf;

use crate::builtinops::Arity;

/// Maximum parsing depth to prevent stack overflow on hostile input.
/// This limits deeply nested brackets in source text.
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum evaluation depth.
///
/// Closures are not tail-call optimised and the evaluator grows its stack on
/// demand, so this bounds the memory held by runaway recursion in user code.
/// Exceeding it produces an error value.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray closing brackets)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string, unclosed brackets)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidSyntax => write!(f, "invalid syntax"),
            ParseErrorKind::Incomplete => write!(f, "incomplete input"),
            ParseErrorKind::TooDeeplyNested => write!(f, "too deeply nested"),
        }
    }
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, context: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
        }
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let char_offset = input
            .char_indices()
            .take_while(|(i, _)| *i < error_offset)
            .count();
        let context_start = char_offset.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Runtime error carried inside a [`datum::Datum::Error`] value.
///
/// These never unwind: the evaluator and every builtin return them as
/// ordinary values. The `Display` text is what the printer shows after
/// `"Error: "`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("Function '{func}' passed incorrect number of arguments. Got {got}, Expected {expected}.")]
    Arity {
        func: String,
        got: usize,
        expected: Arity,
    },
    #[error("Function passed too many arguments. Got {got}, Expected {expected}.")]
    TooManyArguments { got: usize, expected: usize },
    #[error("Function '{func}' passed incorrect type for argument {index}. Got {got}, Expected {expected}.")]
    Type {
        func: String,
        index: usize,
        got: &'static str,
        expected: &'static str,
    },
    #[error("Function '{func}' passed {{}} for argument {index}.")]
    EmptyCollection { func: String, index: usize },
    #[error("Function '{func}' cannot define non-symbol at position {index}. Got {got}, Expected Symbol.")]
    NotSymbol {
        func: String,
        index: usize,
        got: &'static str,
    },
    #[error("Function '{func}' passed too many arguments for symbols. Got {symbols}, Expected {values}.")]
    SymbolCount {
        func: String,
        symbols: usize,
        values: usize,
    },
    #[error("Function format invalid. Symbol '&' not followed by single symbol.")]
    VariadicFormat,
    #[error("Unbound Symbol '{0}'")]
    UnboundSymbol(String),
    #[error("Division By Zero!")]
    DivisionByZero,
    #[error("Integer overflow in '{0}'")]
    Overflow(String),
    #[error("First element is not a function. Got {0}, Expected Procedure.")]
    NotAFunction(&'static str),
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("{0}")]
    User(String),
    #[error("{0}")]
    Syntax(String),
    #[error("Could not load Library {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("Evaluation depth limit exceeded (max: {0})")]
    DepthExceeded(usize),
}

/// Host-level errors: failures of the surrounding tooling rather than of
/// evaluation itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line editor failure: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

pub mod builtinops;
pub mod datum;
pub mod environment;
pub mod evaluator;
pub mod reader;
pub mod repl;
pub mod syntax;

pub use datum::Datum;
pub use environment::{EnvRef, Environment};
pub use evaluator::{Config, Interpreter};
