//! This module defines [`Datum`], the single runtime value type of the
//! interpreter, together with the procedure values it can carry. Containers
//! own their elements outright; the only shared state in a value tree is the
//! captured environment of a closure, which is reference counted so that
//! copying a closure copies the handle rather than the scope.
//!
//! The `Display` implementation is the printer: numbers in decimal, errors as
//! `Error: message`, symbols and strings verbatim, active forms in `( )`,
//! quoted forms in `{ }`, builtins as `<builtin-name>` and closures as
//! `(\ {formals} {body})`.

use std::fmt;

use crate::EvalError;
use crate::builtinops::BuiltinOp;
use crate::environment::EnvRef;

/// Type alias for number values in the interpreter
pub type NumberType = i64;

/// The formal that introduces a rest parameter: `{x & rest}`
pub const VARIADIC_MARKER: &str = "&";

/// Core value type.
///
/// Equality follows the language's `==`: numbers by value, symbols and
/// strings by text, containers element-wise. Procedures and errors never
/// compare equal, not even to themselves.
#[derive(Clone)]
pub enum Datum {
    /// Fixed-width integer
    Number(NumberType),
    /// First-class error value
    Error(EvalError),
    /// Identifier, resolved against the environment when evaluated
    Symbol(String),
    /// String literal (escapes already resolved)
    String(String),
    /// `( ... )`: evaluated as procedure application
    Active(Vec<Datum>),
    /// `{ ... }`: inert list data
    Quoted(Vec<Datum>),
    /// Builtin or user closure
    Procedure(Procedure),
}

/// A callable value.
#[derive(Clone)]
pub enum Procedure {
    /// Entry of the builtin registry; its name is stored alongside the function
    Builtin(&'static BuiltinOp),
    Closure(Closure),
}

/// A user-defined procedure: formals, a body and the scope it was created in.
#[derive(Clone)]
pub struct Closure {
    pub(crate) formals: Vec<String>,
    pub(crate) body: Vec<Datum>,
    pub(crate) env: EnvRef,
}

impl Closure {
    pub fn new(formals: Vec<String>, body: Vec<Datum>, env: EnvRef) -> Self {
        Closure { formals, body, env }
    }

    /// Remaining formal parameter names, possibly including `&`
    pub fn formals(&self) -> &[String] {
        &self.formals
    }

    /// The captured environment
    pub fn env(&self) -> &EnvRef {
        &self.env
    }
}

impl Procedure {
    /// Name used in diagnostics and tracing
    pub fn name(&self) -> &str {
        match self {
            Procedure::Builtin(op) => op.name,
            Procedure::Closure(_) => "\\",
        }
    }
}

impl Datum {
    /// The empty active form, returned by side-effecting builtins
    pub fn unit() -> Self {
        Datum::Active(Vec::new())
    }

    /// Boolean result encoded as `Number` 0/1
    pub fn boolean(b: bool) -> Self {
        Datum::Number(NumberType::from(b))
    }

    /// Variant name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Number(_) => "Number",
            Datum::Error(_) => "Error",
            Datum::Symbol(_) => "Symbol",
            Datum::String(_) => "String",
            Datum::Active(_) => "ActiveForm",
            Datum::Quoted(_) => "QuotedForm",
            Datum::Procedure(_) => "Procedure",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Datum::Error(_))
    }

    /// Move `item` to the end of a container. Non-containers are returned unchanged.
    pub fn append(mut self, item: Datum) -> Self {
        if let Datum::Active(items) | Datum::Quoted(items) = &mut self {
            items.push(item);
        }
        self
    }

    /// Move `item` to the front of a container. Non-containers are returned unchanged.
    pub fn prepend(mut self, item: Datum) -> Self {
        if let Datum::Active(items) | Datum::Quoted(items) = &mut self {
            items.insert(0, item);
        }
        self
    }
}

impl From<EvalError> for Datum {
    fn from(error: EvalError) -> Self {
        Datum::Error(error)
    }
}

impl From<NumberType> for Datum {
    fn from(n: NumberType) -> Self {
        Datum::Number(n)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(v: Vec<T>) -> Self {
        Datum::Quoted(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Datum>, const N: usize> From<[T; N]> for Datum {
    fn from(arr: [T; N]) -> Self {
        Datum::Quoted(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper for building symbols in code and tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Datum {
    Datum::Symbol(name.as_ref().to_owned())
}

/// Helper for building values; lists convert to quoted forms
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Datum>>(value: T) -> Datum {
    value.into()
}

/// Helper for building active forms
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn active(items: Vec<Datum>) -> Datum {
    Datum::Active(items)
}

fn write_sequence(f: &mut fmt::Formatter<'_>, items: &[Datum], open: char, close: char) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

fn write_formals(f: &mut fmt::Formatter<'_>, formals: &[String]) -> fmt::Result {
    write!(f, "{{{}}}", formals.join(" "))
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Number(n) => write!(f, "{n}"),
            Datum::Error(e) => write!(f, "Error: {e}"),
            Datum::Symbol(s) | Datum::String(s) => write!(f, "{s}"),
            Datum::Active(items) => write_sequence(f, items, '(', ')'),
            Datum::Quoted(items) => write_sequence(f, items, '{', '}'),
            Datum::Procedure(p) => write!(f, "{p}"),
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Builtin(op) => write!(f, "<builtin-{}>", op.name),
            Procedure::Closure(c) => {
                write!(f, "(\\ ")?;
                write_formals(f, &c.formals)?;
                write!(f, " ")?;
                write_sequence(f, &c.body, '{', '}')?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Number(n) => write!(f, "Number({n})"),
            Datum::Error(e) => write!(f, "Error({e:?})"),
            Datum::Symbol(s) => write!(f, "Symbol({s})"),
            Datum::String(s) => write!(f, "String({s:?})"),
            Datum::Active(items) => f.debug_tuple("Active").field(items).finish(),
            Datum::Quoted(items) => f.debug_tuple("Quoted").field(items).finish(),
            Datum::Procedure(p) => write!(f, "{p:?}"),
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Builtin(op) => write!(f, "Builtin({})", op.name),
            // The captured environment is left out: it may contain this closure.
            Procedure::Closure(c) => write!(f, "Closure(formals={:?}, body={:?})", c.formals, c.body),
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Number(a), Datum::Number(b)) => a == b,
            (Datum::Symbol(a), Datum::Symbol(b)) => a == b,
            (Datum::String(a), Datum::String(b)) => a == b,
            (Datum::Active(a), Datum::Active(b)) => a == b,
            (Datum::Quoted(a), Datum::Quoted(b)) => a == b,
            _ => false,
        }
    }
}
