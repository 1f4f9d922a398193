//! Built-in procedure registry.
//!
//! Every primitive is registered once in [`BUILTIN_OPS`] under its surface
//! name, together with its accepted [`Arity`]. The root environment is
//! populated from this table, and a builtin value carries a reference to its
//! table entry so that the printer can show `<builtin-name>` without searching.
//!
//! ```text
//! (+ 1 2 3)              ; arithmetic folds left: 6
//! (head {1 2 3})         ; {1}
//! (== {1 2} {1 2})       ; structural equality: 1
//! (if (> x 0) {x} {0})   ; branches are quoted and evaluated on demand
//! (def {x y} 1 2)        ; global definitions
//! (\ {a b} {+ a b})      ; lambda capturing the current scope
//! ```
//!
//! ## Argument checking
//!
//! Arguments arrive already evaluated and owned by the callee. Shape checks are
//! uniform: a count mismatch reports the procedure name with actual and
//! expected counts, a type mismatch reports the argument index with actual and
//! expected type names, and an empty list where one is not allowed reports the
//! index. Failures come back as `Error` values; nothing unwinds.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature of [`BuiltinFn`]
//! 2. **Add an entry to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering the happy path and each rejected shape

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::EvalError;
use crate::datum::{Closure, Datum, NumberType, Procedure};
use crate::environment::EnvRef;
use crate::evaluator::Interpreter;

/// Accepted argument counts of a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive range
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }

    /// Check `count` against this arity, naming `func` in the error
    pub fn validate(&self, func: &str, count: usize) -> Result<(), EvalError> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(EvalError::Arity {
                func: func.to_owned(),
                got: count,
                expected: *self,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number"),
        }
    }
}

/// Everything a primitive may touch besides its arguments
pub struct CallSite<'a> {
    pub interp: &'a Interpreter,
    /// The environment the call was evaluated in
    pub env: &'a EnvRef,
    /// Registered name the builtin was invoked under
    pub name: &'static str,
}

/// Canonical builtin signature.
///
/// Builtins receive ownership of their evaluated arguments and either return a
/// fresh value or a failure that the registry turns into an `Error` value.
pub type BuiltinFn = fn(&CallSite<'_>, Vec<Datum>) -> Result<Datum, EvalError>;

/// Definition of a built-in procedure
pub struct BuiltinOp {
    pub name: &'static str,
    pub func: BuiltinFn,
    pub arity: Arity,
    /// One-line description for the REPL help
    pub summary: &'static str,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names are unique within the registry
        self.name == other.name
    }
}

impl BuiltinOp {
    /// Validate the argument count, run the primitive and fold any failure
    /// into an `Error` value.
    pub fn invoke(&'static self, interp: &Interpreter, env: &EnvRef, args: Vec<Datum>) -> Datum {
        let site = CallSite {
            interp,
            env,
            name: self.name,
        };
        self.arity
            .validate(self.name, args.len())
            .and_then(|()| (self.func)(&site, args))
            .unwrap_or_else(Datum::from)
    }

    /// This entry as a procedure value
    pub fn procedure(&'static self) -> Datum {
        Datum::Procedure(Procedure::Builtin(self))
    }
}

//
// Argument shape checks
//

impl CallSite<'_> {
    /// Destructure an argument vector whose length the registry already checked
    fn take<const N: usize>(&self, args: Vec<Datum>) -> Result<[Datum; N], EvalError> {
        args.try_into().map_err(|args: Vec<Datum>| EvalError::Arity {
            func: self.name.to_owned(),
            got: args.len(),
            expected: Arity::Exact(N),
        })
    }

    /// Error for a variadic builtin that received nothing at all
    fn no_arguments(&self) -> EvalError {
        EvalError::Arity {
            func: self.name.to_owned(),
            got: 0,
            expected: Arity::AtLeast(1),
        }
    }

    fn type_error(&self, index: usize, got: &Datum, expected: &'static str) -> EvalError {
        EvalError::Type {
            func: self.name.to_owned(),
            index,
            got: got.type_name(),
            expected,
        }
    }

    fn quoted(&self, index: usize, arg: Datum) -> Result<Vec<Datum>, EvalError> {
        match arg {
            Datum::Quoted(items) => Ok(items),
            other => Err(self.type_error(index, &other, "QuotedForm")),
        }
    }

    fn non_empty(&self, index: usize, arg: Datum) -> Result<Vec<Datum>, EvalError> {
        let items = self.quoted(index, arg)?;
        if items.is_empty() {
            return Err(EvalError::EmptyCollection {
                func: self.name.to_owned(),
                index,
            });
        }
        Ok(items)
    }

    fn number(&self, index: usize, arg: &Datum) -> Result<NumberType, EvalError> {
        match arg {
            Datum::Number(n) => Ok(*n),
            other => Err(self.type_error(index, other, "Number")),
        }
    }

    fn numbers(&self, args: &[Datum]) -> Result<Vec<NumberType>, EvalError> {
        args.iter()
            .enumerate()
            .map(|(index, arg)| self.number(index, arg))
            .collect()
    }

    fn string(&self, index: usize, arg: Datum) -> Result<String, EvalError> {
        match arg {
            Datum::String(s) => Ok(s),
            other => Err(self.type_error(index, &other, "String")),
        }
    }

    /// Names of a quoted formals list; every element must be a symbol
    fn formals(&self, index: usize, arg: Datum) -> Result<Vec<String>, EvalError> {
        self.quoted(index, arg)?
            .into_iter()
            .enumerate()
            .map(|(i, formal)| match formal {
                Datum::Symbol(name) => Ok(name),
                other => Err(self.type_error(i, &other, "Symbol")),
            })
            .collect()
    }

    fn overflow(&self) -> EvalError {
        EvalError::Overflow(self.name.to_owned())
    }
}

//
// List operations
//

fn builtin_list(_site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    Ok(Datum::Quoted(args))
}

fn builtin_head(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [list] = site.take(args)?;
    let mut items = site.non_empty(0, list)?;
    items.truncate(1);
    Ok(Datum::Quoted(items))
}

fn builtin_tail(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [list] = site.take(args)?;
    let mut items = site.non_empty(0, list)?;
    items.remove(0);
    Ok(Datum::Quoted(items))
}

fn builtin_init(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [list] = site.take(args)?;
    let mut items = site.non_empty(0, list)?;
    items.pop();
    Ok(Datum::Quoted(items))
}

fn builtin_eval(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [list] = site.take(args)?;
    let items = site.quoted(0, list)?;
    Ok(site.interp.eval(site.env, Datum::Active(items)))
}

fn builtin_join(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    // Check every argument before consuming any
    if let Some((index, bad)) = args
        .iter()
        .enumerate()
        .find(|(_, arg)| !matches!(arg, Datum::Quoted(_)))
    {
        return Err(site.type_error(index, bad, "QuotedForm"));
    }

    let joined = args
        .into_iter()
        .flat_map(|arg| match arg {
            Datum::Quoted(items) => items,
            _ => Vec::new(),
        })
        .fold(Datum::Quoted(Vec::new()), Datum::append);
    Ok(joined)
}

fn builtin_cons(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [first, list] = site.take(args)?;
    let items = site.quoted(1, list)?;
    Ok(Datum::Quoted(items).prepend(first))
}

fn builtin_len(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [list] = site.take(args)?;
    let items = site.quoted(0, list)?;
    let len = NumberType::try_from(items.len()).map_err(|_| site.overflow())?;
    Ok(Datum::Number(len))
}

//
// Arithmetic
//

macro_rules! arithmetic_op {
    ($name:ident, $checked:ident) => {
        fn $name(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
            let numbers = site.numbers(&args)?;
            let (first, rest) = numbers
                .split_first()
                .ok_or_else(|| site.no_arguments())?;

            let mut result = *first;
            for n in rest {
                result = result.$checked(*n).ok_or_else(|| site.overflow())?;
            }
            Ok(Datum::Number(result))
        }
    };
}

arithmetic_op!(builtin_add, checked_add);
arithmetic_op!(builtin_mul, checked_mul);

fn builtin_sub(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let numbers = site.numbers(&args)?;
    match numbers.as_slice() {
        [] => Err(site.no_arguments()),
        // Unary minus negates
        [only] => only
            .checked_neg()
            .map(Datum::Number)
            .ok_or_else(|| site.overflow()),
        [first, rest @ ..] => {
            let mut result = *first;
            for n in rest {
                result = result.checked_sub(*n).ok_or_else(|| site.overflow())?;
            }
            Ok(Datum::Number(result))
        }
    }
}

fn builtin_div(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let numbers = site.numbers(&args)?;
    let Some((first, rest)) = numbers.split_first() else {
        return Err(site.no_arguments());
    };

    let mut result = *first;
    for n in rest {
        if *n == 0 {
            return Err(EvalError::DivisionByZero);
        }
        result = result.checked_div(*n).ok_or_else(|| site.overflow())?;
    }
    Ok(Datum::Number(result))
}

//
// Comparison and logic
//

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
            let [a, b] = site.take(args)?;
            let a = site.number(0, &a)?;
            let b = site.number(1, &b)?;
            Ok(Datum::boolean(a $op b))
        }
    };
}

numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_ge, >=);
numeric_comparison!(builtin_le, <=);

fn builtin_eq(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [a, b] = site.take(args)?;
    Ok(Datum::boolean(a == b))
}

fn builtin_ne(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [a, b] = site.take(args)?;
    Ok(Datum::boolean(a != b))
}

macro_rules! logical_op {
    ($name:ident, $op:tt) => {
        fn $name(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
            let [a, b] = site.take(args)?;
            let a = site.number(0, &a)? != 0;
            let b = site.number(1, &b)? != 0;
            Ok(Datum::boolean(a $op b))
        }
    };
}

logical_op!(builtin_and, &&);
logical_op!(builtin_or, ||);

fn builtin_not(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [a] = site.take(args)?;
    Ok(Datum::boolean(site.number(0, &a)? == 0))
}

fn builtin_if(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [condition, then_branch, else_branch] = site.take(args)?;
    let condition = site.number(0, &condition)?;
    let then_branch = site.quoted(1, then_branch)?;
    let else_branch = site.quoted(2, else_branch)?;

    let chosen = if condition != 0 {
        then_branch
    } else {
        else_branch
    };
    Ok(site.interp.eval(site.env, Datum::Active(chosen)))
}

//
// Definitions and closures
//

#[derive(Clone, Copy)]
enum Scope {
    Global,
    Local,
}

/// Shared body of `def` and `=`: `(def {a b} 1 2)`
fn define_symbols(site: &CallSite<'_>, args: Vec<Datum>, scope: Scope) -> Result<Datum, EvalError> {
    let mut args = args.into_iter();
    let Some(names) = args.next() else {
        return Err(site.no_arguments());
    };
    let names = site.quoted(0, names)?;

    let mut symbols = Vec::with_capacity(names.len());
    for (index, name) in names.into_iter().enumerate() {
        match name {
            Datum::Symbol(s) => symbols.push(s),
            other => {
                return Err(EvalError::NotSymbol {
                    func: site.name.to_owned(),
                    index,
                    got: other.type_name(),
                });
            }
        }
    }

    let values: Vec<Datum> = args.collect();
    if symbols.len() != values.len() {
        return Err(EvalError::SymbolCount {
            func: site.name.to_owned(),
            symbols: symbols.len(),
            values: values.len(),
        });
    }

    for (name, value) in symbols.iter().zip(values) {
        match scope {
            Scope::Global => site.env.define_global(name, value),
            Scope::Local => site.env.define_local(name, value),
        }
    }
    Ok(Datum::unit())
}

fn builtin_def(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    define_symbols(site, args, Scope::Global)
}

fn builtin_put(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    define_symbols(site, args, Scope::Local)
}

fn builtin_lambda(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [formals, body] = site.take(args)?;
    let formals = site.formals(0, formals)?;
    let body = site.quoted(1, body)?;
    Ok(Datum::Procedure(Procedure::Closure(Closure::new(
        formals,
        body,
        site.env.clone(),
    ))))
}

fn builtin_fun(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [formals, body] = site.take(args)?;
    if matches!(&formals, Datum::Quoted(items) if items.is_empty()) {
        return Err(EvalError::EmptyCollection {
            func: site.name.to_owned(),
            index: 0,
        });
    }
    let mut formals = site.formals(0, formals)?;
    let body = site.quoted(1, body)?;

    let name = formals.remove(0);
    let closure = Closure::new(formals, body, site.env.clone());
    site.env
        .define_global(&name, Datum::Procedure(Procedure::Closure(closure)));
    Ok(Datum::unit())
}

//
// Effects
//

fn builtin_exit(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let code = match args.first() {
        Some(arg) => site.number(0, arg)?,
        None => 0,
    };
    let code = i32::try_from(code).map_err(|_| site.overflow())?;
    site.interp.flush();
    std::process::exit(code)
}

fn builtin_print(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    site.interp.write_line(&line);
    Ok(Datum::unit())
}

fn builtin_error(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [message] = site.take(args)?;
    let message = site.string(0, message)?;
    Ok(Datum::Error(EvalError::User(message)))
}

fn builtin_load(site: &CallSite<'_>, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let [path] = site.take(args)?;
    let path = site.string(0, path)?;
    Ok(site.interp.load_file_in(site.env, path))
}

/// Global registry of all built-in procedures.
///
/// Aliases (`and`/`&&`, `or`/`||`, `not`/`!`) are separate entries sharing an
/// implementation, so each prints and reports errors under the name it was
/// called by.
pub static BUILTIN_OPS: &[BuiltinOp] = &[
    // List operations
    BuiltinOp {
        name: "list",
        func: builtin_list,
        arity: Arity::Any,
        summary: "wrap the arguments in a quoted form",
    },
    BuiltinOp {
        name: "head",
        func: builtin_head,
        arity: Arity::Exact(1),
        summary: "first element of a quoted form, as a quoted form",
    },
    BuiltinOp {
        name: "tail",
        func: builtin_tail,
        arity: Arity::Exact(1),
        summary: "all but the first element",
    },
    BuiltinOp {
        name: "init",
        func: builtin_init,
        arity: Arity::Exact(1),
        summary: "all but the last element",
    },
    BuiltinOp {
        name: "eval",
        func: builtin_eval,
        arity: Arity::Exact(1),
        summary: "evaluate a quoted form as an active form",
    },
    BuiltinOp {
        name: "join",
        func: builtin_join,
        arity: Arity::AtLeast(1),
        summary: "concatenate quoted forms",
    },
    BuiltinOp {
        name: "cons",
        func: builtin_cons,
        arity: Arity::Exact(2),
        summary: "prepend a value to a quoted form",
    },
    BuiltinOp {
        name: "len",
        func: builtin_len,
        arity: Arity::Exact(1),
        summary: "number of elements in a quoted form",
    },
    // Arithmetic
    BuiltinOp {
        name: "+",
        func: builtin_add,
        arity: Arity::AtLeast(1),
        summary: "sum",
    },
    BuiltinOp {
        name: "-",
        func: builtin_sub,
        arity: Arity::AtLeast(1),
        summary: "difference, or negation with one argument",
    },
    BuiltinOp {
        name: "*",
        func: builtin_mul,
        arity: Arity::AtLeast(1),
        summary: "product",
    },
    BuiltinOp {
        name: "/",
        func: builtin_div,
        arity: Arity::AtLeast(1),
        summary: "integer quotient",
    },
    // Comparison
    BuiltinOp {
        name: ">",
        func: builtin_gt,
        arity: Arity::Exact(2),
        summary: "greater than",
    },
    BuiltinOp {
        name: "<",
        func: builtin_lt,
        arity: Arity::Exact(2),
        summary: "less than",
    },
    BuiltinOp {
        name: ">=",
        func: builtin_ge,
        arity: Arity::Exact(2),
        summary: "greater than or equal",
    },
    BuiltinOp {
        name: "<=",
        func: builtin_le,
        arity: Arity::Exact(2),
        summary: "less than or equal",
    },
    BuiltinOp {
        name: "==",
        func: builtin_eq,
        arity: Arity::Exact(2),
        summary: "structural equality",
    },
    BuiltinOp {
        name: "!=",
        func: builtin_ne,
        arity: Arity::Exact(2),
        summary: "structural inequality",
    },
    // Logic
    BuiltinOp {
        name: "&&",
        func: builtin_and,
        arity: Arity::Exact(2),
        summary: "logical and",
    },
    BuiltinOp {
        name: "and",
        func: builtin_and,
        arity: Arity::Exact(2),
        summary: "logical and",
    },
    BuiltinOp {
        name: "||",
        func: builtin_or,
        arity: Arity::Exact(2),
        summary: "logical or",
    },
    BuiltinOp {
        name: "or",
        func: builtin_or,
        arity: Arity::Exact(2),
        summary: "logical or",
    },
    BuiltinOp {
        name: "!",
        func: builtin_not,
        arity: Arity::Exact(1),
        summary: "logical not",
    },
    BuiltinOp {
        name: "not",
        func: builtin_not,
        arity: Arity::Exact(1),
        summary: "logical not",
    },
    // Control flow
    BuiltinOp {
        name: "if",
        func: builtin_if,
        arity: Arity::Exact(3),
        summary: "evaluate one of two quoted branches",
    },
    // Definitions
    BuiltinOp {
        name: "def",
        func: builtin_def,
        arity: Arity::AtLeast(1),
        summary: "bind names in the global scope",
    },
    BuiltinOp {
        name: "=",
        func: builtin_put,
        arity: Arity::AtLeast(1),
        summary: "bind names in the current scope",
    },
    BuiltinOp {
        name: "\\",
        func: builtin_lambda,
        arity: Arity::Exact(2),
        summary: "create a closure over the current scope",
    },
    BuiltinOp {
        name: "fun",
        func: builtin_fun,
        arity: Arity::Exact(2),
        summary: "define a named closure globally",
    },
    // Effects
    BuiltinOp {
        name: "exit",
        func: builtin_exit,
        arity: Arity::Range(0, 1),
        summary: "terminate the process",
    },
    BuiltinOp {
        name: "print",
        func: builtin_print,
        arity: Arity::Any,
        summary: "print the arguments separated by spaces",
    },
    BuiltinOp {
        name: "error",
        func: builtin_error,
        arity: Arity::Exact(1),
        summary: "construct an error value from a string",
    },
    BuiltinOp {
        name: "load",
        func: builtin_load,
        arity: Arity::Exact(1),
        summary: "evaluate every expression of a source file",
    },
];

/// Lazy map from name to BuiltinOp (private - use find_builtin)
static BUILTINS_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

/// All builtin procedures in registration order
pub fn builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin procedure by name
pub fn find_builtin(name: &str) -> Option<&'static BuiltinOp> {
    BUILTINS_BY_NAME.get(name).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::datum::{active, sym, val};

    /// Invoke a builtin through the registry in a fresh session
    fn call_builtin(name: &str, args: Vec<Datum>) -> Datum {
        let interp = Interpreter::new();
        let op = find_builtin(name).unwrap();
        op.invoke(&interp, interp.globals(), args)
    }

    fn error_text(result: &Datum) -> String {
        match result {
            Datum::Error(e) => e.to_string(),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn test_builtin_registry() {
        for op in builtin_ops() {
            let found = find_builtin(op.name).unwrap();
            assert!(std::ptr::eq(found, op), "duplicate registration for {}", op.name);
        }

        assert_eq!(find_builtin("head").unwrap().arity, Arity::Exact(1));
        assert_eq!(find_builtin("exit").unwrap().arity, Arity::Range(0, 1));
        assert!(find_builtin("unknown").is_none());

        // Aliases share an implementation but keep their own names
        let and = find_builtin("and").unwrap();
        let amp = find_builtin("&&").unwrap();
        assert!(std::ptr::fn_addr_eq(and.func, amp.func));
        assert_eq!(and.procedure().to_string(), "<builtin-and>");
        assert_eq!(amp.procedure().to_string(), "<builtin-&&>");
    }

    #[test]
    fn test_builtin_function_implementations() {
        let test_cases: Vec<(&str, Vec<Datum>, Datum)> = vec![
            // List operations
            ("list", vec![val(1), val(2)], val([1, 2])),
            ("list", vec![], val(Vec::<Datum>::new())),
            ("head", vec![val([1, 2, 3])], val([1])),
            ("tail", vec![val([1, 2, 3])], val([2, 3])),
            ("tail", vec![val([1])], val(Vec::<Datum>::new())),
            ("init", vec![val([1, 2, 3])], val([1, 2])),
            ("join", vec![val([1]), val([2, 3])], val([1, 2, 3])),
            ("join", vec![val([1])], val([1])),
            (
                "join",
                vec![val([1]), val(Vec::<Datum>::new()), val([val([2])])],
                val([val(1), val([2])]),
            ),
            ("cons", vec![val(0), val([1, 2])], val([0, 1, 2])),
            ("cons", vec![val([0]), val([1])], val([val([0]), val(1)])),
            ("len", vec![val([1, 2, 3])], val(3)),
            ("len", vec![val(Vec::<Datum>::new())], val(0)),
            // Arithmetic
            ("+", vec![val(1), val(2), val(3)], val(6)),
            ("+", vec![val(7)], val(7)),
            ("-", vec![val(5)], val(-5)),
            ("-", vec![val(10), val(3), val(2)], val(5)),
            ("*", vec![val(2), val(3), val(4)], val(24)),
            ("/", vec![val(20), val(2), val(5)], val(2)),
            ("/", vec![val(7), val(2)], val(3)),
            ("/", vec![val(-7), val(2)], val(-3)),
            // Comparison
            (">", vec![val(2), val(1)], val(1)),
            (">", vec![val(1), val(1)], val(0)),
            ("<", vec![val(1), val(2)], val(1)),
            (">=", vec![val(1), val(1)], val(1)),
            ("<=", vec![val(2), val(1)], val(0)),
            ("==", vec![val([1, 2]), val([1, 2])], val(1)),
            ("==", vec![val([1, 2]), val([2, 1])], val(0)),
            ("==", vec![val("a"), val("a")], val(1)),
            ("==", vec![val("a"), sym("a")], val(0)),
            ("!=", vec![val(1), val(2)], val(1)),
            ("!=", vec![sym("x"), sym("x")], val(0)),
            // Logic
            ("&&", vec![val(1), val(5)], val(1)),
            ("and", vec![val(1), val(0)], val(0)),
            ("||", vec![val(0), val(-3)], val(1)),
            ("or", vec![val(0), val(0)], val(0)),
            ("!", vec![val(0)], val(1)),
            ("not", vec![val(7)], val(0)),
        ];

        for (i, (name, args, expected)) in test_cases.into_iter().enumerate() {
            let actual = call_builtin(name, args);
            assert_eq!(
                actual,
                expected,
                "Test case #{} ({name}) failed: got {actual}",
                i + 1
            );
        }
    }

    #[test]
    fn test_argument_shape_errors() {
        let test_cases: Vec<(&str, Vec<Datum>, &str)> = vec![
            (
                "head",
                vec![val(1)],
                "Function 'head' passed incorrect type for argument 0. Got Number, Expected QuotedForm.",
            ),
            (
                "head",
                vec![val(Vec::<Datum>::new())],
                "Function 'head' passed {} for argument 0.",
            ),
            (
                "tail",
                vec![val([1]), val([2])],
                "Function 'tail' passed incorrect number of arguments. Got 2, Expected 1.",
            ),
            (
                "init",
                vec![val(Vec::<Datum>::new())],
                "Function 'init' passed {} for argument 0.",
            ),
            (
                "join",
                vec![val([1]), val(2)],
                "Function 'join' passed incorrect type for argument 1. Got Number, Expected QuotedForm.",
            ),
            (
                "join",
                vec![],
                "Function 'join' passed incorrect number of arguments. Got 0, Expected at least 1.",
            ),
            (
                "cons",
                vec![val(1), val(2)],
                "Function 'cons' passed incorrect type for argument 1. Got Number, Expected QuotedForm.",
            ),
            (
                "+",
                vec![val(1), val("two")],
                "Function '+' passed incorrect type for argument 1. Got String, Expected Number.",
            ),
            ("/", vec![val(1), val(0)], "Division By Zero!"),
            ("+", vec![val(i64::MAX), val(1)], "Integer overflow in '+'"),
            ("-", vec![val(i64::MIN)], "Integer overflow in '-'"),
            ("/", vec![val(i64::MIN), val(-1)], "Integer overflow in '/'"),
            (
                ">",
                vec![val(1)],
                "Function '>' passed incorrect number of arguments. Got 1, Expected 2.",
            ),
            (
                "<",
                vec![val(1), val([2])],
                "Function '<' passed incorrect type for argument 1. Got QuotedForm, Expected Number.",
            ),
            (
                "and",
                vec![val("yes"), val(1)],
                "Function 'and' passed incorrect type for argument 0. Got String, Expected Number.",
            ),
            (
                "if",
                vec![val([1]), val([1]), val([2])],
                "Function 'if' passed incorrect type for argument 0. Got QuotedForm, Expected Number.",
            ),
            (
                "if",
                vec![val(1), val([1]), val(2)],
                "Function 'if' passed incorrect type for argument 2. Got Number, Expected QuotedForm.",
            ),
            (
                "def",
                vec![val([sym("a"), val(1)]), val(1), val(2)],
                "Function 'def' cannot define non-symbol at position 1. Got Number, Expected Symbol.",
            ),
            (
                "def",
                vec![val([sym("a"), sym("b")]), val(1)],
                "Function 'def' passed too many arguments for symbols. Got 2, Expected 1.",
            ),
            (
                "=",
                vec![val(1)],
                "Function '=' passed incorrect type for argument 0. Got Number, Expected QuotedForm.",
            ),
            (
                "\\",
                vec![val([val(1)]), val([1])],
                "Function '\\' passed incorrect type for argument 0. Got Number, Expected Symbol.",
            ),
            (
                "fun",
                vec![val(Vec::<Datum>::new()), val([1])],
                "Function 'fun' passed {} for argument 0.",
            ),
            (
                "exit",
                vec![val("now")],
                "Function 'exit' passed incorrect type for argument 0. Got String, Expected Number.",
            ),
            (
                "exit",
                vec![Datum::Number(4_294_967_296)],
                "Integer overflow in 'exit'",
            ),
            (
                "exit",
                vec![val(1), val(2)],
                "Function 'exit' passed incorrect number of arguments. Got 2, Expected 0 to 1.",
            ),
            (
                "error",
                vec![val(1)],
                "Function 'error' passed incorrect type for argument 0. Got Number, Expected String.",
            ),
            (
                "load",
                vec![sym("file")],
                "Function 'load' passed incorrect type for argument 0. Got Symbol, Expected String.",
            ),
        ];

        for (i, (name, args, expected)) in test_cases.into_iter().enumerate() {
            let actual = call_builtin(name, args);
            assert_eq!(
                error_text(&actual),
                expected,
                "Test case #{} ({name}) failed",
                i + 1
            );
        }
    }

    #[test]
    fn test_error_builtin_constructs_user_error() {
        let result = call_builtin("error", vec![val("custom failure")]);
        match result {
            Datum::Error(EvalError::User(msg)) => assert_eq!(msg, "custom failure"),
            other => panic!("expected user error, got {other:?}"),
        }
    }

    #[test]
    fn test_definitions_bind_in_expected_scope() {
        let interp = Interpreter::new();
        let local = crate::environment::Environment::child(interp.globals());

        let def = find_builtin("def").unwrap();
        let put = find_builtin("=").unwrap();

        let result = def.invoke(&interp, &local, vec![val([sym("g")]), val(1)]);
        assert_eq!(result, active(vec![]));
        assert!(interp.globals().contains_local("g"));
        assert!(!local.contains_local("g"));

        put.invoke(&interp, &local, vec![val([sym("l")]), val(2)]);
        assert!(local.contains_local("l"));
        assert!(!interp.globals().contains_local("l"));
    }

    #[test]
    fn test_lambda_captures_call_site_environment() {
        let interp = Interpreter::new();
        let local = crate::environment::Environment::child(interp.globals());
        let lambda = find_builtin("\\").unwrap();

        let result = lambda.invoke(&interp, &local, vec![val([sym("x")]), val([sym("x")])]);
        match result {
            Datum::Procedure(Procedure::Closure(closure)) => {
                assert!(std::rc::Rc::ptr_eq(closure.env(), &local));
                assert_eq!(closure.formals(), ["x".to_owned()]);
            }
            other => panic!("expected closure, got {other:?}"),
        }
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate("f", 2).unwrap();
        Exact(2).validate("f", 1).unwrap_err();
        Exact(2).validate("f", 3).unwrap_err();

        AtLeast(1).validate("f", 1).unwrap();
        AtLeast(1).validate("f", 9).unwrap();
        AtLeast(1).validate("f", 0).unwrap_err();

        Range(0, 1).validate("f", 0).unwrap();
        Range(0, 1).validate("f", 1).unwrap();
        Range(0, 1).validate("f", 2).unwrap_err();

        Any.validate("f", 0).unwrap();
        Any.validate("f", 100).unwrap();

        match Exact(2).validate("f", 1).unwrap_err() {
            EvalError::Arity { expected, got, .. } => {
                assert_eq!(expected, Exact(2));
                assert_eq!(got, 1);
            }
            other => panic!("Expected Arity error, got {other:?}"),
        }
    }
}
