//! Syntax tree to runtime values.
//!
//! The root node and `sexpr` nodes become active forms, `qexpr` nodes become
//! quoted forms. Bracket leaves, anchors and comments carry no value and are
//! skipped.

use crate::EvalError;
use crate::datum::{Datum, NumberType};
use crate::syntax::{SyntaxNode, TAG_ROOT};

/// Convert one syntax node into a value
pub fn read(node: &SyntaxNode) -> Datum {
    if node.is("number") {
        return read_number(&node.contents);
    }
    if node.is("string") {
        return Datum::String(read_string(&node.contents));
    }
    if node.is("symbol") {
        return Datum::Symbol(node.contents.clone());
    }

    let children = read_children(node);
    if node.is("qexpr") {
        Datum::Quoted(children)
    } else {
        // The root and sexpr nodes
        Datum::Active(children)
    }
}

/// The top-level expressions of a program, each as its own value
pub fn read_program(root: &SyntaxNode) -> Vec<Datum> {
    if root.tag == TAG_ROOT {
        read_children(root)
    } else {
        vec![read(root)]
    }
}

fn read_children(node: &SyntaxNode) -> Vec<Datum> {
    node.children
        .iter()
        .filter(|child| is_value(child))
        .map(read)
        .collect()
}

fn is_value(node: &SyntaxNode) -> bool {
    if node.is("comment") {
        return false;
    }
    // Punctuation and anchors are the untyped leaves
    ["number", "string", "symbol", "sexpr", "qexpr"]
        .iter()
        .any(|rule| node.is(rule))
}

fn read_number(text: &str) -> Datum {
    match text.parse::<NumberType>() {
        Ok(n) => Datum::Number(n),
        Err(_) => EvalError::InvalidNumber(text.to_owned()).into(),
    }
}

/// Strip the surrounding quotes of a string leaf and resolve its escapes.
///
/// Unknown escapes are kept as written.
pub fn read_string(raw: &str) -> String {
    let body = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);

    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0c'),
            Some('v') => result.push('\x0b'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
