//! Source text to a generic tagged syntax tree.
//!
//! The grammar has six kinds of expression:
//!
//! ```text
//! number  : /-?[0-9]+/ ;
//! symbol  : /[a-zA-Z0-9_+\-*\/\\=<>!&|]+/ ;
//! string  : /"(\\.|[^"])*"/ ;
//! comment : /;[^\r\n]*/ ;
//! sexpr   : '(' <expr>* ')' ;
//! qexpr   : '{' <expr>* '}' ;
//! expr    : <number> | <symbol> | <string> | <comment> | <sexpr> | <qexpr> ;
//! lispy   : /^/ <expr>* /$/ ;
//! ```
//!
//! Nodes carry the rule path as a `|`-separated tag (`expr|number|regex`,
//! `expr|sexpr|>`, ...). The root is tagged `>` and starts and ends with empty
//! `regex` anchor leaves; bracket characters appear as `char` leaves inside
//! their container. Leaves keep their raw text, so a string leaf still has its
//! quotes and escapes.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{cut, opt, recognize},
    error::ErrorKind,
    sequence::pair,
};

use crate::{MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters allowed in a symbol
const SYMBOL_SPECIAL_CHARS: &str = "_+-*/\\=<>!&|";

pub(crate) const TAG_ROOT: &str = ">";
pub(crate) const TAG_NUMBER: &str = "expr|number|regex";
pub(crate) const TAG_SYMBOL: &str = "expr|symbol|regex";
pub(crate) const TAG_STRING: &str = "expr|string|regex";
pub(crate) const TAG_COMMENT: &str = "comment|regex";
pub(crate) const TAG_SEXPR: &str = "expr|sexpr|>";
pub(crate) const TAG_QEXPR: &str = "expr|qexpr|>";
const TAG_CHAR: &str = "char";
const TAG_ANCHOR: &str = "regex";

/// A node of the generic syntax tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    /// Grammar rule path, e.g. `expr|number|regex`
    pub tag: String,
    /// Raw source text of a leaf; empty for containers
    pub contents: String,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    fn leaf(tag: &str, contents: impl Into<String>) -> Self {
        SyntaxNode {
            tag: tag.to_owned(),
            contents: contents.into(),
            children: Vec::new(),
        }
    }

    fn branch(tag: &str, children: Vec<SyntaxNode>) -> Self {
        SyntaxNode {
            tag: tag.to_owned(),
            contents: String::new(),
            children,
        }
    }

    /// Whether the tag names grammar rule `rule`
    pub fn is(&self, rule: &str) -> bool {
        self.tag.contains(rule)
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        let indent = level * 2;
        if self.children.is_empty() {
            writeln!(f, "{:indent$}{} '{}'", "", self.tag, self.contents)
        } else {
            writeln!(f, "{:indent$}{}", "", self.tag)?;
            for child in &self.children {
                child.write_tree(f, level + 1)?;
            }
            Ok(())
        }
    }
}

/// Indented dump of the tree, one node per line
impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Parse a number; a digit run that continues into symbol characters is a symbol
fn parse_number(input: &str) -> IResult<&str, SyntaxNode> {
    let (rest, text) = recognize(pair(opt(char('-')), digit1)).parse(input)?;
    if rest.starts_with(is_symbol_char) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        )));
    }
    Ok((rest, SyntaxNode::leaf(TAG_NUMBER, text)))
}

fn parse_symbol(input: &str) -> IResult<&str, SyntaxNode> {
    let (rest, text) = take_while1(is_symbol_char).parse(input)?;
    Ok((rest, SyntaxNode::leaf(TAG_SYMBOL, text)))
}

/// Parse a string literal, keeping its quotes and escapes verbatim
fn parse_string(input: &str) -> IResult<&str, SyntaxNode> {
    let (body, _) = char('"').parse(input)?;
    let mut chars = body.char_indices();

    loop {
        match chars.next() {
            Some((end, '"')) => {
                // Quote plus body plus closing quote
                let len = 1 + end + 1;
                return Ok((&input[len..], SyntaxNode::leaf(TAG_STRING, &input[..len])));
            }
            Some((_, '\\')) => {
                // Any character may follow a backslash
                if chars.next().is_none() {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        "",
                        ErrorKind::Eof,
                    )));
                }
            }
            Some(_) => {}
            None => {
                // Reached end of input without finding closing quote
                return Err(nom::Err::Failure(nom::error::Error::new(
                    "",
                    ErrorKind::Eof,
                )));
            }
        }
    }
}

fn parse_comment(input: &str) -> IResult<&str, SyntaxNode> {
    let (rest, text) = recognize(pair(char(';'), take_till(|c| c == '\r' || c == '\n')))
        .parse(input)?;
    Ok((rest, SyntaxNode::leaf(TAG_COMMENT, text)))
}

/// Parse a bracketed container. Past the opening bracket every failure is final.
fn parse_container<'a>(
    input: &'a str,
    open: char,
    close: char,
    tag: &str,
    depth: usize,
) -> IResult<&'a str, SyntaxNode> {
    let (mut input, _) = char(open).parse(input)?;
    let mut children = vec![SyntaxNode::leaf(TAG_CHAR, open)];

    loop {
        let (rest, _) = multispace0.parse(input)?;
        if let Some(after) = rest.strip_prefix(close) {
            children.push(SyntaxNode::leaf(TAG_CHAR, close));
            return Ok((after, SyntaxNode::branch(tag, children)));
        }
        if rest.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                ErrorKind::Eof,
            )));
        }

        let (rest, child) = cut(|input| parse_expr(input, depth + 1)).parse(rest)?;
        children.push(child);
        input = rest;
    }
}

/// Parse one expression with depth tracking
fn parse_expr(input: &str, depth: usize) -> IResult<&str, SyntaxNode> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    alt((
        parse_number,
        parse_symbol,
        parse_string,
        parse_comment,
        |input| parse_container(input, '(', ')', TAG_SEXPR, depth),
        |input| parse_container(input, '{', '}', TAG_QEXPR, depth),
    ))
    .parse(input)
}

/// Convert nom parsing errors to structured parse errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                    input,
                    position,
                ),
                ErrorKind::Eof => ParseError::with_context(
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input",
                    input,
                    position,
                ),
                _ => {
                    let found: String = e.input.chars().take(10).collect();
                    ParseError::with_context(
                        ParseErrorKind::InvalidSyntax,
                        format!("Unexpected '{found}' at position {position}"),
                        input,
                        position,
                    )
                }
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::new(ParseErrorKind::Incomplete, "Incomplete input", None)
        }
    }
}

/// Parse a whole program: any number of expressions separated by whitespace.
pub fn parse_program(input: &str) -> Result<SyntaxNode, ParseError> {
    let mut children = vec![SyntaxNode::leaf(TAG_ANCHOR, "")];
    let mut rest = input.trim_start_matches(is_space);

    while !rest.is_empty() {
        let (after, node) = parse_expr(rest, 0).map_err(|e| to_parse_error(input, e))?;
        children.push(node);
        rest = after.trim_start_matches(is_space);
    }

    children.push(SyntaxNode::leaf(TAG_ANCHOR, ""));
    Ok(SyntaxNode::branch(TAG_ROOT, children))
}
