//! Template source parser.
//!
//! Turns template text into the immutable node tree executed by the
//! renderer. The grammar is the conventional double-curly one:
//!
//! - `{{path.to.value}}` — interpolation, with `../` steps into the parent
//!   scope of a block
//! - `{{helper arg1 'literal' key=value}}` — helper invocation; positional
//!   arguments are paths, quoted strings, numbers or booleans, hash
//!   arguments are `key=value` pairs
//! - `{{#helper args}}...{{else}}...{{/helper}}` — block form with an
//!   optional inverse section
//! - `{{! comment }}` / `{{!-- comment with }} inside --}}` — dropped
//!
//! Triple-stash tags (`{{{...}}}`) parse like their two-brace form; the
//! renderer never HTML-escapes, so the distinction carries no meaning here.
//! The parser allocates nothing shared and the resulting tree is never
//! mutated, which is what lets compiled templates execute concurrently
//! without any lock.

use std::fmt;

/// A parsed template node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    /// Literal text between tags.
    Text(String),
    /// `{{...}}` interpolation or helper call.
    Expression(Invocation),
    /// `{{#name ...}}body{{else}}inverse{{/name}}`.
    Block { invocation: Invocation, body: Vec<Node>, inverse: Vec<Node> },
}

/// The inside of a tag: a leading name-or-path plus arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Invocation {
    /// Raw first token, used for helper lookup and diagnostics.
    pub name: String,
    /// The first token parsed as a path (used when it is not a helper).
    pub path: PathExpr,
    /// Positional arguments in order.
    pub args: Vec<Argument>,
    /// `key=value` arguments in source order.
    pub hash: Vec<(String, Argument)>,
}

/// A positional or hash argument.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Argument {
    Path(PathExpr),
    String(String),
    Number(f64),
    Bool(bool),
}

/// A dotted data path, optionally stepping into parent scopes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathExpr {
    /// Number of leading `../` steps.
    pub parents: usize,
    /// Path segments; empty means the current context (`this` / `.`).
    pub segments: Vec<String>,
}

/// Parse failure with a source offset.
#[derive(Debug, Clone)]
pub(crate) struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)
    }
}

impl std::error::Error for ParseError {}

fn error(message: impl Into<String>, offset: usize) -> ParseError {
    ParseError { message: message.into(), offset }
}

struct Frame {
    invocation: Invocation,
    body: Vec<Node>,
    inverse: Vec<Node>,
    in_inverse: bool,
    offset: usize,
}

/// Parses template source into a node tree.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    let mut roots: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    fn push(roots: &mut Vec<Node>, stack: &mut Vec<Frame>, node: Node) {
        match stack.last_mut() {
            Some(frame) if frame.in_inverse => frame.inverse.push(node),
            Some(frame) => frame.body.push(node),
            None => roots.push(node),
        }
    }

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            push(&mut roots, &mut stack, Node::Text(rest[..start].to_string()));
        }
        let tag_offset = offset + start;
        let after_open = &rest[start + 2..];

        // Comments may contain `}}`, so the long form has its own terminator.
        if let Some(comment) = after_open.strip_prefix("!--") {
            let end = comment
                .find("--}}")
                .ok_or_else(|| error("unterminated comment", tag_offset))?;
            let consumed = start + 2 + 3 + end + 4;
            offset += consumed;
            rest = &rest[consumed..];
            continue;
        }
        if let Some(comment) = after_open.strip_prefix('!') {
            let end =
                comment.find("}}").ok_or_else(|| error("unterminated comment", tag_offset))?;
            let consumed = start + 2 + 1 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
            continue;
        }

        let triple = after_open.starts_with('{');
        let inner_start = if triple { 1 } else { 0 };
        let close = if triple { "}}}" } else { "}}" };
        let content_area = &after_open[inner_start..];
        let end = content_area
            .find(close)
            .ok_or_else(|| error("unterminated tag: missing closing braces", tag_offset))?;
        let content = content_area[..end].trim();
        let consumed = start + 2 + inner_start + end + close.len();
        offset += consumed;
        rest = &rest[consumed..];

        if content.is_empty() {
            return Err(error("empty tag", tag_offset));
        }

        if content == "else" {
            let frame = stack
                .last_mut()
                .ok_or_else(|| error("{{else}} outside of a block", tag_offset))?;
            if frame.in_inverse {
                return Err(error("duplicate {{else}} in block", tag_offset));
            }
            frame.in_inverse = true;
            continue;
        }

        if let Some(name) = content.strip_prefix('/') {
            let frame = stack.pop().ok_or_else(|| {
                error(format!("closing tag '{{{{/{name}}}}}' without open block"), tag_offset)
            })?;
            let name = name.trim();
            if frame.invocation.name != name {
                return Err(error(
                    format!(
                        "mismatched closing tag: expected '{{{{/{}}}}}', found '{{{{/{name}}}}}'",
                        frame.invocation.name
                    ),
                    tag_offset,
                ));
            }
            let node = Node::Block {
                invocation: frame.invocation,
                body: frame.body,
                inverse: frame.inverse,
            };
            push(&mut roots, &mut stack, node);
            continue;
        }

        if let Some(opening) = content.strip_prefix('#') {
            let invocation = parse_invocation(opening.trim(), tag_offset)?;
            stack.push(Frame {
                invocation,
                body: Vec::new(),
                inverse: Vec::new(),
                in_inverse: false,
                offset: tag_offset,
            });
            continue;
        }

        let invocation = parse_invocation(content, tag_offset)?;
        push(&mut roots, &mut stack, Node::Expression(invocation));
    }

    if let Some(frame) = stack.last() {
        return Err(error(
            format!("unclosed block '{{{{#{}}}}}'", frame.invocation.name),
            frame.offset,
        ));
    }

    if !rest.is_empty() {
        roots.push(Node::Text(rest.to_string()));
    }

    Ok(roots)
}

fn parse_invocation(content: &str, offset: usize) -> Result<Invocation, ParseError> {
    let tokens = tokenize(content, offset)?;
    let mut iter = tokens.into_iter();
    let name_token =
        iter.next().ok_or_else(|| error("tag without helper name or path", offset))?;

    if name_token.starts_with('\'') || name_token.starts_with('"') {
        return Err(error("tag must start with a helper name or path", offset));
    }

    let mut args = Vec::new();
    let mut hash = Vec::new();
    for token in iter {
        match split_hash(&token) {
            Some((key, value)) => {
                hash.push((key.to_string(), parse_argument(value, offset)?));
            }
            None => args.push(parse_argument(&token, offset)?),
        }
    }

    Ok(Invocation {
        path: parse_path(&name_token),
        name: name_token,
        args,
        hash,
    })
}

/// Splits `key=value` tokens; quoted tokens and tokens without a bare `=`
/// before any quote stay positional.
fn split_hash(token: &str) -> Option<(&str, &str)> {
    let eq = token.find('=')?;
    let key = &token[..eq];
    if key.is_empty()
        || !key.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '$'))
    {
        return None;
    }
    Some((key, &token[eq + 1..]))
}

fn parse_argument(token: &str, offset: usize) -> Result<Argument, ParseError> {
    if let Some(quoted) = strip_quotes(token) {
        return Ok(Argument::String(quoted.to_string()));
    }
    match token {
        "true" => return Ok(Argument::Bool(true)),
        "false" => return Ok(Argument::Bool(false)),
        _ => {}
    }
    if token.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        if let Ok(number) = token.parse::<f64>() {
            return Ok(Argument::Number(number));
        }
    }
    if token.is_empty() {
        return Err(error("empty argument", offset));
    }
    Ok(Argument::Path(parse_path(token)))
}

fn strip_quotes(token: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return Some(&token[1..token.len() - 1]);
        }
    }
    None
}

fn parse_path(token: &str) -> PathExpr {
    let mut parents = 0;
    let mut rest = token;
    while let Some(stripped) = rest.strip_prefix("../") {
        parents += 1;
        rest = stripped;
    }
    if rest == ".." {
        parents += 1;
        rest = "";
    }

    let segments = if rest.is_empty() || rest == "this" || rest == "." {
        Vec::new()
    } else {
        rest.split(['.', '/']).filter(|s| !s.is_empty()).map(ToString::to_string).collect()
    };

    PathExpr { parents, segments }
}

/// Splits tag content on whitespace while keeping quoted spans intact.
fn tokenize(content: &str, offset: usize) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in content.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                    current.push(ch);
                } else if ch.is_whitespace() {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(ch);
                }
            }
        }
    }
    if quote.is_some() {
        return Err(error("unterminated string literal", offset));
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}
