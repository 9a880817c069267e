//! Newick (parenthetical) tree text.
//!
//! The parser accepts quoted and unquoted labels, optional `:length`
//! suffixes, arbitrary whitespace and `[...]` comments. Comments can be
//! captured together with the node they follow, which is how MCMCTree
//! attaches credibility intervals to nodes.

use crate::errors::{McmcTreeError, Result};

use super::{NodeArena, Tree, NO_PARENT};

/// Characters that force a label to be quoted on output.
const SPECIAL: &[u8] = b" ()[]':;,\t\r\n";

/// Options for [`write_newick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewickWriteOptions {
    /// Emit `:length` for edges that have one.
    pub edge_lengths: bool,
    /// Emit labels on internal nodes.
    pub internal_labels: bool,
}

impl Default for NewickWriteOptions {
    fn default() -> Self {
        Self {
            edge_lengths: true,
            internal_labels: true,
        }
    }
}

/// Parse a Newick string into a [`Tree`]. Comments are skipped.
pub fn parse_newick(text: &str) -> Result<Tree> {
    let (arena, _) = Parser::new(text).parse()?;
    Ok(arena.into_tree().0)
}

/// Parse a Newick string and return every `[...]` comment body in textual
/// order, paired with the id of the node it follows.
///
/// A comment that precedes the first node has no owner and is an error.
pub fn parse_newick_with_comments(text: &str) -> Result<(Tree, Vec<(u32, String)>)> {
    let (arena, comments) = Parser::new(text).parse()?;
    let (tree, new_id) = arena.into_tree();
    let comments = comments
        .into_iter()
        .map(|(owner, body)| {
            if owner == NO_PARENT {
                Err(McmcTreeError::parse(format!(
                    "comment [{}] does not follow a node",
                    body
                )))
            } else {
                Ok((new_id[owner as usize], body))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((tree, comments))
}

struct Parser<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
    arena: NodeArena,
    comments: Vec<(u32, String)>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            text,
            pos: 0,
            arena: NodeArena::new(),
            comments: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, msg: &str) -> McmcTreeError {
        McmcTreeError::parse(format!("{} at byte {}", msg, self.pos))
    }

    /// Skip whitespace and comments, recording comments against `owner`.
    fn skip(&mut self, owner: u32) -> Result<()> {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'[' {
                let start = self.pos + 1;
                let end = self.bytes[start..]
                    .iter()
                    .position(|&b| b == b']')
                    .map(|off| start + off)
                    .ok_or_else(|| self.error("unterminated '['"))?;
                self.comments
                    .push((owner, self.text[start..end].to_string()));
                self.pos = end + 1;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse(mut self) -> Result<(NodeArena, Vec<(u32, String)>)> {
        self.skip(NO_PARENT)?;
        if self.peek().is_none() {
            return Err(self.error("empty tree"));
        }

        let mut node = self.arena.add_node(NO_PARENT);
        let mut open: Vec<u32> = Vec::new();

        'subtree: loop {
            self.skip(NO_PARENT)?;
            if self.peek() == Some(b'(') {
                self.pos += 1;
                open.push(node);
                node = self.arena.add_node(node);
                continue;
            }
            self.read_label_and_length(node)?;

            loop {
                self.skip(node)?;
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        let parent = *open
                            .last()
                            .ok_or_else(|| self.error("',' outside parentheses"))?;
                        node = self.arena.add_node(parent);
                        continue 'subtree;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        node = open.pop().ok_or_else(|| self.error("unbalanced ')'"))?;
                        self.read_label_and_length(node)?;
                    }
                    Some(b';') | None => {
                        if !open.is_empty() {
                            return Err(self.error("unbalanced '('"));
                        }
                        if self.peek() == Some(b';') {
                            self.pos += 1;
                        }
                        break 'subtree;
                    }
                    Some(c) => {
                        return Err(self.error(&format!("unexpected '{}'", c as char)));
                    }
                }
            }
        }

        self.skip(NO_PARENT)?;
        if self.peek().is_some() {
            return Err(self.error("trailing content after ';'"));
        }
        Ok((self.arena, self.comments))
    }

    fn read_label_and_length(&mut self, node: u32) -> Result<()> {
        self.skip(node)?;
        let label = self.read_label()?;
        if !label.is_empty() {
            self.arena.label[node as usize] = Some(label);
        }
        self.skip(node)?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip(node)?;
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || matches!(c, b'.' | b'-' | b'+' | b'e' | b'E') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            let raw = &self.text[start..self.pos];
            let length: f64 = raw
                .parse()
                .map_err(|_| self.error(&format!("invalid edge length '{}'", raw)))?;
            self.arena.edge_length[node as usize] = Some(length);
        }
        Ok(())
    }

    fn read_label(&mut self) -> Result<String> {
        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let mut out = String::new();
            loop {
                let rest = &self.text[self.pos..];
                let close = rest
                    .find('\'')
                    .ok_or_else(|| self.error("unterminated quoted label"))?;
                out.push_str(&rest[..close]);
                self.pos += close + 1;
                // '' inside a quoted label is an escaped quote
                if self.peek() == Some(b'\'') {
                    out.push('\'');
                    self.pos += 1;
                } else {
                    return Ok(out);
                }
            }
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if SPECIAL.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        Ok(self.text[start..self.pos].to_string())
    }
}

/// Format a number the way it is written into tree files: up to 7
/// significant digits, exponent notation below `1e-4` and from `1e7`.
pub fn format_number(x: f64) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    if !x.is_finite() {
        return x.to_string();
    }
    let magnitude = x.abs();
    if magnitude < 1e-4 || magnitude >= 1e7 {
        let s = format!("{:.6e}", x);
        let (mantissa, exponent) = s.split_once('e').unwrap_or((&s, "0"));
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        return format!("{}e{}", mantissa, exponent);
    }
    let decimals = (6 - magnitude.log10().floor() as i32).max(0) as usize;
    let s = format!("{:.*}", decimals, x);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

pub(crate) fn quote_label(label: &str) -> String {
    if label.bytes().any(|b| SPECIAL.contains(&b)) {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

/// Write a tree as a Newick string terminated by `;`.
pub fn write_newick(tree: &Tree, options: &NewickWriteOptions) -> String {
    let mut out = String::new();
    if tree.num_nodes() == 0 {
        out.push(';');
        return out;
    }

    // (node, children already written)
    let mut stack: Vec<(u32, bool)> = vec![(tree.root(), false)];
    while let Some((node, closed)) = stack.pop() {
        if node == NO_PARENT {
            out.push(',');
            continue;
        }
        let children = tree.children(node);
        if !closed && !children.is_empty() {
            out.push('(');
            stack.push((node, true));
            for (i, &child) in children.iter().enumerate().rev() {
                stack.push((child, false));
                if i > 0 {
                    // marker: a comma goes before every child except the first
                    stack.push((NO_PARENT, false));
                }
            }
            continue;
        }
        if closed {
            out.push(')');
        }
        if let Some(label) = tree.label(node) {
            if tree.is_tip(node) || options.internal_labels {
                out.push_str(&quote_label(label));
            }
        }
        if options.edge_lengths {
            if let Some(length) = tree.edge_length(node) {
                out.push(':');
                out.push_str(&format_number(length));
            }
        }
    }
    out.push(';');
    out
}
