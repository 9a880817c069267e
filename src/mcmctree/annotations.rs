//! Bracket annotations in MCMCTree's `FigTree.tre` output.
//!
//! Each internal node is followed by `[&95%HPD={lower, upper}]`. Only the
//! brace-delimited pair is read; anything before it is ignored.

use crate::errors::{McmcTreeError, Result};

/// Equal-tailed credibility interval attached to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CredibilityInterval {
    pub lower: f64,
    pub upper: f64,
}

impl CredibilityInterval {
    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.lower - tolerance && value <= self.upper + tolerance
    }
}

/// Remove every `[...]` annotation, leaving plain Newick text.
pub fn strip_annotations(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let close = rest[open..]
            .find(']')
            .ok_or_else(|| McmcTreeError::parse("unterminated '[' in annotated tree"))?;
        rest = &rest[open + close + 1..];
    }
    if rest.contains(']') {
        return Err(McmcTreeError::parse("unmatched ']' in annotated tree"));
    }
    out.push_str(rest);
    Ok(out)
}

/// Bodies of all `[...]` annotations in left-to-right order.
pub fn extract_annotations(text: &str) -> Result<Vec<&str>> {
    let mut bodies = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let body_start = open + 1;
        let close = rest[body_start..]
            .find(']')
            .ok_or_else(|| McmcTreeError::parse("unterminated '[' in annotated tree"))?;
        bodies.push(&rest[body_start..body_start + close]);
        rest = &rest[body_start + close + 1..];
    }
    Ok(bodies)
}

/// Parse the `{lower, upper}` pair inside one annotation body.
pub fn parse_interval(body: &str) -> Result<CredibilityInterval> {
    let open = body
        .find('{')
        .ok_or_else(|| McmcTreeError::parse(format!("annotation [{}] has no '{{'", body)))?;
    let close = body[open..]
        .find('}')
        .map(|off| open + off)
        .ok_or_else(|| McmcTreeError::parse(format!("annotation [{}] has no '}}'", body)))?;

    let fields: Vec<&str> = body[open + 1..close].split(',').map(str::trim).collect();
    if fields.len() != 2 {
        return Err(McmcTreeError::parse(format!(
            "annotation [{}] has {} fields, expected 2",
            body,
            fields.len()
        )));
    }

    let number = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| McmcTreeError::parse(format!("annotation [{}]: '{}' is not a number", body, s)))
    };
    let lower = number(fields[0])?;
    let upper = number(fields[1])?;
    if lower > upper {
        return Err(McmcTreeError::parse(format!(
            "annotation [{}]: lower bound exceeds upper bound",
            body
        )));
    }
    Ok(CredibilityInterval { lower, upper })
}

/// Select the tree field of a `FigTree.tre` file.
///
/// Blank lines are skipped, the remaining lines are split on tabs, and
/// field `index` (0-based, counted across lines) is returned. The
/// MCMCTree file starts `#NEXUS`, `BEGIN TREES;`, then a tab-indented
/// `UTREE 1 = ...` line, which makes the tree field index 3.
pub fn extract_tree_field(contents: &str, index: usize) -> Result<&str> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| line.split('\t'))
        .nth(index)
        .ok_or_else(|| McmcTreeError::parse(format!("input has no field {}", index + 1)))
}

/// Drop everything before the first `(`, e.g. a `UTREE 1 =` prefix.
pub fn tree_text(field: &str) -> Result<&str> {
    let start = field
        .find('(')
        .ok_or_else(|| McmcTreeError::parse("tree field contains no '('"))?;
    Ok(field[start..].trim_end())
}
