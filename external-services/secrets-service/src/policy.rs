//! Policy & capabilities (§2, §10.6) — interface only. This crate has no
//! HTTP layer to wire it into; it exists so the engines above can be
//! unit-tested against "what would be authorized" without inventing an
//! HTTP-coupled stand-in, and so a real authorization collaborator has a
//! concrete shape to implement against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Create,
    Update,
    Delete,
    List,
    Rotate,
}

/// `{path-glob, capabilities}` — a single rule granting a set of
/// capabilities over every path the glob matches. Globs support only `*`
/// (matches one path segment) and `**` (matches any number of segments),
/// matching the convention the rest of the corpus uses for path-scoped
/// authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub path_glob: String,
    pub capabilities: BTreeSet<Capability>,
}

impl PolicyRule {
    pub fn new(path_glob: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self { path_glob: path_glob.into(), capabilities: capabilities.into_iter().collect() }
    }

    fn matches_path(&self, path: &str) -> bool {
        glob_match(&self.path_glob, path)
    }
}

/// True if any rule in `rules` grants `capability` over `path`.
pub fn evaluate(rules: &[PolicyRule], path: &str, capability: Capability) -> bool {
    rules.iter().any(|rule| rule.capabilities.contains(&capability) && rule.matches_path(path))
}

/// Segment-aware glob matching: `*` matches exactly one `/`-delimited
/// segment, `**` matches zero or more segments.
fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=path.len()).any(|i| match_segments(rest, &path[i..]))
        }
        Some((&head, rest)) => match path.split_first() {
            Some((&p_head, p_rest)) if head == "*" || head == p_head => match_segments(rest, p_rest),
            _ => false,
        },
    }
}
