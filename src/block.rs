//! Managed-block editing for the target file.
//!
//! The override block is the region between a start marker line and an end
//! marker line. Everything here is a pure text transform: callers read the
//! file, run one of these functions, and decide what to write back.
//!
//! ```text
//! # >>> stickyconf managed block >>>
//! MaxClients 50
//! # <<< stickyconf managed block <<<
//! <original file content>
//! # >>> stickyconf managed block >>>
//! MaxClients 50
//! # <<< stickyconf managed block <<<
//! ```

use serde::{Deserialize, Serialize};

/// Default first line of a managed block.
pub const DEFAULT_START_MARKER: &str = "# >>> stickyconf managed block >>>";

/// Default last line of a managed block.
pub const DEFAULT_END_MARKER: &str = "# <<< stickyconf managed block <<<";

/// Default comment prefix for the override source.
pub const DEFAULT_COMMENT_PREFIX: &str = "#";

/// Where the built block is placed relative to the rest of the target.
///
/// The owning service's directive precedence is not known in general (some
/// directives are first-wins, others last-wins), so `Both` is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Block at the top and at the bottom of the file
    #[default]
    Both,
    /// Block at the top only
    Prepend,
    /// Block at the bottom only
    Append,
}

impl Placement {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "both" => Some(Placement::Both),
            "prepend" | "top" => Some(Placement::Prepend),
            "append" | "bottom" => Some(Placement::Append),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Placement::Both => "both",
            Placement::Prepend => "prepend",
            Placement::Append => "append",
        }
    }

    fn prepends(self) -> bool {
        matches!(self, Placement::Both | Placement::Prepend)
    }

    fn appends(self) -> bool {
        matches!(self, Placement::Both | Placement::Append)
    }
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marker lines and comment syntax that define a managed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFormat {
    pub start_marker: String,
    pub end_marker: String,
    pub comment_prefix: String,
}

impl Default for BlockFormat {
    fn default() -> Self {
        Self {
            start_marker: DEFAULT_START_MARKER.to_string(),
            end_marker: DEFAULT_END_MARKER.to_string(),
            comment_prefix: DEFAULT_COMMENT_PREFIX.to_string(),
        }
    }
}

impl BlockFormat {
    /// Create a format with custom markers and comment prefix.
    ///
    /// Surrounding whitespace is trimmed since marker lines are matched
    /// after trimming.
    pub fn new(start_marker: &str, end_marker: &str, comment_prefix: &str) -> Self {
        Self {
            start_marker: start_marker.trim().to_string(),
            end_marker: end_marker.trim().to_string(),
            comment_prefix: comment_prefix.trim().to_string(),
        }
    }

    /// Validate the markers.
    ///
    /// Returns an error message if the markers could be confused with each
    /// other or with blank lines.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_marker.trim().is_empty() || self.end_marker.trim().is_empty() {
            return Err("block markers must not be empty".to_string());
        }
        if self.start_marker.trim() == self.end_marker.trim() {
            return Err("start-marker and end-marker must differ".to_string());
        }
        if self.comment_prefix.trim().is_empty() {
            return Err("comment-prefix must not be empty".to_string());
        }
        Ok(())
    }

    fn is_start(&self, line: &str) -> bool {
        line.trim() == self.start_marker
    }

    fn is_end(&self, line: &str) -> bool {
        line.trim() == self.end_marker
    }

    /// Line indices of the first well-formed block: an end marker and the
    /// closest start marker above it.
    ///
    /// A start marker followed by another start marker before any end
    /// marker does not open a block, and an end marker with no start marker
    /// above it does not close one. Such stray lines are ordinary content.
    fn find_block(&self, lines: &[&str]) -> Option<(usize, usize)> {
        let mut start = None;
        for (i, line) in lines.iter().enumerate() {
            if self.is_start(line) {
                start = Some(i);
            } else if self.is_end(line) {
                if let Some(start) = start {
                    return Some((start, i));
                }
            }
        }
        None
    }

    /// Whether `content` holds a well-formed block.
    pub fn has_block(&self, content: &str) -> bool {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        self.find_block(&lines).is_some()
    }

    /// Whether any line of `content` is a marker line.
    pub fn contains_marker(&self, content: &str) -> bool {
        content
            .lines()
            .any(|line| self.is_start(line) || self.is_end(line))
    }

    /// Canonical payload of the first block: the text strictly between the
    /// markers, normalized with [`payload`].
    pub fn extract_payload(&self, content: &str) -> Option<String> {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let (start, end) = self.find_block(&lines)?;
        Some(payload(&lines[start + 1..end].concat()))
    }

    /// Remove the first block, both marker lines inclusive.
    ///
    /// Content without a complete block is returned unchanged.
    pub fn remove_block(&self, content: &str) -> String {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        match self.find_block(&lines) {
            Some((start, end)) => {
                let mut out = lines[..start].concat();
                out.push_str(&lines[end + 1..].concat());
                out
            }
            None => content.to_string(),
        }
    }

    /// Remove well-formed blocks until none remain. Stray marker lines stay.
    pub fn strip_blocks(&self, content: &str) -> String {
        let mut current = content.to_string();
        while self.has_block(&current) {
            current = self.remove_block(&current);
        }
        current
    }

    /// Wrap `payload` between the two marker lines (no trailing newline).
    pub fn build_block(&self, payload: &str) -> String {
        if payload.is_empty() {
            format!("{}\n{}", self.start_marker, self.end_marker)
        } else {
            format!("{}\n{}\n{}", self.start_marker, payload, self.end_marker)
        }
    }

    /// Whether `source` has at least one line that is neither blank nor a comment.
    pub fn has_content(&self, source: &str) -> bool {
        source.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with(self.comment_prefix.as_str())
        })
    }
}

/// Place `block` around `rest` according to `placement`.
///
/// For `Both` this is `block + "\n" + rest + "\n" + block`, where the newline
/// before the trailing block is dropped when `rest` already ends its last
/// line, and the file is terminated with a newline. With that rule,
/// stripping and recomposing a composed file reproduces it byte for byte.
pub fn compose(rest: &str, block: &str, placement: Placement) -> String {
    let mut out = String::with_capacity(rest.len() + 2 * block.len() + 4);

    if placement.prepends() {
        out.push_str(block);
        out.push('\n');
    }

    out.push_str(rest);

    if placement.appends() {
        if !rest.is_empty() && !rest.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(block);
        out.push('\n');
    }

    out
}

/// Canonical form of an override payload: lines joined with `\n`, line
/// endings normalized, trailing blank lines dropped.
pub fn payload(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
