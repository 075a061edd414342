//! Checklist extraction from agent output.
//!
//! Agent output is freeform text that often (but not always) contains a
//! checklist. The parser is deliberately forgiving:
//!
//! 1. **Section narrowing** - if a `TODO`/`Tasks`/`Plan` header is present,
//!    only the lines between it and the next Markdown heading are parsed.
//!    Without a header the whole text is parsed.
//! 2. **Line classification** - each non-blank line is trimmed and tested
//!    against an ordered rule table; the first matching rule decides the
//!    item's state. Bracketed forms come before bare bullets so `- [x]` is
//!    never read as a plain `- ` bullet.
//! 3. **Filtering** - captured text shorter than three characters is noise.
//!
//! Parsing never fails: malformed input yields an empty list.
//!
//! | Marker                          | Result    |
//! |---------------------------------|-----------|
//! | `✓` `✅` `[x]` `* [x]` `- [x]`   | completed |
//! | `✗` `❌` `[!]` `- [!]` `* [!]`   | blocked   |
//! | `[ ]` `* [ ]` `- [ ]`            | pending   |
//! | `-` `⚬` `○` `*`                  | pending   |

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use branchwatch_models::AgentTodo;
use regex::Regex;
use tracing::{trace, warn};

/// Captured text shorter than this is discarded.
const MIN_TODO_LEN: usize = 3;

/// State assigned by a matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TodoKind {
    Completed,
    Blocked,
    Pending,
}

/// Rule table: (name, pattern, kind). Order matters.
const TODO_RULES: &[(&str, &str, TodoKind)] = &[
    // Completed
    ("check_mark", r"^[✓✅]\x{FE0F}?\s+(.+)$", TodoKind::Completed),
    ("checked_box", r"^\[x\]\s+(.+)$", TodoKind::Completed),
    ("star_checked_box", r"^\*\s+\[x\]\s+(.+)$", TodoKind::Completed),
    ("dash_checked_box", r"^-\s+\[x\]\s+(.+)$", TodoKind::Completed),
    // Blocked, before pending so `[!]` is not swallowed by a bullet
    ("cross_mark", r"^[✗❌]\x{FE0F}?\s+(.+)$", TodoKind::Blocked),
    ("blocked_box", r"^\[!\]\s+(.+)$", TodoKind::Blocked),
    ("bullet_blocked_box", r"^[-*]\s+\[!\]\s+(.+)$", TodoKind::Blocked),
    // Pending
    ("empty_box", r"^\[ \]\s+(.+)$", TodoKind::Pending),
    ("star_empty_box", r"^\*\s+\[ \]\s+(.+)$", TodoKind::Pending),
    ("dash_empty_box", r"^-\s+\[ \]\s+(.+)$", TodoKind::Pending),
    ("bullet", r"^[-⚬○]\s+(.+)$", TodoKind::Pending),
    ("star_bullet", r"^\*\s+(.+)$", TodoKind::Pending),
];

/// Headers that open a checklist section.
const SECTION_HEADER: &str = concat!(
    r"(?i)^(?:",
    r"#+\s*(?:todo|tasks?|plan)",
    r"|(?:todo|tasks?|plan):",
    r"|\*\*(?:todo|tasks?|plan)\*\*",
    r")"
);

#[derive(Debug)]
struct TodoRule {
    name: &'static str,
    regex: Regex,
    kind: TodoKind,
}

/// Extracts checklist items from freeform text.
#[derive(Debug)]
pub struct TodoParser {
    rules: Vec<TodoRule>,
    section_header: Regex,
}

impl Default for TodoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoParser {
    /// Creates a parser with the built-in rule table.
    pub fn new() -> Self {
        let rules = TODO_RULES
            .iter()
            .map(|&(name, pattern, kind)| TodoRule {
                name,
                regex: Regex::new(&format!("(?i){}", pattern)).expect("Invalid todo pattern"),
                kind,
            })
            .collect();

        Self {
            rules,
            section_header: Regex::new(SECTION_HEADER).expect("Invalid section header pattern"),
        }
    }

    /// Parses checklist items from `text`.
    ///
    /// Returns an empty list for empty, unrecognized or malformed input.
    /// Never panics.
    pub fn parse(&self, text: &str) -> Vec<AgentTodo> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.parse_inner(text))) {
            Ok(todos) => todos,
            Err(_) => {
                warn!(len = text.len(), "todo parsing failed, returning no items");
                Vec::new()
            }
        }
    }

    fn parse_inner(&self, text: &str) -> Vec<AgentTodo> {
        let window = self.todo_section(text).unwrap_or_else(|| text.lines().collect());

        window
            .into_iter()
            .filter_map(|line| self.classify_line(line))
            .collect()
    }

    /// Returns the lines between a checklist header and the next heading.
    ///
    /// `None` if there is no header, or if the section has no content.
    fn todo_section<'a>(&self, text: &'a str) -> Option<Vec<&'a str>> {
        let lines: Vec<&str> = text.lines().collect();

        let start = lines
            .iter()
            .position(|line| self.section_header.is_match(line.trim()))?
            + 1;

        let section: Vec<&str> = lines[start..]
            .iter()
            .take_while(|line| !line.trim_start().starts_with('#'))
            .copied()
            .collect();

        if section.iter().all(|line| line.trim().is_empty()) {
            return None;
        }
        Some(section)
    }

    /// Classifies one line. The first matching rule decides; a match with
    /// too little text yields nothing.
    fn classify_line(&self, line: &str) -> Option<AgentTodo> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (rule, caps) = self
            .rules
            .iter()
            .find_map(|rule| rule.regex.captures(trimmed).map(|caps| (rule, caps)))?;

        let item = caps.get(1)?.as_str().trim();
        if item.chars().count() < MIN_TODO_LEN {
            trace!(rule = rule.name, "discarding short todo match");
            return None;
        }

        Some(match rule.kind {
            TodoKind::Completed => AgentTodo::done(item),
            TodoKind::Blocked => AgentTodo::blocked(item),
            TodoKind::Pending => AgentTodo::pending(item),
        })
    }
}

/// Parses checklist items with a shared, lazily built parser.
pub fn parse_todo_list(text: &str) -> Vec<AgentTodo> {
    static PARSER: OnceLock<TodoParser> = OnceLock::new();
    PARSER.get_or_init(TodoParser::new).parse(text)
}
