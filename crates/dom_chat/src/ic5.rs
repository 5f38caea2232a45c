//! IC-5 extraction.
//!
//! The assistant is prompted to answer in a three-part markdown layout:
//!
//! ```text
//! ## Decision
//! ...
//! ## Why
//! ...
//! ## Next 3 Actions
//! 1. ...
//! 2. ...
//! 3. ...
//! ```
//!
//! [`extract`] turns a finished reply into an [`Ic5Record`]. It never fails:
//! a missing section leaves its field empty and adds a warning.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured decision record derived from one assistant reply
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ic5Record {
    pub decision: String,
    pub why: String,
    /// Intended to hold three items; not enforced
    pub next_actions: Vec<String>,
    /// The reply exactly as received
    pub raw_markdown: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_warnings: Vec<String>,
}

impl Ic5Record {
    /// All three sections were found.
    pub fn is_complete(&self) -> bool {
        self.parse_warnings.is_empty()
    }
}

/// The three sections of an IC-5 reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ic5Section {
    Decision,
    Why,
    NextActions,
}

impl Ic5Section {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Decision => "Decision",
            Self::Why => "Why",
            Self::NextActions => "Next 3 Actions",
        }
    }

    fn matches(&self, heading: &str) -> bool {
        let patterns = patterns();
        let heading = heading.trim();
        match self {
            Self::Decision => patterns.decision.is_match(heading),
            Self::Why => patterns.why.is_match(heading),
            Self::NextActions => patterns.next_actions.is_match(heading),
        }
    }

    fn missing_warning(&self) -> String {
        format!("{} section not found", self.title())
    }
}

struct Patterns {
    heading: Regex,
    decision: Regex,
    why: Regex,
    next_actions: Regex,
    action_item: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        heading: Regex::new(r"(?m)^[ \t]{0,3}#{1,6}(?:[ \t]+([^\r\n]*?))?[ \t#]*\r?$")
            .expect("heading pattern"),
        decision: Regex::new(r"(?i)^decision\s*:?$").expect("decision pattern"),
        why: Regex::new(r"(?i)^why\s*:?$").expect("why pattern"),
        next_actions: Regex::new(r"(?i)^next\s+(?:3\s+|three\s+)?actions?(?:\s*\(s\))?\s*:?$")
            .expect("next actions pattern"),
        action_item: Regex::new(r"^\s*(?:\d+\.\s*|[-*]\s+)(.*)$").expect("action item pattern"),
    })
}

/// A heading line and the byte span of the body below it.
struct Heading<'a> {
    title: &'a str,
    body_start: usize,
    body_end: usize,
}

fn headings(markdown: &str) -> Vec<Heading<'_>> {
    let matches: Vec<_> = patterns()
        .heading
        .captures_iter(markdown)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let title = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            Some((whole.start(), whole.end(), title))
        })
        .collect();

    matches
        .iter()
        .enumerate()
        .map(|(i, &(_, end, title))| Heading {
            title,
            body_start: end,
            body_end: matches
                .get(i + 1)
                .map(|&(next_start, _, _)| next_start)
                .unwrap_or(markdown.len()),
        })
        .collect()
}

/// Body of the first heading matching `section`, trimmed.
fn section_body<'a>(markdown: &'a str, headings: &[Heading<'a>], section: Ic5Section) -> Option<&'a str> {
    headings
        .iter()
        .find(|h| section.matches(h.title))
        .map(|h| markdown[h.body_start..h.body_end].trim())
}

/// Numbered (`1.`) or bulleted (`-`, `*`) items, markers stripped.
fn action_items(body: &str) -> Vec<String> {
    let item = &patterns().action_item;
    body.lines()
        .filter_map(|line| item.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|action| !action.is_empty())
        .collect()
}

/// Extract an [`Ic5Record`] from a finished assistant reply.
pub fn extract(markdown: &str) -> Ic5Record {
    let headings = headings(markdown);
    let mut warnings = Vec::new();

    let mut text_section = |section: Ic5Section| match section_body(markdown, &headings, section) {
        Some(body) => body.to_string(),
        None => {
            warnings.push(section.missing_warning());
            String::new()
        }
    };

    let decision = text_section(Ic5Section::Decision);
    let why = text_section(Ic5Section::Why);

    let next_actions = match section_body(markdown, &headings, Ic5Section::NextActions) {
        Some(body) => action_items(body),
        None => {
            warnings.push(Ic5Section::NextActions.missing_warning());
            Vec::new()
        }
    };

    Ic5Record {
        decision,
        why,
        next_actions,
        raw_markdown: markdown.to_string(),
        parse_warnings: warnings,
    }
}
