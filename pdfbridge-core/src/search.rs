//! Eager full-document text search with a results cursor.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    /// 1-based.
    pub page: usize,
    /// Byte offsets into the page text.
    pub start: usize,
    pub end: usize,
    pub match_text: String,
}

/// Active search of one session.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub query: String,
    pub options: SearchOptions,
    pub matches: Vec<SearchMatch>,
    pub current_match_index: Option<usize>,
}

impl SearchState {
    pub fn new(query: String, options: SearchOptions, matches: Vec<SearchMatch>) -> Self {
        Self {
            query,
            options,
            matches,
            current_match_index: None,
        }
    }

    pub fn next_match(&mut self) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let next = match self.current_match_index {
            Some(idx) => (idx + 1) % self.matches.len(),
            None => 0,
        };
        self.current_match_index = Some(next);
        self.matches.get(next)
    }

    pub fn previous_match(&mut self) -> Option<&SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let previous = match self.current_match_index {
            Some(0) | None => self.matches.len() - 1,
            Some(idx) => idx - 1,
        };
        self.current_match_index = Some(previous);
        self.matches.get(previous)
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.current_match_index
            .and_then(|idx| self.matches.get(idx))
    }
}

/// Compiles a literal query honoring the case and whole-word options.
pub fn build_matcher(query: &str, options: SearchOptions) -> Result<Regex> {
    let escaped = regex::escape(query);
    let pattern = if options.whole_word {
        format!(r"\b{escaped}\b")
    } else {
        escaped
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|err| BridgeError::invalid_argument("query", err.to_string()))
}

/// Collects every non-overlapping match on one page, in text order.
pub fn find_in_page(matcher: &Regex, page: usize, text: &str) -> Vec<SearchMatch> {
    matcher
        .find_iter(text)
        .map(|m| SearchMatch {
            page,
            start: m.start(),
            end: m.end(),
            match_text: m.as_str().to_string(),
        })
        .collect()
}
