// SPDX-License-Identifier: MIT

//! Pattern matching over the persisted snapshot.
//!
//! Matching policy (fixed, applied everywhere): patterns match against
//! `text_content` only and are case sensitive. A pattern without wildcard
//! characters matches as a plain substring. A pattern containing `*` (any
//! run, including empty) or `?` (exactly one character) is a glob anchored
//! to the whole text: `PMC-3M*` matches `PMC-3M-A` but not `XPMC-3M`.
//! Entities without text never match, and querying a drawing that was never
//! scanned yields zero matches rather than an error.
//!
//! This module only reads committed store state; it never talks to the host
//! and never mutates a record.

use std::fmt;

use regex::Regex;

use crate::model::{EntityRecord, PatternQuery, QueryMode};
use crate::store::{EntityFilter, SnapshotStore, StoreError};

#[derive(Debug)]
pub enum PatternError {
    Empty,
    Glob { pattern: String, source: regex::Error },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("pattern must not be empty"),
            Self::Glob { pattern, source } => {
                write!(f, "cannot compile glob pattern {pattern:?}: {source}")
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// A compiled text pattern; see the module docs for semantics.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Glob(Regex),
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        let matcher = if raw.contains(['*', '?']) {
            let regex = Regex::new(&glob_to_regex(raw)).map_err(|source| PatternError::Glob {
                pattern: raw.to_owned(),
                source,
            })?;
            Matcher::Glob(regex)
        } else {
            Matcher::Literal(raw.to_owned())
        };
        Ok(Self {
            raw: raw.to_owned(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(needle) => {
                memchr::memmem::find(text.as_bytes(), needle.as_bytes()).is_some()
            }
            Matcher::Glob(regex) => regex.is_match(text),
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

#[derive(Debug)]
pub enum QueryError {
    Pattern(PatternError),
    Store(StoreError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(source) => write!(f, "invalid pattern: {source}"),
            Self::Store(source) => write!(f, "pattern query failed: {source}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pattern(_) => "invalid_pattern",
            Self::Store(_) => "store_unavailable",
        }
    }
}

/// Result of evaluating one [`PatternQuery`], shaped by its mode.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternMatches {
    Count(u64),
    /// Full records, ascending by handle (the store's stable order).
    Records(Vec<EntityRecord>),
    /// Handles only, for the host layer to mark visually.
    Handles(Vec<String>),
}

/// Evaluates a pattern query against active records of the scoped drawing.
pub fn evaluate(
    store: &SnapshotStore,
    query: &PatternQuery,
) -> Result<PatternMatches, QueryError> {
    let pattern = Pattern::parse(&query.pattern).map_err(QueryError::Pattern)?;
    let filter = EntityFilter {
        layer: query.layer.clone(),
        ..EntityFilter::default()
    };
    let records = store
        .get_active(&query.drawing_id, &filter)
        .map_err(QueryError::Store)?;

    let matched = records.into_iter().filter(|record| {
        record
            .text_content
            .as_deref()
            .is_some_and(|text| pattern.matches(text))
    });

    Ok(match query.mode {
        QueryMode::Count => PatternMatches::Count(matched.count() as u64),
        QueryMode::List => PatternMatches::Records(matched.collect()),
        QueryMode::Highlight => {
            PatternMatches::Handles(matched.map(|record| record.handle).collect())
        }
    })
}
