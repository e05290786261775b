// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostics for bad chatbridge configuration files.
//!
//! Figment reports failures against a key path. This module maps each one onto
//! the four [`BridgeConfig`](crate::BridgeConfig) sections, points a miette
//! span at the offending line of the TOML file when it can find it, and offers
//! a close spelling for unknown names.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::fmt;

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a candidate must beat to be offered as a correction.
const CLOSE_ENOUGH: f64 = 0.75;

/// A top-level table of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Server,
    Storage,
    Auth,
    Relay,
}

impl Section {
    pub const ALL: [Section; 4] = [Self::Server, Self::Storage, Self::Auth, Self::Relay];

    pub fn name(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Storage => "storage",
            Self::Auth => "auth",
            Self::Relay => "relay",
        }
    }

    /// Keys accepted inside this table.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Self::Server => &["host", "port", "log_level"],
            Self::Storage => &["database_path", "wal_mode", "operation_timeout_ms"],
            Self::Auth => &["api_key", "admin_key"],
            Self::Relay => &[
                "session_timeout",
                "max_message_length",
                "rate_limit_window",
                "rate_limit_messages",
                "rate_limit_inbox",
                "rate_limit_outbox",
                "rate_limit_responses",
                "rate_limit_sessions",
                "sweep_interval_secs",
            ],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A configuration problem, rendered through miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown section `[{name}]`")]
    #[diagnostic(
        code(chatbridge::config::unknown_section),
        help("{}", correction_help(suggestion.as_deref(), &section_list()))
    )]
    UnknownSection {
        name: String,
        suggestion: Option<String>,
        #[label("not a chatbridge section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("unknown key `{key}`")]
    #[diagnostic(
        code(chatbridge::config::unknown_key),
        help("{}", correction_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys the enclosing section accepts.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for key `{key}`: found {found}")]
    #[diagnostic(code(chatbridge::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that parsed but makes no sense, e.g. a zero rate limit.
    #[error("validation error: {message}")]
    #[diagnostic(code(chatbridge::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(chatbridge::config::other))]
    Other(String),
}

fn correction_help(suggestion: Option<&str>, valid: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid}"),
        None => format!("valid keys: {valid}"),
    }
}

fn section_list() -> String {
    Section::ALL.map(Section::name).join(", ")
}

/// Closest candidate to `unknown`, if any is close enough to be a typo.
pub fn closest<'a>(unknown: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    candidates
        .into_iter()
        .map(|c| (strsim::jaro_winkler(unknown, c), c))
        .filter(|(score, _)| *score > CLOSE_ENOUGH)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}

/// Where a name sits in a TOML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<'a> {
    /// A `[name]` table header.
    Header(&'a str),
    /// `key = ...` inside `[section]`.
    Key { section: &'a str, key: &'a str },
}

/// Byte span of `location` in `content`.
///
/// Scans line by line, tracking which table each key belongs to, so a key
/// that appears in several tables resolves to the right one.
pub fn locate(content: &str, location: Location<'_>) -> Option<SourceSpan> {
    let mut table = "";
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = line.trim();
        if let Some(name) = body.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            table = name.trim();
            if location == Location::Header(table) {
                return Some(SourceSpan::new((offset + indent).into(), body.len()));
            }
        } else if let (Location::Key { section, key }, Some((lhs, _))) = (location, body.split_once('='))
            && table == section
            && lhs.trim_end() == key
        {
            return Some(SourceSpan::new((offset + indent).into(), key.len()));
        }
        offset += line.len();
    }
    None
}

/// Convert a figment failure into one diagnostic per underlying error.
///
/// `sources` pairs a display path with file contents; spans are resolved
/// against whichever source figment names, or the only source when there is
/// just one.
pub fn figment_to_config_errors(err: figment::Error, sources: &[(String, String)]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<&str> = error.path.iter().map(String::as_str).collect();
            let source = source_for(&error, sources);
            match &error.kind {
                Kind::UnknownField(name, _) if path.is_empty() => {
                    let (span, src) = spanned(source, Location::Header(name));
                    ConfigError::UnknownSection {
                        name: name.clone(),
                        suggestion: closest(name, Section::ALL.map(Section::name)),
                        span,
                        src,
                    }
                }
                Kind::UnknownField(key, expected) => {
                    let section = path[0];
                    let valid: &[&str] = match Section::from_name(section) {
                        Some(known) => known.keys(),
                        None => *expected,
                    };
                    let (span, src) = spanned(source, Location::Key { section, key });
                    ConfigError::UnknownKey {
                        key: key.clone(),
                        suggestion: closest(key, valid.iter().copied()),
                        valid_keys: valid.join(", "),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(found, expected) => {
                    let location = match path.as_slice() {
                        [section, key, ..] => Some(Location::Key { section, key }),
                        _ => None,
                    };
                    let (span, src) = location.map_or((None, None), |l| spanned(source, l));
                    ConfigError::InvalidType {
                        key: path.join("."),
                        found: found.to_string(),
                        expected: expected.clone(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn source_for<'s>(error: &figment::Error, sources: &'s [(String, String)]) -> Option<&'s (String, String)> {
    let named = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    match named {
        Some(path) => sources.iter().find(|(p, _)| *p == path),
        None if sources.len() == 1 => sources.first(),
        None => None,
    }
}

fn spanned(
    source: Option<&(String, String)>,
    location: Location<'_>,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    source
        .and_then(|(path, content)| {
            let span = locate(content, location)?;
            Some((Some(span), Some(NamedSource::new(path, content.clone()))))
        })
        .unwrap_or((None, None))
}

/// Print each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
