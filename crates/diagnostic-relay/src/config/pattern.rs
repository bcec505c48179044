// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! URL patterns used by the network include/exclude lists.
//!
//! A pattern written between slashes (`/api\/v[0-9]+/`) is a regular
//! expression; a trailing `i` after the closing slash makes it
//! case-insensitive. Anything else is a plain substring match.

use regex::{Regex, RegexBuilder};
use tracing::error;

#[derive(Clone, Debug)]
pub enum NetworkPattern {
    Substring(String),
    Regex(Regex),
}

impl NetworkPattern {
    /// Parses a user supplied pattern.
    ///
    /// Returns `None` (after logging) for empty strings and invalid regular
    /// expressions, so a bad entry never disables the whole list.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            error!("Ignoring empty network pattern");
            return None;
        }

        let Some((source, case_insensitive)) = regex_source(raw) else {
            return Some(NetworkPattern::Substring(raw.to_string()));
        };

        match RegexBuilder::new(source)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(regex) => Some(NetworkPattern::Regex(regex)),
            Err(e) => {
                error!("Failed to compile network pattern '{raw}': {e}, ignoring");
                None
            }
        }
    }

    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            NetworkPattern::Substring(needle) => url.contains(needle.as_str()),
            NetworkPattern::Regex(regex) => regex.is_match(url),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            NetworkPattern::Substring(needle) => needle,
            NetworkPattern::Regex(regex) => regex.as_str(),
        }
    }
}

impl PartialEq for NetworkPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NetworkPattern::Substring(a), NetworkPattern::Substring(b)) => a == b,
            (NetworkPattern::Regex(a), NetworkPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Extracts the expression from `/expr/` or `/expr/i`.
fn regex_source(raw: &str) -> Option<(&str, bool)> {
    let rest = raw.strip_prefix('/')?;
    if let Some(source) = rest.strip_suffix("/i") {
        return (!source.is_empty()).then_some((source, true));
    }
    let source = rest.strip_suffix('/')?;
    (!source.is_empty()).then_some((source, false))
}

/// Parses every entry, dropping the invalid ones.
#[must_use]
pub fn parse_patterns(raw: &[String]) -> Vec<NetworkPattern> {
    raw.iter().filter_map(|p| NetworkPattern::parse(p)).collect()
}
