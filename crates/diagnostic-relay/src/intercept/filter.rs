// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::Url;

use crate::config::RelayConfig;

/// Resolves `target` against the host origin. Targets that cannot be
/// resolved are returned unchanged.
#[must_use]
pub fn resolve_url(origin: &str, target: &str) -> String {
    Url::parse(origin)
        .and_then(|base| base.join(target))
        .or_else(|_| Url::parse(target))
        .map_or_else(|_| target.to_string(), String::from)
}

/// Whether `url` addresses the delivery endpoint, ignoring query and fragment.
#[must_use]
pub fn is_endpoint(url: &str, endpoint: &str) -> bool {
    let Some(rest) = url.strip_prefix(endpoint) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('?') || rest.starts_with('#')
}

/// Decides whether a call to `url` is observed under `config`.
///
/// Calls to the delivery endpoint are never observed. Exclude patterns win
/// over include patterns; an empty include list includes everything.
#[must_use]
pub fn should_observe(url: &str, endpoint: &str, config: &RelayConfig) -> bool {
    if is_endpoint(url, endpoint) {
        return false;
    }
    if config
        .network_exclude_patterns
        .iter()
        .any(|pattern| pattern.matches(url))
    {
        return false;
    }
    config.network_include_patterns.is_empty()
        || config
            .network_include_patterns
            .iter()
            .any(|pattern| pattern.matches(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayOptions;

    const ORIGIN: &str = "http://localhost:3000/app/";

    fn config(include: &[&str], exclude: &[&str]) -> RelayConfig {
        RelayConfig::resolve(&RelayOptions {
            network_include_patterns: Some(include.iter().map(ToString::to_string).collect()),
            network_exclude_patterns: Some(exclude.iter().map(ToString::to_string).collect()),
            ..Default::default()
        })
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url(ORIGIN, "/api/user"),
            "http://localhost:3000/api/user"
        );
        assert_eq!(
            resolve_url(ORIGIN, "data.json"),
            "http://localhost:3000/app/data.json"
        );
        assert_eq!(
            resolve_url(ORIGIN, "https://example.com/x"),
            "https://example.com/x"
        );
        assert_eq!(resolve_url("not a url", "/relative"), "/relative");
        assert_eq!(
            resolve_url("not a url", "https://example.com/"),
            "https://example.com/"
        );
    }

    #[test]
    fn test_is_endpoint() {
        let endpoint = "http://localhost:3000/__diagnostics";
        assert!(is_endpoint(endpoint, endpoint));
        assert!(is_endpoint(
            "http://localhost:3000/__diagnostics?x=1",
            endpoint
        ));
        assert!(!is_endpoint(
            "http://localhost:3000/__diagnostics-other",
            endpoint
        ));
        assert!(!is_endpoint("http://localhost:3000/api", endpoint));
    }

    #[test]
    fn test_should_observe() {
        let endpoint = "http://localhost:3000/__diagnostics";
        let all = config(&[], &[]);
        assert!(should_observe("http://localhost:3000/api", endpoint, &all));
        assert!(!should_observe(endpoint, endpoint, &all));

        let filtered = config(&["/api/"], &["health"]);
        assert!(should_observe(
            "http://localhost:3000/api/users",
            endpoint,
            &filtered
        ));
        assert!(!should_observe(
            "http://localhost:3000/static/app.js",
            endpoint,
            &filtered
        ));
        assert!(!should_observe(
            "http://localhost:3000/api/health",
            endpoint,
            &filtered
        ));
    }
}
