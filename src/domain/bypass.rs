//! Cache-bypass variants of purge targets.
//!
//! Akamai keeps a separate cache entry for requests carrying `imbypass=true`,
//! so every URL purge has to cover both variants. The helpers here derive the
//! bypass variant of a URL (absolute or origin-relative) while leaving the rest
//! of the reference untouched.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use tracing::warn;
use url::{Url, form_urlencoded};

/// Query parameter understood by the edge as "skip the cache layer".
pub const BYPASS_PARAM: &str = "imbypass";
pub const BYPASS_VALUE: &str = "true";

/// Characters escaped inside a query component; unreserved ones stay literal.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Relative references are resolved against this base only to validate them.
const VALIDATION_BASE: &str = "http://validation.invalid/";

#[derive(Debug, Error)]
pub enum QueryParamError {
    #[error("missing protocol scheme in `{0}`")]
    MissingScheme(String),
    #[error("first path segment in `{0}` cannot contain a colon")]
    ColonInFirstSegment(String),
    #[error("invalid control character in `{0}`")]
    ControlCharacter(String),
    #[error("malformed url `{input}`: {source}")]
    Malformed {
        input: String,
        #[source]
        source: url::ParseError,
    },
}

/// Set `key=value` on the query of `input`, replacing any existing values for
/// `key`. All parameters are re-encoded with keys in sorted order; values of a
/// repeated key keep their relative order.
pub fn add_query_param(input: &str, key: &str, value: &str) -> Result<String, QueryParamError> {
    validate_reference(input)?;

    let (without_fragment, fragment) = match input.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (input, None),
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, query),
        None => (without_fragment, ""),
    };

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, val) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(name.into_owned())
            .or_default()
            .push(val.into_owned());
    }
    params.insert(key.to_string(), vec![value.to_string()]);

    let mut rebuilt = String::with_capacity(input.len() + key.len() + value.len() + 2);
    rebuilt.push_str(base);
    rebuilt.push('?');
    rebuilt.push_str(&encode_query(&params));
    if let Some(fragment) = fragment {
        rebuilt.push('#');
        rebuilt.push_str(fragment);
    }

    Ok(rebuilt)
}

/// The `imbypass=true` variant of `input`.
pub fn with_bypass(input: &str) -> Result<String, QueryParamError> {
    add_query_param(input, BYPASS_PARAM, BYPASS_VALUE)
}

/// Expand every path into itself followed by its bypass variant.
///
/// Paths whose variant cannot be derived are kept once and reported with a
/// warning; the expansion never fails as a whole.
pub fn duplicate_with_bypass(paths: &[String]) -> Vec<String> {
    let mut expanded = Vec::with_capacity(paths.len() * 2);

    for path in paths {
        expanded.push(path.clone());

        match with_bypass(path) {
            Ok(variant) => expanded.push(variant),
            Err(err) => {
                warn!(
                    target = "edgepurge::bypass",
                    path = %path,
                    error = %err,
                    "failed to add imbypass parameter"
                );
            }
        }
    }

    expanded
}

fn encode_query(params: &BTreeMap<String, Vec<String>>) -> String {
    params
        .iter()
        .flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| format!("{}={}", escape(name), escape(value)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn escape(component: &str) -> String {
    utf8_percent_encode(component, QUERY_COMPONENT)
        .to_string()
        .replace("%20", "+")
}

fn validate_reference(input: &str) -> Result<(), QueryParamError> {
    if input.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(QueryParamError::ControlCharacter(input.to_string()));
    }

    if has_scheme(input)? {
        Url::parse(input).map_err(|source| QueryParamError::Malformed {
            input: input.to_string(),
            source,
        })?;
        return Ok(());
    }

    let first_segment = input
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if first_segment.contains(':') {
        return Err(QueryParamError::ColonInFirstSegment(input.to_string()));
    }

    let base = Url::parse(VALIDATION_BASE).map_err(|source| QueryParamError::Malformed {
        input: VALIDATION_BASE.to_string(),
        source,
    })?;
    base.join(input)
        .map(|_| ())
        .map_err(|source| QueryParamError::Malformed {
            input: input.to_string(),
            source,
        })
}

/// Whether `input` starts with a `scheme:` prefix.
fn has_scheme(input: &str) -> Result<bool, QueryParamError> {
    for (index, ch) in input.char_indices() {
        match ch {
            'a'..='z' | 'A'..='Z' => continue,
            '0'..='9' | '+' | '-' | '.' if index > 0 => continue,
            ':' if index == 0 => return Err(QueryParamError::MissingScheme(input.to_string())),
            ':' => return Ok(true),
            _ => return Ok(false),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_url_without_query() {
        let result = add_query_param("https://example.com/page", "imbypass", "true")
            .expect("valid url");
        assert_eq!(result, "https://example.com/page?imbypass=true");
    }

    #[test]
    fn merges_with_existing_query() {
        let result = add_query_param("https://example.com/page?foo=bar", "imbypass", "true")
            .expect("valid url");
        assert_eq!(result, "https://example.com/page?foo=bar&imbypass=true");
    }

    #[test]
    fn sorts_parameters_by_key() {
        let result = add_query_param(
            "https://example.com/page?foo=bar&baz=qux",
            "imbypass",
            "true",
        )
        .expect("valid url");
        assert_eq!(
            result,
            "https://example.com/page?baz=qux&foo=bar&imbypass=true"
        );
    }

    #[test]
    fn supports_origin_relative_paths() {
        let result =
            add_query_param("/path/to/resource", "imbypass", "true").expect("valid path");
        assert_eq!(result, "/path/to/resource?imbypass=true");
    }

    #[test]
    fn rejects_missing_scheme() {
        let err = add_query_param("://invalid", "imbypass", "true").unwrap_err();
        assert!(matches!(err, QueryParamError::MissingScheme(_)));
    }

    #[test]
    fn rejects_colon_in_first_relative_segment() {
        let err = add_query_param("1http://example.com", "imbypass", "true").unwrap_err();
        assert!(matches!(err, QueryParamError::ColonInFirstSegment(_)));
    }

    #[test]
    fn rejects_control_characters() {
        let err = add_query_param("https://example.com/\npage", "imbypass", "true").unwrap_err();
        assert!(matches!(err, QueryParamError::ControlCharacter(_)));
    }

    #[test]
    fn replaces_existing_value_for_key() {
        let result = add_query_param(
            "https://example.com/page?imbypass=false&a=1",
            "imbypass",
            "true",
        )
        .expect("valid url");
        assert_eq!(result, "https://example.com/page?a=1&imbypass=true");
    }

    #[test]
    fn keeps_fragment_after_query() {
        let result =
            add_query_param("https://example.com/page#top", "imbypass", "true").expect("valid url");
        assert_eq!(result, "https://example.com/page?imbypass=true#top");
    }

    #[test]
    fn re_encodes_values_canonically() {
        let result = add_query_param(
            "https://example.com/search?q=a+b&tag=x%2Fy",
            "imbypass",
            "true",
        )
        .expect("valid url");
        assert_eq!(
            result,
            "https://example.com/search?imbypass=true&q=a+b&tag=x%2Fy"
        );
    }

    #[test]
    fn encoding_is_stable_when_repeated() {
        let once = with_bypass("https://example.com/p?z=1&a=%C3%A9").expect("valid url");
        let twice = with_bypass(&once).expect("valid url");
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicates_each_path_in_order() {
        let paths = vec![
            "https://x.test/a".to_string(),
            "https://x.test/b?v=2".to_string(),
        ];
        assert_eq!(
            duplicate_with_bypass(&paths),
            vec![
                "https://x.test/a",
                "https://x.test/a?imbypass=true",
                "https://x.test/b?v=2",
                "https://x.test/b?imbypass=true&v=2",
            ]
        );
    }

    #[test]
    fn unparseable_path_is_kept_once() {
        let paths = vec!["://invalid".to_string(), "https://x.test/a".to_string()];
        assert_eq!(
            duplicate_with_bypass(&paths),
            vec![
                "://invalid",
                "https://x.test/a",
                "https://x.test/a?imbypass=true"
            ]
        );
    }

    #[test]
    fn empty_input_expands_to_nothing() {
        assert!(duplicate_with_bypass(&[]).is_empty());
    }
}
