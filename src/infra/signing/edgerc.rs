use std::{collections::HashMap, fmt};

use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

/// Largest body prefix hashed into a signature unless the section overrides it.
pub const DEFAULT_MAX_BODY: usize = 131_072;

#[derive(Debug, Error)]
pub enum EdgercError {
    #[error("section `[{0}]` not found")]
    MissingSection(String),
    #[error("key `{key}` missing from section `[{section}]`")]
    MissingKey { section: String, key: &'static str },
    #[error("invalid max_body `{0}`")]
    InvalidMaxBody(String),
    #[error("failed to parse section `[{section}]`: {source}")]
    Parse {
        section: String,
        #[source]
        source: ConfigError,
    },
}

/// One section of an `.edgerc` file.
#[derive(Clone, PartialEq, Eq)]
pub struct EdgeGridCredentials {
    pub client_token: String,
    pub client_secret: String,
    pub access_token: String,
    pub host: Option<String>,
    pub max_body: usize,
}

impl fmt::Debug for EdgeGridCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeGridCredentials")
            .field("client_token", &self.client_token)
            .field("client_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("host", &self.host)
            .field("max_body", &self.max_body)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSection {
    client_token: Option<String>,
    client_secret: Option<String>,
    access_token: Option<String>,
    host: Option<String>,
    max_body: Option<String>,
}

/// Read `section` out of an INI-style `.edgerc` document.
///
/// Only the requested section is handed to the INI reader, so malformed
/// lines elsewhere in the file do not affect it.
pub fn parse_edgerc(contents: &str, section: &str) -> Result<EdgeGridCredentials, EdgercError> {
    let text = section_text(contents, section)
        .ok_or_else(|| EdgercError::MissingSection(section.to_string()))?;
    let parse_error = |source: ConfigError| EdgercError::Parse {
        section: section.to_string(),
        source,
    };

    let mut sections: HashMap<String, RawSection> = Config::builder()
        .add_source(File::from_str(&text, FileFormat::Ini))
        .build()
        .and_then(Config::try_deserialize)
        .map_err(parse_error)?;
    let raw = sections.drain().next().map(|(_, raw)| raw).unwrap_or_default();

    let require = |value: Option<String>, key: &'static str| {
        value
            .map(|v| unquote(v.trim()).to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EdgercError::MissingKey {
                section: section.to_string(),
                key,
            })
    };

    let max_body = match raw.max_body.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => unquote(value)
            .parse::<usize>()
            .map_err(|_| EdgercError::InvalidMaxBody(value.to_string()))?,
        _ => DEFAULT_MAX_BODY,
    };

    Ok(EdgeGridCredentials {
        client_token: require(raw.client_token, "client_token")?,
        client_secret: require(raw.client_secret, "client_secret")?,
        access_token: require(raw.access_token, "access_token")?,
        host: raw
            .host
            .map(|h| unquote(h.trim()).to_string())
            .filter(|h| !h.is_empty()),
        max_body,
    })
}

/// The lines of `[section]`, header included. `None` when the header is absent.
fn section_text(contents: &str, section: &str) -> Option<String> {
    let mut text: Option<String> = None;
    let mut inside = false;

    for line in contents.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            inside = name.trim() == section;
            if inside {
                text.get_or_insert_with(String::new)
                    .push_str(&format!("[{section}]\n"));
            }
            continue;
        }
        if inside {
            if let Some(text) = text.as_mut() {
                text.push_str(line);
                text.push('\n');
            }
        }
    }

    text
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
