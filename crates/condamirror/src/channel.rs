//! Channel host URLs.

use thiserror::Error;
use url::Url;

/// Host serving `repodata.json.bz2` indexes for every channel.
pub const DEFAULT_INDEX_HOST: &str = "https://conda.anaconda.org";

/// Host serving artifact downloads.
pub const DEFAULT_DOWNLOAD_HOST: &str = "https://anaconda.org";

/// Filename of the compressed index published in every channel subdirectory.
pub const INDEX_FILENAME: &str = "repodata.json.bz2";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid host URL '{url}': {reason}")]
pub struct InvalidHost {
    pub url: String,
    pub reason: String,
}

/// A base URL that path segments can be appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUrl(Url);

impl HostUrl {
    pub fn parse(url: &str) -> Result<Self, InvalidHost> {
        let parsed = Url::parse(url).map_err(|e| InvalidHost {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(InvalidHost {
                url: url.to_string(),
                reason: "expected an http(s) base URL".to_string(),
            });
        }
        Ok(Self(parsed))
    }

    /// Append percent-encoded path segments to the host.
    #[must_use]
    pub fn join<I, S>(&self, segments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.0.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        url.to_string()
    }
}

impl std::fmt::Display for HostUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_appends_segments() {
        let host = HostUrl::parse(DEFAULT_INDEX_HOST).unwrap();
        assert_eq!(
            host.join(["andfoy", "noarch", INDEX_FILENAME]),
            "https://conda.anaconda.org/andfoy/noarch/repodata.json.bz2"
        );
    }

    #[test]
    fn test_join_keeps_base_path_and_handles_trailing_slash() {
        let host = HostUrl::parse("http://127.0.0.1:8080/mirror/").unwrap();
        assert_eq!(
            host.join(["chan", "linux-64"]),
            "http://127.0.0.1:8080/mirror/chan/linux-64"
        );
    }

    #[test]
    fn test_join_encodes_segments() {
        let host = HostUrl::parse("https://example.org").unwrap();
        assert_eq!(host.join(["a b", "c/d"]), "https://example.org/a%20b/c%2Fd");
    }

    #[test]
    fn test_parse_rejects_non_http() {
        assert!(HostUrl::parse("mailto:someone@example.org").is_err());
        assert!(HostUrl::parse("ftp://example.org").is_err());
        assert!(HostUrl::parse("not a url").is_err());
    }
}
