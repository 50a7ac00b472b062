//! C1 Spec Loader: reads a spec from a file or URL and produces a parsed
//! document tree.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ForgeConfig;
use crate::error::{Error, Result};

/// Either a local file path or an http(s) URL, as named by the Core API's
/// `LoadSpec(source)` contract.
#[derive(Debug, Clone)]
pub enum Source {
    File(String),
    Url(String),
}

impl Source {
    pub fn parse(source: &str) -> Result<Self> {
        if let Some(path) = source.strip_prefix("file:") {
            Ok(Source::File(path.to_string()))
        } else if let Some(rest) = source.strip_prefix("url:") {
            Ok(Source::Url(rest.to_string()))
        } else if source.starts_with("http://") || source.starts_with("https://") {
            Ok(Source::Url(source.to_string()))
        } else {
            Ok(Source::File(source.to_string()))
        }
    }
}

/// The outcome of loading: raw bytes plus the format they were detected as,
/// already parsed into a generic JSON tree so downstream stages don't care
/// whether the original was JSON or YAML.
pub struct LoadedDocument {
    pub value: serde_json::Value,
    pub source_bytes: Vec<u8>,
}

pub async fn load(
    source: &str,
    config: &ForgeConfig,
    cancel: &CancellationToken,
) -> Result<LoadedDocument> {
    let bytes = match Source::parse(source)? {
        Source::File(path) => read_file(&path, config).await?,
        Source::Url(url) => fetch_url(&url, config, cancel).await?,
    };

    if bytes.len() as u64 > config.max_spec_bytes {
        return Err(Error::FileTooLarge {
            size: bytes.len() as u64,
            limit: config.max_spec_bytes,
        });
    }

    let value = parse_document(&bytes)?;
    Ok(LoadedDocument {
        value,
        source_bytes: bytes,
    })
}

async fn read_file(path: &str, config: &ForgeConfig) -> Result<Vec<u8>> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::FileNotFound(format!("{path}: {e}")))?;
    if meta.len() > config.max_spec_bytes {
        return Err(Error::FileTooLarge {
            size: meta.len(),
            limit: config.max_spec_bytes,
        });
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| Error::FileReadError(format!("{path}: {e}")))
}

async fn fetch_url(
    raw_url: &str,
    config: &ForgeConfig,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let url = Url::parse(raw_url).map_err(|e| Error::InvalidUrl(format!("{raw_url}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(Error::InvalidUrl(format!("unsupported scheme: {other}"))),
    }

    if !config.allow_private_hosts {
        guard_against_ssrf(&url)?;
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| Error::NetworkError(e.to_string()))?;

    let fetch = async {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::NetworkError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::NetworkError(format!(
                "non-2xx response: {}",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::NetworkError(e.to_string()))
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(Duration::from_secs(config.network_deadline_secs), fetch) => {
            result.map_err(|_| Error::NetworkTimeout(Duration::from_secs(config.network_deadline_secs)))?
        }
    }
}

/// Reject loopback and RFC1918 private-network hosts unless the caller has
/// opted in via configuration.
fn guard_against_ssrf(url: &Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_disallowed_ip(ip) {
            return Err(Error::SsrfBlocked(host.to_string()));
        }
    } else if host == "localhost" || host.ends_with(".local") {
        return Err(Error::SsrfBlocked(host.to_string()));
    }
    Ok(())
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Try JSON first, then YAML; if both fail, keep whichever error reports a
/// later byte/line position since it got further into the document.
fn parse_document(bytes: &[u8]) -> Result<serde_json::Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::ParsingError(format!("document is not valid UTF-8: {e}")))?;

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => return Ok(value),
        Err(json_err) => match serde_yaml::from_str::<serde_json::Value>(text) {
            Ok(value) => return Ok(value),
            Err(yaml_err) => {
                let json_pos = (json_err.line(), json_err.column());
                let yaml_pos = yaml_err.location().map(|l| (l.line(), l.column()));
                let prefer_json = match yaml_pos {
                    Some((yl, yc)) => json_pos >= (yl, yc),
                    None => true,
                };
                return Err(Error::ParsingError(if prefer_json {
                    format!("JSON: {json_err}")
                } else {
                    format!("YAML: {yaml_err}")
                }));
            }
        },
    }
}

/// Used by tests and by the loader's internal reuse of a path already
/// confirmed to exist on disk (avoids a second stat round-trip).
pub fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_source() {
        assert!(matches!(Source::parse("file:spec.yaml").unwrap(), Source::File(p) if p == "spec.yaml"));
    }

    #[test]
    fn parses_bare_path_as_file() {
        assert!(matches!(Source::parse("spec.yaml").unwrap(), Source::File(p) if p == "spec.yaml"));
    }

    #[test]
    fn parses_url_source() {
        assert!(matches!(
            Source::parse("https://example.com/spec.json").unwrap(),
            Source::Url(u) if u == "https://example.com/spec.json"
        ));
    }

    #[test]
    fn ssrf_guard_blocks_loopback() {
        let url = Url::parse("http://127.0.0.1:8080/spec.json").unwrap();
        assert!(guard_against_ssrf(&url).is_err());
    }

    #[test]
    fn ssrf_guard_blocks_private_range() {
        let url = Url::parse("http://10.0.0.5/spec.json").unwrap();
        assert!(guard_against_ssrf(&url).is_err());
    }

    #[test]
    fn ssrf_guard_allows_public_host() {
        let url = Url::parse("http://example.com/spec.json").unwrap();
        assert!(guard_against_ssrf(&url).is_ok());
    }

    #[test]
    fn parses_json_document() {
        let doc = parse_document(br#"{"openapi": "3.0.0"}"#).unwrap();
        assert_eq!(doc["openapi"], "3.0.0");
    }

    #[test]
    fn parses_yaml_document() {
        let doc = parse_document(b"openapi: 3.0.0\ninfo:\n  title: x\n").unwrap();
        assert_eq!(doc["openapi"], "3.0.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_document(b"{not valid: [").is_err());
    }
}
