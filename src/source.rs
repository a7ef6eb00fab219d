//! Loading document bytes from the local filesystem or over HTTP

use std::fs;

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::options::Options;

/// Raw bytes plus the transport-level content type, when one was seen.
#[derive(Debug)]
pub struct Loaded {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Whether an origin names a remote resource rather than a local path.
///
/// Only `http` and `https` count; a Windows drive path like `C:\x.svg`
/// parses as a URL with scheme `c` and stays local.
pub fn is_remote(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Fetch the origin's bytes, locally or remotely.
pub fn load_source(origin: &str, options: &Options) -> Result<Loaded> {
    if is_remote(origin) {
        #[cfg(feature = "remote-fetch")]
        {
            return fetch_remote(origin, options);
        }
        #[cfg(not(feature = "remote-fetch"))]
        {
            let _ = options;
            return Err(Error::UnsupportedOperation(format!(
                "remote origin '{origin}' requires the remote-fetch capability"
            )));
        }
    }
    let bytes = fs::read(origin).map_err(|e| Error::SourceUnavailable {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    debug!(origin, len = bytes.len(), "read local source");
    Ok(Loaded {
        bytes,
        content_type: None,
    })
}

#[cfg(feature = "remote-fetch")]
fn fetch_remote(origin: &str, options: &Options) -> Result<Loaded> {
    let mut builder = reqwest::blocking::Client::builder();
    if options.timeout > 0 {
        builder = builder.timeout(std::time::Duration::from_secs(options.timeout));
    }
    if let Some(ua) = &options.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let client = builder.build().map_err(|e| Error::SourceUnavailable {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;

    let response = client
        .get(origin)
        .send()
        .map_err(|e| Error::SourceUnavailable {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(Error::SourceUnavailable {
            origin: origin.to_string(),
            reason: format!("HTTP status {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let bytes = response
        .bytes()
        .map_err(|e| Error::SourceUnavailable {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    debug!(origin, len = bytes.len(), ?content_type, "fetched remote source");
    Ok(Loaded {
        bytes,
        content_type,
    })
}

/// Decode bytes to text, returning the text and the encoding's name.
///
/// Detection order: byte-order mark, then an in-document declaration
/// (XML prolog `encoding=` or HTML `charset=`), then the transport
/// content type, then UTF-8. Decoding never fails; undecodable bytes
/// become replacement characters.
pub fn decode_bytes(bytes: &[u8], content_type: Option<&str>) -> (String, String) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), encoding.name().to_string());
    }

    let encoding = declared_encoding(bytes)
        .or_else(|| content_type.and_then(charset_from_content_type))
        .unwrap_or(UTF_8);

    let (text, actual, _) = encoding.decode(bytes);
    (text.into_owned(), actual.name().to_string())
}

/// Look for an `encoding=` / `charset=` declaration in the first KiB.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head: String = bytes
        .iter()
        .take(1024)
        .map(|&b| if b.is_ascii() { b as char } else { '\u{fffd}' })
        .collect::<String>()
        .to_ascii_lowercase();

    for key in ["encoding=", "charset="] {
        if let Some(pos) = head.find(key) {
            let rest = &head[pos + key.len()..];
            let rest = rest.trim_start_matches(['"', '\'', ' ']);
            let end = rest
                .find(|c: char| c == '"' || c == '\'' || c == ' ' || c == '>' || c == '?' || c == ';')
                .unwrap_or(rest.len());
            let label = rest[..end].trim();
            if let Some(encoding) = Encoding::for_label_no_replacement(label.as_bytes()) {
                return Some(encoding);
            }
        }
    }
    None
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, v)| {
            Encoding::for_label_no_replacement(v.trim().trim_matches('"').as_bytes())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_origins_are_remote() {
        assert!(is_remote("http://example.com/img.svg"));
        assert!(is_remote("https://example.com/img.svg"));
        assert!(!is_remote("/tmp/img.svg"));
        assert!(!is_remote("img.svg"));
        assert!(!is_remote("C:\\images\\img.svg"));
        assert!(!is_remote("ftp://example.com/img.svg"));
    }

    #[test]
    fn bom_wins_over_declaration() {
        let mut bytes = vec![0xFF, 0xFE];
        for u in "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a/>".encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        let (text, name) = decode_bytes(&bytes, None);
        assert_eq!(name, "UTF-16LE");
        assert!(text.starts_with("<?xml"));
    }

    #[test]
    fn xml_prolog_declaration_is_used() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xe9</a>";
        let (text, name) = decode_bytes(bytes, None);
        assert_eq!(name, "windows-1252");
        assert!(text.contains("café"));
    }

    #[test]
    fn content_type_charset_is_a_fallback() {
        let bytes = b"<a>caf\xe9</a>";
        let (text, name) = decode_bytes(bytes, Some("image/svg+xml; charset=ISO-8859-1"));
        assert_eq!(name, "windows-1252");
        assert!(text.contains("café"));
    }

    #[test]
    fn defaults_to_utf8() {
        let (text, name) = decode_bytes("<a>café</a>".as_bytes(), None);
        assert_eq!(name, "UTF-8");
        assert_eq!(text, "<a>café</a>");
    }

    #[test]
    fn missing_file_reports_origin() {
        let err = load_source("/nonexistent/path/x.svg", &Options::default()).unwrap_err();
        match err {
            Error::SourceUnavailable { origin, .. } => {
                assert_eq!(origin, "/nonexistent/path/x.svg")
            }
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }
}
