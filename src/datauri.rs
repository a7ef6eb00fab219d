//! Parsing and construction of RFC 2397 `data:` URIs
//!
//! SVG documents routinely carry embedded rasters and fonts as
//! `data:image/png;base64,...` attribute values; this module turns those
//! strings into bytes and back.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::{DecodePaddingMode, Engine};
use percent_encoding::{percent_decode_str, percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Standard alphabet, padding accepted but not required on decode.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Quick structural check, without decoding the payload.
pub fn is_data_uri(value: &str) -> bool {
    let value = value.trim();
    value.len() > 5
        && value.as_bytes()[..5].eq_ignore_ascii_case(b"data:")
        && value.contains(',')
}

/// A decoded `data:` URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataUri {
    pub mime_type: String,
    pub charset: Option<String>,
    pub is_base64: bool,
    /// The payload as written, everything after the comma.
    pub raw_payload: String,
    #[serde(skip)]
    pub decoded_bytes: Vec<u8>,
    /// Byte length of the decoded payload.
    pub size: usize,
}

impl DataUri {
    /// Parse a `data:` URI string.
    ///
    /// A missing media type defaults to `text/plain;charset=US-ASCII`.
    /// Base64 payloads are decoded strictly; anything else is treated as
    /// percent-encoded text.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.len() < 5 || !uri.as_bytes()[..5].eq_ignore_ascii_case(b"data:") {
            return Err(Error::MalformedDataUri(format!(
                "'{}' does not start with the data: scheme",
                clip(uri)
            )));
        }
        let rest = &uri[5..];
        let comma = rest.find(',').ok_or_else(|| {
            Error::MalformedDataUri(format!("'{}' has no ',' separator", clip(uri)))
        })?;
        let (header, payload) = (&rest[..comma], &rest[comma + 1..]);

        let mut mime_type = String::new();
        let mut charset = None;
        let mut is_base64 = false;
        for (n, part) in header.split(';').enumerate() {
            let part = part.trim();
            if n == 0 {
                mime_type = part.to_string();
            } else if part.eq_ignore_ascii_case("base64") {
                is_base64 = true;
            } else if let Some(cs) = part
                .split_once('=')
                .filter(|(k, _)| k.eq_ignore_ascii_case("charset"))
                .map(|(_, v)| v)
            {
                charset = Some(cs.to_string());
            }
        }
        if mime_type.is_empty() {
            mime_type = "text/plain".to_string();
            if charset.is_none() {
                charset = Some("US-ASCII".to_string());
            }
        }

        let decoded_bytes = if is_base64 {
            let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            BASE64.decode(compact.as_bytes()).map_err(|e| {
                Error::InvalidEncoding(format!("invalid base64 payload: {e}"))
            })?
        } else {
            percent_decode_str(payload).collect()
        };
        let size = decoded_bytes.len();

        Ok(Self {
            mime_type,
            charset,
            is_base64,
            raw_payload: payload.to_string(),
            decoded_bytes,
            size,
        })
    }

    /// Build a `data:` URI carrying the given bytes.
    pub fn encode(bytes: &[u8], mime_type: &str, base64_encode: bool) -> String {
        if base64_encode {
            format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
        } else {
            format!(
                "data:{mime_type},{}",
                percent_encode(bytes, NON_ALPHANUMERIC)
            )
        }
    }
}

fn clip(s: &str) -> &str {
    if s.len() > 40 {
        &s[..s.char_indices().take(40).last().map_or(0, |(i, c)| i + c.len_utf8())]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_data_uris() {
        assert!(is_data_uri("data:image/png;base64,iVBOR"));
        assert!(is_data_uri("DATA:text/plain,hi"));
        assert!(!is_data_uri("data:text/plain"));
        assert!(!is_data_uri("https://example.com/a.png"));
        assert!(!is_data_uri(""));
    }

    #[test]
    fn parses_base64_payload() {
        let uri = DataUri::parse("data:application/pdf;base64,JVBERi0xLjQK").unwrap();
        assert_eq!(uri.mime_type, "application/pdf");
        assert!(uri.is_base64);
        assert_eq!(uri.raw_payload, "JVBERi0xLjQK");
        assert_eq!(uri.decoded_bytes, b"%PDF-1.4\n");
        assert_eq!(uri.size, 9);
    }

    #[test]
    fn base64_payload_may_omit_padding() {
        let with = DataUri::parse("data:text/plain;base64,aGk=").unwrap();
        let without = DataUri::parse("data:text/plain;base64,aGk").unwrap();
        assert_eq!(with.decoded_bytes, b"hi");
        assert_eq!(without.decoded_bytes, b"hi");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = DataUri::parse("data:image/png;base64,!!!").unwrap_err();
        assert!(matches!(err, Error::InvalidEncoding(_)));
    }

    #[test]
    fn rejects_wrong_scheme_and_missing_comma() {
        assert!(matches!(
            DataUri::parse("foo:bar").unwrap_err(),
            Error::MalformedDataUri(_)
        ));
        assert!(matches!(
            DataUri::parse("data:text/plain").unwrap_err(),
            Error::MalformedDataUri(_)
        ));
    }

    #[test]
    fn empty_media_type_gets_defaults() {
        let uri = DataUri::parse("data:,Hi").unwrap();
        assert_eq!(uri.mime_type, "text/plain");
        assert_eq!(uri.charset.as_deref(), Some("US-ASCII"));
        assert!(!uri.is_base64);
        assert_eq!(uri.decoded_bytes, b"Hi");
    }

    #[test]
    fn percent_decodes_text_payload() {
        let uri = DataUri::parse("data:text/plain,Hello%20World").unwrap();
        assert_eq!(uri.decoded_bytes, b"Hello World");
        assert_eq!(uri.size, 11);
        assert_eq!(uri.charset, None);
    }

    #[test]
    fn charset_parameter_is_kept() {
        let uri = DataUri::parse("data:text/plain;charset=utf-8,caf%C3%A9").unwrap();
        assert_eq!(uri.charset.as_deref(), Some("utf-8"));
        assert_eq!(uri.decoded_bytes, "café".as_bytes());
    }

    #[test]
    fn encode_then_parse_preserves_bytes() {
        let payload = b"\x89PNG\r\n\x1a\n\x00\x01\x02";
        let uri = DataUri::encode(payload, "image/png", true);
        let parsed = DataUri::parse(&uri).unwrap();
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(parsed.decoded_bytes, payload);

        let text_uri = DataUri::encode(b"a b&c", "text/plain", false);
        let parsed = DataUri::parse(&text_uri).unwrap();
        assert_eq!(parsed.decoded_bytes, b"a b&c");
    }
}
