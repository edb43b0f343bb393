//! Buffered upstream responses with content-encoding normalization.
//!
//! ### Decoding
//! - `gzip`: fully decompressed in memory, every member of a multi-member stream
//! - `deflate`: zlib-wrapped or raw DEFLATE, fully decompressed in memory
//! - absent / `identity`: bytes used verbatim
//! - anything else: bytes used verbatim and the encoding header is kept
//!
//! A body that fails to decode is an error for the whole request.

use std::io::Read;

use bytes::Bytes;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap};

use meiliproxy_core::Error;

/// Upstream response captured in memory.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// Upstream status code.
    pub status: StatusCode,
    /// End-to-end upstream headers. `Content-Encoding` is absent whenever the
    /// body was decoded here.
    pub headers: HeaderMap,
    /// Response body, decoded when the encoding was gzip or deflate.
    pub body: Bytes,
}

impl CapturedResponse {
    /// Only a 200 with a non-empty plain body may be stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && !self.body.is_empty() && !self.headers.contains_key(header::CONTENT_ENCODING)
    }
}

/// Decode `raw` according to a `Content-Encoding` value.
///
/// Returns the decoded bytes and whether the encoding was consumed.
pub fn decode_body(encoding: Option<&str>, raw: Bytes) -> Result<(Bytes, bool), Error> {
    let encoding = encoding.map(str::trim).unwrap_or_default();

    if encoding.eq_ignore_ascii_case("gzip") || encoding.eq_ignore_ascii_case("x-gzip") {
        tracing::debug!("decompressing gzip response body");
        let decoded =
            read_all(MultiGzDecoder::new(raw.as_ref())).map_err(|e| Error::Decompression(format!("gzip: {e}")))?;
        return Ok((decoded, true));
    }

    if encoding.eq_ignore_ascii_case("deflate") {
        tracing::debug!("decompressing deflate response body");
        let decoded = if has_zlib_header(&raw) {
            read_all(ZlibDecoder::new(raw.as_ref()))
        } else {
            read_all(DeflateDecoder::new(raw.as_ref()))
        }
        .map_err(|e| Error::Decompression(format!("deflate: {e}")))?;
        return Ok((decoded, true));
    }

    if encoding.is_empty() || encoding.eq_ignore_ascii_case("identity") {
        return Ok((raw, true));
    }

    tracing::debug!(encoding = %encoding, "using response body as is");
    Ok((raw, false))
}

fn read_all(mut reader: impl Read) -> std::io::Result<Bytes> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}

/// RFC 1950 header check: CM = 8 and the first two bytes are a multiple of 31.
fn has_zlib_header(raw: &[u8]) -> bool {
    match raw {
        [cmf, flg, ..] => cmf & 0x0f == 8 && ((u16::from(*cmf) << 8) | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}

/// Split a raw upstream response into a captured, decoded one.
pub(crate) fn normalize(status: StatusCode, mut headers: HeaderMap, raw: Bytes) -> Result<CapturedResponse, Error> {
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .map(|v| v.to_str().map(str::to_string))
        .transpose()
        .map_err(|e| Error::Decompression(format!("unreadable content-encoding: {e}")))?;

    let (body, consumed) = decode_body(encoding.as_deref(), raw)?;
    if consumed {
        headers.remove(header::CONTENT_ENCODING);
    }
    headers.remove(header::CONTENT_LENGTH);

    Ok(CapturedResponse { status, headers, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use reqwest::header::HeaderValue;
    use std::io::Write;

    const PAYLOAD: &[u8] = br#"{"hits":[{"id":1,"name":"shoe"}],"query":"shoe"}"#;

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    fn zlib(data: &[u8]) -> Bytes {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    fn raw_deflate(data: &[u8]) -> Bytes {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[test]
    fn test_decode_gzip() {
        let (body, consumed) = decode_body(Some("gzip"), gzip(PAYLOAD)).unwrap();
        assert!(consumed);
        assert_eq!(body.as_ref(), PAYLOAD);
    }

    #[test]
    fn test_decode_gzip_multiple_members() {
        let (head, tail) = PAYLOAD.split_at(PAYLOAD.len() / 2);
        let mut stream = gzip(head).to_vec();
        stream.extend_from_slice(&gzip(tail));

        let (body, consumed) = decode_body(Some("gzip"), Bytes::from(stream)).unwrap();
        assert!(consumed);
        assert_eq!(body.as_ref(), PAYLOAD);
    }

    #[test]
    fn test_decode_deflate_zlib_wrapped() {
        let (body, consumed) = decode_body(Some("deflate"), zlib(PAYLOAD)).unwrap();
        assert!(consumed);
        assert_eq!(body.as_ref(), PAYLOAD);
    }

    #[test]
    fn test_decode_deflate_raw() {
        let (body, consumed) = decode_body(Some("deflate"), raw_deflate(PAYLOAD)).unwrap();
        assert!(consumed);
        assert_eq!(body.as_ref(), PAYLOAD);
    }

    #[test]
    fn test_decode_identity_and_absent() {
        let (body, consumed) = decode_body(None, Bytes::from_static(PAYLOAD)).unwrap();
        assert!(consumed);
        assert_eq!(body.as_ref(), PAYLOAD);

        let (body, consumed) = decode_body(Some("identity"), Bytes::from_static(PAYLOAD)).unwrap();
        assert!(consumed);
        assert_eq!(body.as_ref(), PAYLOAD);
    }

    #[test]
    fn test_decode_unknown_encoding_is_verbatim() {
        let (body, consumed) = decode_body(Some("br"), Bytes::from_static(b"\x0b\x02\x80")).unwrap();
        assert!(!consumed);
        assert_eq!(body.as_ref(), b"\x0b\x02\x80");
    }

    #[test]
    fn test_decode_corrupt_gzip_fails() {
        let result = decode_body(Some("gzip"), Bytes::from_static(b"definitely not gzip"));
        assert!(matches!(result, Err(Error::Decompression(_))));
    }

    #[test]
    fn test_normalize_strips_encoding_after_decode() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let captured = normalize(StatusCode::OK, headers, gzip(PAYLOAD)).unwrap();

        assert!(!captured.headers.contains_key(header::CONTENT_ENCODING));
        assert!(!captured.headers.contains_key(header::CONTENT_LENGTH));
        assert_eq!(captured.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(captured.body.as_ref(), PAYLOAD);
        assert!(captured.is_cacheable());
    }

    #[test]
    fn test_cacheability() {
        let ok =
            CapturedResponse { status: StatusCode::OK, headers: HeaderMap::new(), body: Bytes::from_static(PAYLOAD) };
        assert!(ok.is_cacheable());

        let empty = CapturedResponse { body: Bytes::new(), ..ok.clone() };
        assert!(!empty.is_cacheable());

        let not_found = CapturedResponse { status: StatusCode::NOT_FOUND, ..ok.clone() };
        assert!(!not_found.is_cacheable());

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("br"));
        let still_encoded = CapturedResponse { headers, ..ok };
        assert!(!still_encoded.is_cacheable());
    }
}
