use crate::error::{HlsError, Result};

/// An absolute byte range resolved from an `EXT-X-BYTERANGE` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.offset + self.length - 1
    }

    /// Offset the next byterange in the same segment stream should carry
    /// forward when it omits an explicit offset.
    pub fn next_fallback_offset(&self) -> u64 {
        self.offset + self.length
    }

    pub fn http_range_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.end())
    }
}

/// Convert a `L` or `L@O` byterange value to an absolute range, carrying
/// `fallback_offset` forward when no explicit offset is present.
///
/// Ground truth: `devine/core/manifests/hls.py::calculate_byte_range`.
pub fn calculate_byte_range(spec: &str, fallback_offset: u64) -> Result<ByteRange> {
    let spec = spec.trim().trim_matches('"');
    let parts: Vec<&str> = spec.split('@').collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(HlsError::MalformedRange(spec.to_string()));
    }

    let length: u64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| HlsError::MalformedRange(spec.to_string()))?;

    let offset = if parts.len() == 2 {
        parts[1]
            .trim()
            .parse()
            .map_err(|_| HlsError::MalformedRange(spec.to_string()))?
    } else {
        fallback_offset
    };

    Ok(ByteRange { offset, length })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_offset() {
        let r = calculate_byte_range("100@0", 999).unwrap();
        assert_eq!(r.offset, 0);
        assert_eq!(r.end(), 99);
    }

    #[test]
    fn carried_offset() {
        let r = calculate_byte_range("200", 100).unwrap();
        assert_eq!(r.offset, 100);
        assert_eq!(r.end(), 299);
    }

    #[test]
    fn carry_chain_matches_scenario_s3() {
        let r1 = calculate_byte_range("100@0", 0).unwrap();
        assert_eq!((r1.offset, r1.end()), (0, 99));
        let r2 = calculate_byte_range("200", r1.next_fallback_offset()).unwrap();
        assert_eq!((r2.offset, r2.end()), (100, 299));
        let r3 = calculate_byte_range("50@500", r2.next_fallback_offset()).unwrap();
        assert_eq!((r3.offset, r3.end()), (500, 549));
    }

    #[test]
    fn rejects_non_integer_tokens() {
        assert!(calculate_byte_range("abc@0", 0).is_err());
        assert!(calculate_byte_range("100@xyz", 0).is_err());
    }

    #[test]
    fn rejects_too_many_tokens() {
        assert!(calculate_byte_range("1@2@3", 0).is_err());
    }

    #[test]
    fn http_range_header_format() {
        let r = ByteRange { offset: 10, length: 5 };
        assert_eq!(r.http_range_header(), "bytes=10-14");
    }
}
