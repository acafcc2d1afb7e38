//! Signed container codec.
//!
//! [`reader`] recovers the archive from whatever the endpoints served;
//! [`writer`] builds and signs new containers.

pub mod reader;
pub mod writer;

/// Offset of the first ZIP local-file signature at or after `from`.
pub(crate) fn find_zip_signature(bytes: &[u8], from: usize) -> Option<usize> {
    let haystack = bytes.get(from..)?;
    haystack
        .windows(crxkit_schema::ZIP_MAGIC.len())
        .position(|w| w == crxkit_schema::ZIP_MAGIC)
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_signature_from_offset() {
        let bytes = b"xxPK\x03\x04yyPK\x03\x04";
        assert_eq!(find_zip_signature(bytes, 0), Some(2));
        assert_eq!(find_zip_signature(bytes, 3), Some(8));
        assert_eq!(find_zip_signature(bytes, 9), None);
        assert_eq!(find_zip_signature(bytes, 100), None);
    }
}
