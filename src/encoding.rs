//! Author/log decoding per `spec.md` section 6: a configurable charset,
//! defaulting to Latin-1, with fallback to UTF-8 decoding when the
//! configured charset can't make sense of a byte sequence.

use encoding_rs::Encoding;

/// A resolved decoder for the bytes RCS stores as an author name or log
/// message. Cheap to clone: the underlying `&'static Encoding` is a
/// reference to a static table, not an allocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Decoder {
    encoding: &'static Encoding,
}

impl Decoder {
    /// Resolves a `--encoding` value (a WHATWG encoding label, e.g.
    /// `latin1`, `utf-8`, `shift_jis`) to a decoder.
    pub(crate) fn new(label: &str) -> anyhow::Result<Self> {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| anyhow::anyhow!("unknown encoding {:?}", label))?;
        Ok(Self { encoding })
    }

    /// Decodes `bytes` under the configured encoding. If that produces
    /// replacement characters (the encoding couldn't represent some byte
    /// sequence), the bytes are re-decoded as UTF-8 instead — strict if
    /// possible, lossy otherwise — on the theory that a file whose commits
    /// don't match the repository-wide default encoding is more likely to
    /// be storing UTF-8 than garbage.
    pub(crate) fn decode(&self, bytes: &[u8]) -> String {
        let (decoded, _, had_errors) = self.encoding.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }

        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_decodes_high_bytes_without_fallback() {
        let decoder = Decoder::new("latin1").unwrap();
        // 0xE9 is e-acute in Latin-1/Windows-1252, but not valid UTF-8 on
        // its own; a lossy UTF-8 decode would turn it into U+FFFD.
        assert_eq!(decoder.decode(&[b'r', 0xE9, b's', b'u', b'm', b'e']), "r\u{e9}sume");
    }

    #[test]
    fn test_utf8_label_prefers_strict_utf8() {
        let decoder = Decoder::new("utf-8").unwrap();
        assert_eq!(decoder.decode("café".as_bytes()), "café");
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        assert!(Decoder::new("not-a-real-encoding").is_err());
    }
}
