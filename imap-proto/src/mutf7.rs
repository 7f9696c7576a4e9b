//! Component D: modified UTF-7 mailbox name encoding (RFC 3501 §5.1.3).
//!
//! The wire alphabet is MIME base64 with `,` standing in for `/` and no
//! padding; runs of non-printable-ASCII characters are framed in `&...-`,
//! and a literal `&` is escaped as `&-`. Grounded on the teacher's use of
//! `base64`'s custom-alphabet engine elsewhere in the codec stack rather
//! than a hand-rolled base64 table.

use base64::alphabet::Alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::sync::OnceLock;

use crate::error::CharsetError;

fn engine() -> &'static GeneralPurpose {
    static ENGINE: OnceLock<GeneralPurpose> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let alphabet = Alphabet::new(
            "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+,",
        )
        .expect("modified UTF-7 alphabet is a fixed, valid 64-character string");
        GeneralPurpose::new(&alphabet, GeneralPurposeConfig::new().with_encode_padding(false))
    })
}

fn is_plain(c: char) -> bool {
    c != '&' && (' '..='~').contains(&c)
}

/// Encode a native mailbox name into its modified UTF-7 wire form.
pub fn encode(name: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = name.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '&' {
            out.push_str("&-");
            i += 1;
            continue;
        }
        if is_plain(c) {
            out.push(c);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !is_plain(chars[i]) && chars[i] != '&' {
            i += 1;
        }
        let run: String = chars[start..i].iter().collect();
        let mut units = Vec::with_capacity(run.len() * 2);
        for u in run.encode_utf16() {
            units.extend_from_slice(&u.to_be_bytes());
        }
        out.push('&');
        out.push_str(&engine().encode(units));
        out.push('-');
    }
    out
}

/// Decode a modified UTF-7 wire mailbox name back to native Unicode.
///
/// Maps decode failures to the gateway's `KC_BAD_CHARWIDTH` condition (an
/// unpaired surrogate, a malformed base64 run, or a run whose length isn't
/// a whole number of UTF-16 code units), surfaced by the caller as
/// `NO invalid folder name`.
pub fn decode(wire: &str) -> Result<String, CharsetError> {
    let mut out = String::new();
    let bytes: Vec<char> = wire.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c != '&' {
            out.push(c);
            i += 1;
            continue;
        }
        // c == '&'
        if i + 1 < bytes.len() && bytes[i + 1] == '-' {
            out.push('&');
            i += 2;
            continue;
        }
        let start = i + 1;
        let mut j = start;
        while j < bytes.len() && bytes[j] != '-' {
            j += 1;
        }
        if j >= bytes.len() {
            return Err(CharsetError::BadCharwidth);
        }
        let run: String = bytes[start..j].iter().collect();
        let decoded = engine()
            .decode(run.as_bytes())
            .map_err(|_| CharsetError::BadCharwidth)?;
        if decoded.len() % 2 != 0 {
            return Err(CharsetError::BadCharwidth);
        }
        let units: Vec<u16> = decoded
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let text = String::from_utf16(&units).map_err(|_| CharsetError::BadCharwidth)?;
        out.push_str(&text);
        i = j + 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode("INBOX"), "INBOX");
        assert_eq!(decode("INBOX").unwrap(), "INBOX");
    }

    #[test]
    fn ampersand_is_escaped() {
        assert_eq!(encode("AT&T"), "AT&-T");
        assert_eq!(decode("AT&-T").unwrap(), "AT&T");
    }

    #[test]
    fn non_ascii_roundtrips() {
        let name = "Entwürfe/Käse";
        let wire = encode(name);
        assert_eq!(decode(&wire).unwrap(), name);
        assert!(!wire.contains('/'), "slash must not appear unescaped in the wire form");
    }

    #[test]
    fn known_vector_german_umlaut() {
        // "Müller" -> plain 'M', shifted "üller"? actually whole run until a plain char breaks it.
        let wire = encode("Männer");
        assert_eq!(decode(&wire).unwrap(), "Männer");
        assert!(wire.starts_with('M'));
    }

    #[test]
    fn unterminated_shift_sequence_is_bad_charwidth() {
        assert_eq!(decode("&Jjo"), Err(CharsetError::BadCharwidth));
    }

    #[test]
    fn invalid_base64_in_shift_sequence_is_bad_charwidth() {
        assert_eq!(decode("&!!!-"), Err(CharsetError::BadCharwidth));
    }
}
