//! Binary blobs embedded in YAML as ASCII85 text
//!
//! The alphabet is `!`..=`u`, four bytes per five characters, with `z`
//! standing for a full group of zero bytes. No `<~ ~>` delimiters are written
//! and whitespace is ignored when decoding, so encoded text may be wrapped.

use crate::{PackageError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::ops::Deref;

const FIRST: u8 = b'!';
const LAST: u8 = b'u';
const ZERO_GROUP: u8 = b'z';

/// Encode bytes as ASCII85
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 3) / 4 * 5);

    for chunk in data.chunks(4) {
        let mut group = [0u8; 4];
        group[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(group);

        if value == 0 && chunk.len() == 4 {
            out.push(ZERO_GROUP as char);
            continue;
        }

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = FIRST + (value % 85) as u8;
            value /= 85;
        }

        // A partial group of n bytes keeps n + 1 digits
        for &digit in &digits[..chunk.len() + 1] {
            out.push(digit as char);
        }
    }

    out
}

/// Decode ASCII85 text produced by [`encode`]
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() / 5 * 4 + 4);
    let mut digits = [0u8; 5];
    let mut count = 0;

    for (position, byte) in text.bytes().enumerate() {
        match byte {
            b if b.is_ascii_whitespace() => continue,
            ZERO_GROUP if count == 0 => out.extend_from_slice(&[0; 4]),
            ZERO_GROUP => {
                return Err(PackageError::Encoding(format!(
                    "'z' inside a group at offset {}",
                    position
                )))
            }
            FIRST..=LAST => {
                digits[count] = byte - FIRST;
                count += 1;
                if count == 5 {
                    out.extend_from_slice(&group_value(&digits, position)?.to_be_bytes());
                    count = 0;
                }
            }
            _ => {
                return Err(PackageError::Encoding(format!(
                    "invalid character {:?} at offset {}",
                    byte as char, position
                )))
            }
        }
    }

    match count {
        0 => {}
        1 => {
            return Err(PackageError::Encoding(
                "dangling single character at end of input".to_string(),
            ))
        }
        n => {
            for digit in &mut digits[n..] {
                *digit = LAST - FIRST;
            }
            let bytes = group_value(&digits, text.len())?.to_be_bytes();
            out.extend_from_slice(&bytes[..n - 1]);
        }
    }

    Ok(out)
}

fn group_value(digits: &[u8; 5], position: usize) -> Result<u32> {
    let value = digits
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));

    u32::try_from(value).map_err(|_| {
        PackageError::Encoding(format!("group ending at offset {} overflows", position))
    })
}

/// File contents carried as ASCII85 text in a YAML document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmbeddedFileContents(Vec<u8>);

impl EmbeddedFileContents {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse encoded text
    pub fn from_text(text: &str) -> Result<Self> {
        decode(text).map(Self)
    }

    pub fn to_text(&self) -> String {
        encode(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for EmbeddedFileContents {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for EmbeddedFileContents {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for EmbeddedFileContents {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for EmbeddedFileContents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

/// Named files bundled into a manifest-like document (e.g. build context)
pub type EmbeddedFiles = BTreeMap<String, EmbeddedFileContents>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"", "")]
    #[case(b"\0\0\0\0", "z")]
    #[case(b"\0\0\0\0\0\0\0\0", "zz")]
    #[case(b"\0", "!!")]
    #[case(b"\xff\xff\xff\xff", "s8W-!")]
    #[case(b"Man ", "9jqo^")]
    #[case(b"sure.", "F*2M7/c")]
    fn test_encode_known_values(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(encode(input), expected);
        assert_eq!(decode(expected).unwrap(), input);
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        assert_eq!(decode(" 9jq\no^\t").unwrap(), b"Man ");
    }

    #[rstest]
    #[case("9jqo~")]
    #[case("9jqo^{")]
    #[case("9z")]
    #[case("9jqo^F")]
    #[case("uuuuu")]
    fn test_decode_rejects(#[case] input: &str) {
        assert!(matches!(decode(input), Err(PackageError::Encoding(_))));
    }

    #[test]
    fn test_all_ff_round_trip() {
        for len in 0..12 {
            let data = vec![0xffu8; len];
            assert_eq!(decode(&encode(&data)).unwrap(), data);
        }
    }

    #[test]
    fn test_embedded_files_yaml() {
        let mut files = EmbeddedFiles::new();
        files.insert(
            "Dockerfile".to_string(),
            EmbeddedFileContents::new(b"FROM scratch\n".to_vec()),
        );
        files.insert("empty".to_string(), EmbeddedFileContents::default());

        let yaml = serde_yaml::to_string(&files).unwrap();
        let back: EmbeddedFiles = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, files);
        assert_eq!(&*back["Dockerfile"], b"FROM scratch\n");
    }

    #[test]
    fn test_embedded_rejects_bad_text() {
        assert!(serde_yaml::from_str::<EmbeddedFileContents>("\"abc~\"").is_err());
    }
}
