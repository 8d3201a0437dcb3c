//! SecureCode 文本拼装与拆分
//!
//! `serialize(record) ∥ key_id(8 hex) ∥ tag(40 hex)`，总长 `82 + len(identifier)` 个字符。
//! 该文本由外部 QR 传输原样承载。

use crate::error::MalformedCode;
use crate::{is_upper_hex, split_at_chars};
use crate::key::KeyId;
use crate::record::{RECORD_FIXED_LEN, parse_length_prefix};
use std::fmt;

pub const KEY_ID_HEX_LEN: usize = 8;
pub const TAG_HEX_LEN: usize = 40;

/// SecureCode 中除商品标识以外的定长部分
pub const CODE_FIXED_LEN: usize = RECORD_FIXED_LEN + KEY_ID_HEX_LEN + TAG_HEX_LEN;

/// 完整的 SecureCode 文本
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecureCode(String);

impl SecureCode {
    pub fn assemble(serialized_record: &str, key_id: &KeyId, tag: &str) -> Self {
        Self(format!("{serialized_record}{key_id}{tag}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn parts(&self) -> Result<CodeParts<'_>, MalformedCode> {
        split(&self.0)
    }
}

impl fmt::Display for SecureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SecureCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<SecureCode> for String {
    fn from(code: SecureCode) -> Self {
        code.0
    }
}

/// 拆分后的 SecureCode 三段，均借用原文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeParts<'a> {
    pub serialized_record: &'a str,
    pub key_id: &'a str,
    pub tag: &'a str,
}

impl CodeParts<'_> {
    pub fn key_id(&self) -> Result<KeyId, MalformedCode> {
        self.key_id.parse()
    }
}

/// 按长度前缀拆分 SecureCode 文本
///
/// 只检查总长度与 key_id 的字符类别；记录字段由
/// [`DiscountRecord::deserialize`](crate::record::DiscountRecord::deserialize) 校验，
/// tag 由签名校验处理。
pub fn split(text: &str) -> Result<CodeParts<'_>, MalformedCode> {
    let len = text.chars().count();
    if len < CODE_FIXED_LEN {
        return Err(MalformedCode::TooShort {
            len,
            min: CODE_FIXED_LEN,
        });
    }

    let (prefix, _) = split_at_chars(text, 2).unwrap_or((text, ""));
    let identifier_len = parse_length_prefix(prefix)?;
    let expected = CODE_FIXED_LEN + identifier_len;
    if len != expected {
        return Err(MalformedCode::LengthMismatch {
            expected,
            actual: len,
        });
    }

    let (serialized_record, trailer) =
        split_at_chars(text, len - KEY_ID_HEX_LEN - TAG_HEX_LEN).unwrap_or((text, ""));
    let (key_id, tag) = split_at_chars(trailer, KEY_ID_HEX_LEN).unwrap_or((trailer, ""));

    if !is_upper_hex(key_id) {
        return Err(MalformedCode::KeyId(key_id.to_string()));
    }

    Ok(CodeParts {
        serialized_record,
        key_id,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1134534535434000454165181320040302ADD670A0655ACE8436279213C3C9166E7DCB0D9481D21C7DC671FD2556E";

    #[test]
    fn test_split_sample_code() {
        let parts = split(SAMPLE).unwrap();
        assert_eq!(
            parts.serialized_record,
            "1134534535434000454165181320040302ADD670A0655"
        );
        assert_eq!(parts.key_id, "ACE84362");
        assert_eq!(parts.tag, "79213C3C9166E7DCB0D9481D21C7DC671FD2556E");
        assert_eq!(parts.key_id().unwrap().to_string(), "ACE84362");
    }

    #[test]
    fn test_assemble_then_split() {
        let key_id: KeyId = "AAAAAAAA".parse().unwrap();
        let tag = "0".repeat(TAG_HEX_LEN);
        let code = SecureCode::assemble("1134534535434000454165181320040302ADD670A0655", &key_id, &tag);
        assert_eq!(code.as_str().len(), CODE_FIXED_LEN + 11);

        let parts = code.parts().unwrap();
        assert_eq!(parts.key_id, "AAAAAAAA");
        assert_eq!(parts.tag, tag);
    }

    #[test]
    fn test_split_rejects_bad_lengths() {
        assert!(matches!(
            split(&SAMPLE[..81]),
            Err(MalformedCode::TooShort { len: 81, min: 82 })
        ));
        assert!(matches!(
            split(&SAMPLE[..SAMPLE.len() - 1]),
            Err(MalformedCode::LengthMismatch {
                expected: 93,
                actual: 92
            })
        ));
        assert!(matches!(
            split(&format!("{SAMPLE}F")),
            Err(MalformedCode::LengthMismatch { .. })
        ));
        assert!(matches!(
            split(&format!("AB{}", &SAMPLE[2..])),
            Err(MalformedCode::LengthPrefix(_))
        ));
    }

    #[test]
    fn test_split_counts_identifier_characters() {
        let key_id: KeyId = "AAAAAAAA".parse().unwrap();
        let tag = "F".repeat(TAG_HEX_LEN);
        let record = "04café000099165164040040302ADD670A0655";
        let code = SecureCode::assemble(record, &key_id, &tag);
        assert_eq!(code.as_str().chars().count(), CODE_FIXED_LEN + 4);

        let parts = code.parts().unwrap();
        assert_eq!(parts.serialized_record, record);
        assert_eq!(parts.key_id, "AAAAAAAA");
        assert_eq!(parts.tag, tag);

        let spaced = SecureCode::assemble("11Tomato Soup0001501651640400E7DEEBB58B2D0534", &key_id, &tag);
        assert_eq!(spaced.parts().unwrap().key_id, "AAAAAAAA");
    }

    #[test]
    fn test_split_rejects_non_ascii_key_id() {
        let tampered = SAMPLE.replace("ACE84362", "ACE8436é");
        assert!(matches!(split(&tampered), Err(MalformedCode::KeyId(_))));
    }

    #[test]
    fn test_split_rejects_lowercase_key_id() {
        let tampered = SAMPLE.replace("ACE84362", "ace84362");
        assert!(matches!(split(&tampered), Err(MalformedCode::KeyId(_))));
    }
}
