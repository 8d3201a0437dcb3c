//! 折扣记录定长编解码
//!
//! 记录文本布局（按字符计数，商品标识以外的字段均为 ASCII）：
//!
//! ```text
//! ll  bbbb...  pppppp  dddddddddd  nnnnnnnnnnnnnnnn
//! 2   ll       6       10          16
//! ```
//!
//! 依次为商品标识长度、商品标识、新价格（最小货币单位）、过期时间戳、nonce。
//! 商品标识可以是任意字符串（含空格与非 ASCII 字符），长度前缀为字符数。

use crate::error::{MalformedCode, RecordError};
use crate::{is_decimal, is_upper_hex, split_at_chars};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;

/// 商品标识最大长度（长度占两位十进制）
pub const MAX_IDENTIFIER_LEN: usize = 99;
pub const MAX_PRICE: u32 = 999_999;
pub const MAX_VALID_UNTIL: i64 = 9_999_999_999;

const PREFIX_LEN: usize = 2;
const PRICE_LEN: usize = 6;
const EXPIRY_LEN: usize = 10;
const NONCE_HEX_LEN: usize = 16;

/// 记录中除商品标识以外的定长部分
pub const RECORD_FIXED_LEN: usize = PREFIX_LEN + PRICE_LEN + EXPIRY_LEN + NONCE_HEX_LEN;

/// 单次折扣码的 64 位随机 nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nonce([u8; 8]);

impl Nonce {
    /// 从操作系统 CSPRNG 生成
    pub fn random() -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for Nonce {
    type Err = MalformedCode;

    /// 只接受 16 个大写十六进制字符
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NONCE_HEX_LEN || !is_upper_hex(s) {
            return Err(MalformedCode::Nonce(s.to_string()));
        }
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| MalformedCode::Nonce(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// 折扣记录，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountRecord {
    item_identifier: String,
    new_price: u32,
    valid_until: i64,
    nonce: Nonce,
}

impl DiscountRecord {
    /// 构造并校验记录
    ///
    /// # Errors
    /// - 商品标识为空或超过 99 个字符
    /// - 价格超过 999999
    /// - 过期时间为负或超过 10 位十进制
    pub fn new(
        item_identifier: impl Into<String>,
        new_price: u32,
        valid_until: i64,
        nonce: Nonce,
    ) -> Result<Self, RecordError> {
        let item_identifier = item_identifier.into();

        let identifier_len = item_identifier.chars().count();
        if identifier_len == 0 || identifier_len > MAX_IDENTIFIER_LEN {
            return Err(RecordError::IdentifierLength(identifier_len));
        }
        if new_price > MAX_PRICE {
            return Err(RecordError::PriceOutOfRange(new_price));
        }
        if !(0..=MAX_VALID_UNTIL).contains(&valid_until) {
            return Err(RecordError::ExpiryOutOfRange(valid_until));
        }

        Ok(Self {
            item_identifier,
            new_price,
            valid_until,
            nonce,
        })
    }

    pub fn item_identifier(&self) -> &str {
        &self.item_identifier
    }

    pub fn new_price(&self) -> u32 {
        self.new_price
    }

    pub fn valid_until(&self) -> i64 {
        self.valid_until
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// 序列化后的文本长度（字符数）
    pub fn serialized_len(&self) -> usize {
        RECORD_FIXED_LEN + self.item_identifier.chars().count()
    }

    /// 序列化为定长文本
    pub fn serialize(&self) -> String {
        format!(
            "{:02}{}{:06}{:010}{}",
            self.item_identifier.chars().count(),
            self.item_identifier,
            self.new_price,
            self.valid_until,
            self.nonce
        )
    }

    /// 从定长文本反序列化
    ///
    /// 除了长度检查外，还逐字段校验字符类别，任何不符合都返回对应的
    /// [`MalformedCode`] 变体。
    pub fn deserialize(text: &str) -> Result<Self, MalformedCode> {
        let len = text.chars().count();
        if len < RECORD_FIXED_LEN {
            return Err(MalformedCode::TooShort {
                len,
                min: RECORD_FIXED_LEN,
            });
        }

        let (prefix, rest) = split_fixed(text, PREFIX_LEN);
        let identifier_len = parse_length_prefix(prefix)?;

        let expected = RECORD_FIXED_LEN + identifier_len;
        if len != expected {
            return Err(MalformedCode::LengthMismatch {
                expected,
                actual: len,
            });
        }

        let (identifier, rest) = split_fixed(rest, identifier_len);
        let (price, rest) = split_fixed(rest, PRICE_LEN);
        let (expiry, nonce) = split_fixed(rest, EXPIRY_LEN);

        if identifier.is_empty() {
            return Err(MalformedCode::Identifier("empty identifier".to_string()));
        }
        if !is_decimal(price) {
            return Err(MalformedCode::Price(price.to_string()));
        }
        if !is_decimal(expiry) {
            return Err(MalformedCode::Expiry(expiry.to_string()));
        }

        let new_price = price
            .parse::<u32>()
            .map_err(|_| MalformedCode::Price(price.to_string()))?;
        let valid_until = expiry
            .parse::<i64>()
            .map_err(|_| MalformedCode::Expiry(expiry.to_string()))?;
        let nonce = nonce.parse::<Nonce>()?;

        Ok(Self {
            item_identifier: identifier.to_string(),
            new_price,
            valid_until,
            nonce,
        })
    }
}

/// 按字符数切分；调用方已校验总长度，字符不足时整体归入前半段
fn split_fixed(s: &str, n: usize) -> (&str, &str) {
    split_at_chars(s, n).unwrap_or((s, ""))
}

/// 解析两位十进制长度前缀
pub(crate) fn parse_length_prefix(prefix: &str) -> Result<usize, MalformedCode> {
    if prefix.len() != PREFIX_LEN || !is_decimal(prefix) {
        return Err(MalformedCode::LengthPrefix(prefix.to_string()));
    }
    prefix
        .parse::<usize>()
        .map_err(|_| MalformedCode::LengthPrefix(prefix.to_string()))
}
