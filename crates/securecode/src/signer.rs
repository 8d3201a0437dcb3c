//! HMAC-SHA1 标签计算与校验

use crate::code::TAG_HEX_LEN;
use crate::is_upper_hex;
use crate::key::Secret;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

fn mac_over(serialized_record: &str, secret: &Secret) -> HmacSha1 {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(serialized_record.as_bytes());
    mac
}

/// 计算标签，返回 40 个大写十六进制字符
pub fn sign(serialized_record: &str, secret: &Secret) -> String {
    hex::encode_upper(mac_over(serialized_record, secret).finalize().into_bytes())
}

/// 常数时间校验标签
///
/// 标签必须恰好是 40 个大写十六进制字符，否则直接返回 false。
pub fn verify(serialized_record: &str, secret: &Secret, tag: &str) -> bool {
    if tag.len() != TAG_HEX_LEN || !is_upper_hex(tag) {
        return false;
    }
    let Ok(presented) = hex::decode(tag) else {
        return false;
    };
    mac_over(serialized_record, secret)
        .verify_slice(&presented)
        .is_ok()
}
