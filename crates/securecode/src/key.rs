//! 对称密钥加载、生成与查找
//!
//! 持久化布局：每个密钥一个文件 `{KEYID}.key`，内容恰好 36 字节：
//! 4 字节 key_id 后跟 32 字节 secret。

use crate::error::{KeyError, KeyResult, MalformedCode};
use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

pub const KEY_ID_LEN: usize = 4;
pub const SECRET_LEN: usize = 32;
pub const KEY_FILE_LEN: usize = KEY_ID_LEN + SECRET_LEN;
pub const KEY_FILE_EXTENSION: &str = "key";

/// 4 字节密钥标识，文本形式为 8 个大写十六进制字符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    pub fn from_bytes(bytes: [u8; KEY_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        &self.0
    }

    /// 对应的密钥文件名，例如 `AAAAAAAA.key`
    pub fn file_name(&self) -> String {
        format!("{self}.{KEY_FILE_EXTENSION}")
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for KeyId {
    type Err = MalformedCode;

    /// 输入大小写均可，显示时总是大写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != KEY_ID_LEN * 2 {
            return Err(MalformedCode::KeyId(s.to_string()));
        }
        let mut bytes = [0u8; KEY_ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| MalformedCode::KeyId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// 32 字节共享密钥
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// 显式的密钥上下文，每次签名 / 校验都传入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    key_id: KeyId,
    secret: Secret,
}

impl SigningKey {
    pub fn new(key_id: KeyId, secret: Secret) -> Self {
        Self { key_id, secret }
    }

    /// 使用操作系统 CSPRNG 生成新的 key_id 与 secret
    pub fn generate() -> Self {
        let mut key_id = [0u8; KEY_ID_LEN];
        let mut secret = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut key_id);
        OsRng.fill_bytes(&mut secret);
        Self::new(KeyId(key_id), Secret(secret))
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// 密钥文件内容：key_id ∥ secret
    pub fn to_bytes(&self) -> [u8; KEY_FILE_LEN] {
        let mut out = [0u8; KEY_FILE_LEN];
        out[..KEY_ID_LEN].copy_from_slice(&self.key_id.0);
        out[KEY_ID_LEN..].copy_from_slice(&self.secret.0);
        out
    }
}

/// 解析 36 字节密钥文件内容
pub fn load_key(bytes: &[u8]) -> KeyResult<SigningKey> {
    if bytes.len() != KEY_FILE_LEN {
        return Err(KeyError::InvalidKeyFile(format!(
            "expected {KEY_FILE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let mut key_id = [0u8; KEY_ID_LEN];
    let mut secret = [0u8; SECRET_LEN];
    key_id.copy_from_slice(&bytes[..KEY_ID_LEN]);
    secret.copy_from_slice(&bytes[KEY_ID_LEN..]);
    Ok(SigningKey::new(KeyId(key_id), Secret(secret)))
}

/// 从文件加载密钥
///
/// 文件名（去掉扩展名）必须是内容中嵌入的 key_id，否则返回
/// [`KeyError::InvalidKeyFile`]。
pub async fn load_key_file(path: impl AsRef<Path>) -> KeyResult<SigningKey> {
    let path = path.as_ref();
    trace!("Loading key file: {}", path.display());
    let bytes = tokio::fs::read(path).await?;
    let key = load_key(&bytes)?;

    let named = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<KeyId>().ok());
    if named != Some(*key.key_id()) {
        return Err(KeyError::InvalidKeyFile(format!(
            "{} embeds key_id {}",
            path.display(),
            key.key_id()
        )));
    }
    Ok(key)
}

/// 按 key_id 查找密钥的抽象接口
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// # Returns
    /// * `Ok(key)` - 找到密钥
    /// * `Err(KeyError::UnknownKey)` - 密钥不存在
    /// * `Err(...)` - 密钥文件损坏或读取失败
    async fn get_key(&self, key_id: &KeyId) -> KeyResult<SigningKey>;
}

/// 基于目录的密钥存储，每个密钥一个文件
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self, key_id: &KeyId) -> PathBuf {
        self.dir.join(key_id.file_name())
    }

    /// 生成新密钥并写入 `{KEYID}.key`，已存在同名文件时拒绝覆盖
    pub async fn generate(&self) -> KeyResult<SigningKey> {
        let key = SigningKey::generate();
        self.store(&key).await?;
        Ok(key)
    }

    /// 写入已有密钥
    pub async fn store(&self, key: &SigningKey) -> KeyResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.key_path(key.key_id());

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = match options.open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(KeyError::AlreadyExists(*key.key_id()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&key.to_bytes()).await?;
        file.flush().await?;

        info!("Created key file: {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get_key(&self, key_id: &KeyId) -> KeyResult<SigningKey> {
        match load_key_file(self.key_path(key_id)).await {
            Err(KeyError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No key file for key_id: {}", key_id);
                Err(KeyError::UnknownKey(*key_id))
            }
            result => result,
        }
    }
}

/// 内存密钥存储（测试与嵌入使用）
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<KeyId, SigningKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: SigningKey) {
        self.keys.write().await.insert(*key.key_id(), key);
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_key(&self, key_id: &KeyId) -> KeyResult<SigningKey> {
        self.keys
            .read()
            .await
            .get(key_id)
            .cloned()
            .ok_or(KeyError::UnknownKey(*key_id))
    }
}
