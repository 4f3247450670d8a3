//! Keyed encoding of values bound to a cookie name.
//!
//! A [`SecureCookie`] authenticates a value with HMAC-SHA256 and, when given a
//! block key, encrypts it with AES in CBC mode before authenticating it. The
//! encoded form embeds the time of encoding so that stale values can be
//! rejected:
//!
//! ```text
//! base64url(timestamp "|" base64url([iv] value) "|" mac)
//! ```
//!
//! The MAC covers the cookie name as well, so a value issued for one cookie
//! never decodes under another.
//!
//! [`Codecs`] holds an ordered list of these so keys can be rotated: values
//! are always encoded with the first codec, and decoding tries each codec in
//! turn.
use std::fmt::{self, Debug};

use aes::{
    cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    Aes128, Aes192, Aes256,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const IV_SIZE: usize = 16;

/// Maximum length of an encoded value, matching what browsers accept for a
/// single cookie.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// How long an encoded value stays valid by default.
pub const DEFAULT_MAX_AGE: Duration = Duration::days(30);

/// Errors produced while encoding or decoding values.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The hash key was empty.
    #[error("hash key is not set")]
    HashKeyNotSet,

    /// The block key was not 16, 24 or 32 bytes long.
    #[error("invalid block key length: {0}")]
    InvalidBlockKey(usize),

    /// The value is longer than the configured maximum.
    #[error("the value is too long")]
    ValueTooLong,

    /// The value was not valid base64.
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    /// The decoded value did not have three `|`-separated parts.
    #[error("the value is not valid")]
    InvalidFormat,

    /// The MAC did not match; the value was tampered with or issued under
    /// different keys or a different name.
    #[error("the value is not valid")]
    InvalidMac,

    /// The embedded timestamp could not be parsed.
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// The value was issued more recently than the configured minimum age.
    #[error("timestamp is too new")]
    TimestampTooNew,

    /// The value is older than the configured maximum age.
    #[error("expired timestamp")]
    TimestampExpired,

    /// The ciphertext could not be decrypted.
    #[error("the value could not be decrypted")]
    Decryption,

    /// A variant to map `rmp_serde` encode errors.
    #[error(transparent)]
    Serialize(#[from] rmp_serde::encode::Error),

    /// A variant to map `rmp_serde` decode errors.
    #[error(transparent)]
    Deserialize(#[from] rmp_serde::decode::Error),

    /// No codecs were configured.
    #[error("no codecs were provided")]
    NoCodecs,
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Authenticates and optionally encrypts values bound to a name.
///
/// # Examples
///
/// ```rust
/// use tower_sealed_sessions_core::codec::SecureCookie;
///
/// let codec = SecureCookie::new(b"a very secret hash key", Some(&[7u8; 32][..])).unwrap();
/// let encoded = codec.encode("session", b"hello").unwrap();
/// assert_eq!(codec.decode("session", &encoded).unwrap(), b"hello");
/// assert!(codec.decode("other", &encoded).is_err());
/// ```
#[derive(Clone)]
pub struct SecureCookie {
    hash_key: Zeroizing<Vec<u8>>,
    block_key: Option<Zeroizing<Vec<u8>>>,
    max_age: Option<Duration>,
    min_age: Option<Duration>,
    max_length: usize,
}

impl Debug for SecureCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCookie")
            .field("hash_key", &"[redacted]")
            .field("encrypted", &self.block_key.is_some())
            .field("max_age", &self.max_age)
            .field("min_age", &self.min_age)
            .field("max_length", &self.max_length)
            .finish()
    }
}

impl SecureCookie {
    /// Create a codec from a hash key and an optional block key.
    ///
    /// The hash key authenticates values and should be 32 or 64 random
    /// bytes. The block key, when present, must be 16, 24 or 32 bytes and
    /// selects AES-128, AES-192 or AES-256.
    pub fn new(hash_key: &[u8], block_key: Option<&[u8]>) -> Result<Self> {
        if hash_key.is_empty() {
            return Err(Error::HashKeyNotSet);
        }

        if let Some(block_key) = block_key {
            if !matches!(block_key.len(), 16 | 24 | 32) {
                return Err(Error::InvalidBlockKey(block_key.len()));
            }
        }

        Ok(Self {
            hash_key: Zeroizing::new(hash_key.to_vec()),
            block_key: block_key.map(|key| Zeroizing::new(key.to_vec())),
            max_age: Some(DEFAULT_MAX_AGE),
            min_age: None,
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    /// Sets the maximum age of decodable values. `None` disables the check.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sets the minimum age of decodable values. `None` disables the check.
    pub fn with_min_age(mut self, min_age: Option<Duration>) -> Self {
        self.min_age = min_age;
        self
    }

    /// Sets the maximum length of encoded values. `0` disables the check.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Encode `value` for the cookie called `name`.
    pub fn encode(&self, name: &str, value: &[u8]) -> Result<String> {
        let value = match &self.block_key {
            Some(block_key) => encrypt(block_key, value)?,
            None => value.to_vec(),
        };
        let value = URL_SAFE_NO_PAD.encode(value);

        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let mac = self.mac(name, timestamp, &value)?.finalize().into_bytes();

        let mut payload = format!("{timestamp}|{value}|").into_bytes();
        payload.extend_from_slice(&mac);

        let encoded = URL_SAFE_NO_PAD.encode(payload);
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(Error::ValueTooLong);
        }

        Ok(encoded)
    }

    /// Decode a value previously produced by [`encode`](Self::encode) for the
    /// same `name`.
    pub fn decode(&self, name: &str, value: &str) -> Result<Vec<u8>> {
        if self.max_length != 0 && value.len() > self.max_length {
            return Err(Error::ValueTooLong);
        }

        let payload = URL_SAFE_NO_PAD.decode(value)?;
        let mut parts = payload.splitn(3, |byte| *byte == b'|');
        let (Some(timestamp), Some(value), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidFormat);
        };

        let timestamp = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|timestamp| timestamp.parse::<i64>().ok())
            .ok_or(Error::InvalidTimestamp)?;
        let value = std::str::from_utf8(value).map_err(|_| Error::InvalidFormat)?;

        self.mac(name, timestamp, value)?
            .verify_slice(mac)
            .map_err(|_| Error::InvalidMac)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Some(min_age) = self.min_age {
            if timestamp > now - min_age.whole_seconds() {
                return Err(Error::TimestampTooNew);
            }
        }
        if let Some(max_age) = self.max_age {
            if timestamp < now - max_age.whole_seconds() {
                return Err(Error::TimestampExpired);
            }
        }

        let value = URL_SAFE_NO_PAD.decode(value)?;
        match &self.block_key {
            Some(block_key) => decrypt(block_key, &value),
            None => Ok(value),
        }
    }

    fn mac(&self, name: &str, timestamp: i64, value: &str) -> Result<HmacSha256> {
        let mut mac =
            HmacSha256::new_from_slice(&self.hash_key).map_err(|_| Error::HashKeyNotSet)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b"|");
        mac.update(value.as_bytes());
        Ok(mac)
    }
}

fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let iv: [u8; IV_SIZE] = rand::random();

    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map(|cipher| cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, &iv)
            .map(|cipher| cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
            .map(|cipher| cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        len => return Err(Error::InvalidBlockKey(len)),
    }
    .map_err(|_| Error::InvalidBlockKey(key.len()))?;

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < IV_SIZE {
        return Err(Error::Decryption);
    }
    let (iv, ciphertext) = data.split_at(IV_SIZE);

    match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| Error::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| Error::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| Error::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        len => return Err(Error::InvalidBlockKey(len)),
    }
    .map_err(|_| Error::Decryption)
}

/// An ordered set of [`SecureCookie`] codecs supporting key rotation.
///
/// # Examples
///
/// ```rust
/// use tower_sealed_sessions_core::codec::Codecs;
///
/// let old = Codecs::from_key_pairs(&[b"old hash key".as_slice()]).unwrap();
/// let encoded = old.encode("session", &"some id").unwrap();
///
/// // The new key comes first, the old one is kept around for decoding.
/// let rotated =
///     Codecs::from_key_pairs(&[b"new hash key".as_slice(), &[1u8; 32], b"old hash key"]).unwrap();
/// let decoded: String = rotated.decode("session", &encoded).unwrap();
/// assert_eq!(decoded, "some id");
/// ```
#[derive(Clone, Debug)]
pub struct Codecs {
    codecs: Vec<SecureCookie>,
}

impl Codecs {
    /// Create a set holding a single codec.
    pub fn new(codec: SecureCookie) -> Self {
        Self {
            codecs: vec![codec],
        }
    }

    /// Build codecs from key pairs laid out as `hash, block, hash, block, ...`.
    ///
    /// The final hash key may be given without a block key, in which case
    /// that codec only authenticates.
    pub fn from_key_pairs<K: AsRef<[u8]>>(key_pairs: &[K]) -> Result<Self> {
        let codecs = key_pairs
            .chunks(2)
            .map(|pair| {
                let hash_key = pair[0].as_ref();
                let block_key = pair.get(1).map(AsRef::as_ref);
                SecureCookie::new(hash_key, block_key)
            })
            .collect::<Result<Vec<_>>>()?;

        if codecs.is_empty() {
            return Err(Error::NoCodecs);
        }

        Ok(Self { codecs })
    }

    /// Append a codec used only when the earlier ones fail to decode.
    pub fn with_codec(mut self, codec: SecureCookie) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Apply a maximum age to every codec.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.codecs = self
            .codecs
            .into_iter()
            .map(|codec| codec.with_max_age(max_age))
            .collect();
        self
    }

    /// Serialize `value` and encode it with the first codec.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String> {
        let codec = self.codecs.first().ok_or(Error::NoCodecs)?;
        let bytes = rmp_serde::to_vec(value)?;
        codec.encode(name, &bytes)
    }

    /// Decode with each codec in turn and deserialize the first success.
    ///
    /// When every codec fails, the error from the first (current) codec is
    /// returned.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, value: &str) -> Result<T> {
        let mut first_err = None;
        for codec in &self.codecs {
            match codec.decode(name, value) {
                Ok(bytes) => return Ok(rmp_serde::from_slice(&bytes)?),
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        Err(first_err.unwrap_or(Error::NoCodecs))
    }
}
