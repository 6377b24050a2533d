//! Canonical vault addresses.
//!
//! Ledger accounts are written in two shapes: the raw form `workchain:hex`
//! and the 48-character user-friendly form (base64 or base64url over
//! `flags | workchain | hash | crc16`). The flags byte only toggles
//! bounceable/non-bounceable and test-only delivery, so two strings name the
//! same account iff their `(workchain, hash)` pairs match. `VaultAddress`
//! keeps only that pair, which makes `==` and `Hash` canonical everywhere.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FRIENDLY_LEN: usize = 48;
const FRIENDLY_BYTES: usize = 36;
const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TEST_ONLY: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid workchain in {0}")]
    Workchain(String),

    #[error("account hash must be 32 bytes of hex: {0}")]
    Hash(String),

    #[error("user-friendly address must be 48 characters: {0}")]
    Length(String),

    #[error("invalid base64 in address {0}")]
    Base64(String),

    #[error("unknown address tag 0x{0:02x}")]
    Tag(u8),

    #[error("checksum mismatch in address {0}")]
    Checksum(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultAddress {
    workchain: i32,
    hash: [u8; 32],
}

impl VaultAddress {
    #[must_use]
    pub const fn new(workchain: i32, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    #[must_use]
    pub const fn workchain(&self) -> i32 {
        self.workchain
    }

    #[must_use]
    pub const fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Parses either address shape.
    ///
    /// # Errors
    /// Returns [`AddressError`] if the string is neither a raw nor a
    /// checksummed user-friendly address.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        match input.split_once(':') {
            Some((workchain, hash)) => Self::parse_raw(input, workchain, hash),
            None => Self::parse_friendly(input),
        }
    }

    fn parse_raw(input: &str, workchain: &str, hash: &str) -> Result<Self, AddressError> {
        let workchain: i32 = workchain
            .parse()
            .map_err(|_| AddressError::Workchain(input.to_string()))?;

        let bytes = hex::decode(hash).map_err(|_| AddressError::Hash(input.to_string()))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::Hash(input.to_string()))?;

        Ok(Self { workchain, hash })
    }

    fn parse_friendly(input: &str) -> Result<Self, AddressError> {
        if input.len() != FRIENDLY_LEN {
            return Err(AddressError::Length(input.to_string()));
        }

        let engine = if input.contains(['-', '_']) { &URL_SAFE } else { &STANDARD };
        let bytes = engine
            .decode(input)
            .map_err(|_| AddressError::Base64(input.to_string()))?;
        if bytes.len() != FRIENDLY_BYTES {
            return Err(AddressError::Length(input.to_string()));
        }

        let tag = bytes[0] & !TAG_TEST_ONLY;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(AddressError::Tag(bytes[0]));
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16(&bytes[..34]) != expected {
            return Err(AddressError::Checksum(input.to_string()));
        }

        let workchain = i32::from(i8::from_be_bytes([bytes[1]]));
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);

        Ok(Self { workchain, hash })
    }

    /// Raw `workchain:hex` form. This is the persisted representation.
    #[must_use]
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// Url-safe user-friendly form.
    ///
    /// Workchains outside the `i8` range only have a raw form; they are
    /// truncated here the same way the ledger truncates them.
    #[must_use]
    pub fn to_friendly(&self, bounceable: bool, test_only: bool) -> String {
        let mut bytes = Vec::with_capacity(FRIENDLY_BYTES);
        let mut tag = if bounceable { TAG_BOUNCEABLE } else { TAG_NON_BOUNCEABLE };
        if test_only {
            tag |= TAG_TEST_ONLY;
        }
        bytes.push(tag);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        bytes.push(self.workchain as i8 as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(bytes)
    }

    /// Stable 36-byte encoding used when signing messages.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..4].copy_from_slice(&self.workchain.to_be_bytes());
        out[4..].copy_from_slice(&self.hash);
        out
    }
}

impl fmt::Display for VaultAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

impl FromStr for VaultAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VaultAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VaultAddress> for String {
    fn from(value: VaultAddress) -> Self {
        value.to_raw()
    }
}

/// CRC-16/XMODEM (poly 0x1021, init 0).
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}
