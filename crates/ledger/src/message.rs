//! Vault instruction encoding.
//!
//! A keeper message body is 16 bytes, big-endian:
//!
//! ```text
//! op: u32 | query_id: u64 | strategy_id: i32
//! ```

use anyhow::{bail, Result};
use std::fmt;

pub const BODY_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Rebalance,
    Exit,
}

impl OpCode {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Rebalance => 0x7262_6c6e, // "rbln"
            Self::Exit => 0x6578_6974,      // "exit"
        }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0x7262_6c6e => Some(Self::Rebalance),
            0x6578_6974 => Some(Self::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rebalance => f.write_str("rebalance"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultInstruction {
    pub op: OpCode,
    /// Echoed by the vault in its execution report.
    pub query_id: u64,
    pub strategy_id: i32,
}

impl VaultInstruction {
    #[must_use]
    pub const fn new(op: OpCode, query_id: u64, strategy_id: i32) -> Self {
        Self {
            op,
            query_id,
            strategy_id,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; BODY_LEN] {
        let mut body = [0u8; BODY_LEN];
        body[..4].copy_from_slice(&self.op.code().to_be_bytes());
        body[4..12].copy_from_slice(&self.query_id.to_be_bytes());
        body[12..].copy_from_slice(&self.strategy_id.to_be_bytes());
        body
    }

    /// # Errors
    /// Returns error if the body has the wrong length or an unknown opcode.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let body: &[u8; BODY_LEN] = match body.try_into() {
            Ok(body) => body,
            Err(_) => bail!("message body must be {BODY_LEN} bytes, got {}", body.len()),
        };

        let code = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let Some(op) = OpCode::from_code(code) else {
            bail!("unknown opcode 0x{code:08x}");
        };
        let mut query_id = [0u8; 8];
        query_id.copy_from_slice(&body[4..12]);
        let strategy_id = i32::from_be_bytes([body[12], body[13], body[14], body[15]]);

        Ok(Self {
            op,
            query_id: u64::from_be_bytes(query_id),
            strategy_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_ascii_tags() {
        assert_eq!(&OpCode::Rebalance.code().to_be_bytes(), b"rbln");
        assert_eq!(&OpCode::Exit.code().to_be_bytes(), b"exit");
    }

    #[test]
    fn test_encode_layout() {
        let body = VaultInstruction::new(OpCode::Rebalance, 5, -2).encode();
        assert_eq!(&body[..4], b"rbln");
        assert_eq!(&body[4..12], &5u64.to_be_bytes());
        assert_eq!(&body[12..], &(-2i32).to_be_bytes());
        assert_eq!(
            VaultInstruction::decode(&body).unwrap(),
            VaultInstruction::new(OpCode::Rebalance, 5, -2)
        );
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(VaultInstruction::decode(&[0u8; 15]).is_err());
        assert!(VaultInstruction::decode(&[0u8; 16]).is_err());
    }
}
