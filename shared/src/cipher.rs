//! Symmetric block cipher for packet obfuscation.
//!
//! A TEA-style Feistel network over 64-bit blocks with a 128-bit key held as
//! four 32-bit words and the usual golden-ratio round constant. The default
//! strength is 32 cycles (64 Feistel rounds). `mangle` and `unmangle` are
//! exact inverses.
//!
//! Message contract: bodies are zero-padded up to the next multiple of the
//! block size before encryption and the pad count travels in the envelope,
//! never re-derived from block boundaries, so the receiver can trim the
//! original length exactly. The wire type byte is tagged with
//! [`ENCRYPTED_FLAG`] to tell encrypted from plaintext traffic. File
//! transfer messages are exempt.

use crate::error::NetError;
use crate::message::{MsgType, NetMessage, ENCRYPTED_FLAG};

pub const CIPHER_BLOCK: usize = 8;

const DELTA: u32 = 0x9E37_79B9;
const DEFAULT_CYCLES: u32 = 32;

#[derive(Debug, Clone)]
pub struct NetCipher {
    key: [u32; 4],
    cycles: u32,
}

impl NetCipher {
    pub fn new(key: [u32; 4]) -> Self {
        Self::with_cycles(key, DEFAULT_CYCLES)
    }

    /// Configurable strength; `cycles` is the number of full Feistel cycles
    /// (two rounds each).
    pub fn with_cycles(key: [u32; 4], cycles: u32) -> Self {
        NetCipher { key, cycles }
    }

    pub fn mangle(&self, block: [u8; CIPHER_BLOCK]) -> [u8; CIPHER_BLOCK] {
        let [k0, k1, k2, k3] = self.key;
        let mut v0 = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        let mut v1 = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
        let mut sum = 0u32;

        for _ in 0..self.cycles {
            sum = sum.wrapping_add(DELTA);
            v0 = v0.wrapping_add(
                ((v1 << 4).wrapping_add(k0)) ^ v1.wrapping_add(sum) ^ ((v1 >> 5).wrapping_add(k1)),
            );
            v1 = v1.wrapping_add(
                ((v0 << 4).wrapping_add(k2)) ^ v0.wrapping_add(sum) ^ ((v0 >> 5).wrapping_add(k3)),
            );
        }

        join_block(v0, v1)
    }

    pub fn unmangle(&self, block: [u8; CIPHER_BLOCK]) -> [u8; CIPHER_BLOCK] {
        let [k0, k1, k2, k3] = self.key;
        let mut v0 = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        let mut v1 = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
        let mut sum = DELTA.wrapping_mul(self.cycles);

        for _ in 0..self.cycles {
            v1 = v1.wrapping_sub(
                ((v0 << 4).wrapping_add(k2)) ^ v0.wrapping_add(sum) ^ ((v0 >> 5).wrapping_add(k3)),
            );
            v0 = v0.wrapping_sub(
                ((v1 << 4).wrapping_add(k0)) ^ v1.wrapping_add(sum) ^ ((v1 >> 5).wrapping_add(k1)),
            );
            sum = sum.wrapping_sub(DELTA);
        }

        join_block(v0, v1)
    }

    /// Pads and encrypts a message body in place, recording the pad count in
    /// the envelope and tagging the wire type.
    pub fn encrypt(&self, msg: &mut NetMessage) -> Result<(), NetError> {
        if msg.is_encrypted() {
            return Err(NetError::Malformed("message is already encrypted"));
        }
        if exempt_from_encryption(msg.raw_type()) {
            return Ok(());
        }

        let pad = (CIPHER_BLOCK - msg.body.len() % CIPHER_BLOCK) % CIPHER_BLOCK;
        msg.body.resize(msg.body.len() + pad, 0);
        for chunk in msg.body.chunks_exact_mut(CIPHER_BLOCK) {
            let mut block = [0u8; CIPHER_BLOCK];
            block.copy_from_slice(chunk);
            chunk.copy_from_slice(&self.mangle(block));
        }
        msg.padding = pad as u8;
        msg.msg_type |= ENCRYPTED_FLAG;
        Ok(())
    }

    /// Inverse of [`NetCipher::encrypt`]: unmangles each block and trims
    /// exactly the pad count carried by the envelope.
    pub fn decrypt(&self, msg: &mut NetMessage) -> Result<(), NetError> {
        if !msg.is_encrypted() {
            return Err(NetError::Malformed("message is not flagged as encrypted"));
        }
        if msg.body.len() % CIPHER_BLOCK != 0
            || msg.padding as usize >= CIPHER_BLOCK
            || msg.padding as usize > msg.body.len()
        {
            return Err(NetError::CipherBlock);
        }

        for chunk in msg.body.chunks_exact_mut(CIPHER_BLOCK) {
            let mut block = [0u8; CIPHER_BLOCK];
            block.copy_from_slice(chunk);
            chunk.copy_from_slice(&self.unmangle(block));
        }
        let trimmed = msg.body.len() - msg.padding as usize;
        msg.body.truncate(trimmed);
        msg.padding = 0;
        msg.msg_type &= !ENCRYPTED_FLAG;
        Ok(())
    }
}

/// File payloads travel in the clear; chunk bodies are large and already
/// opaque to the relay. Handshake traffic is exempt too: the join verdict
/// must be readable before a session key can be in use.
pub fn exempt_from_encryption(raw_type: u8) -> bool {
    raw_type == MsgType::File as u8
        || raw_type == MsgType::Join as u8
        || raw_type == MsgType::Accepted as u8
        || raw_type == MsgType::Rejected as u8
}

fn join_block(v0: u32, v1: u32) -> [u8; CIPHER_BLOCK] {
    let mut out = [0u8; CIPHER_BLOCK];
    out[..4].copy_from_slice(&v0.to_be_bytes());
    out[4..].copy_from_slice(&v1.to_be_bytes());
    out
}
