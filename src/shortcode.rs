//! Short-code generation
//!
//! Codes are drawn from the thread-local CSPRNG and base64url-encoded, so
//! every character is uniform over `[A-Za-z0-9_-]` and codes cannot be
//! enumerated or predicted. Uniqueness is enforced by the store; see
//! [`crate::links::LinkService::create`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

pub const DEFAULT_CODE_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct ShortCodeGenerator {
    length: usize,
}

impl Default for ShortCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl ShortCodeGenerator {
    /// A generator for codes of `length` characters (at least one)
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Returns a fresh random code
    pub fn generate(&self) -> String {
        // 6 bits per base64 character
        let byte_len = (self.length * 6).div_ceil(8);
        let mut bytes = vec![0u8; byte_len];
        rand::rng().fill_bytes(&mut bytes);

        let mut code = URL_SAFE_NO_PAD.encode(&bytes);
        code.truncate(self.length);
        code
    }
}
