use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{Result, safe_bincode::GetSize};

fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A mockup secret key.
///
/// # Security
/// Mockup keys protect nothing. They only bind ciphertexts to the context that can decrypt
/// them.
pub struct SecretKey {
    secret: u64,
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl GetSize<()> for SecretKey {
    fn get_size(_params: &()) -> usize {
        size_of::<u64>()
    }

    fn check_is_valid(&self, _params: &()) -> Result<()> {
        Ok(())
    }
}

impl SecretKey {
    /// Generate a fresh [`SecretKey`].
    pub fn generate() -> Self {
        Self {
            secret: rand::random(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// A mockup public key, derived from a [`SecretKey`].
pub struct PublicKey {
    fingerprint: u64,
}

impl GetSize<()> for PublicKey {
    fn get_size(_params: &()) -> usize {
        size_of::<u64>()
    }

    fn check_is_valid(&self, _params: &()) -> Result<()> {
        Ok(())
    }
}

impl PublicKey {
    /// Generate the public key belonging to `sk`.
    pub fn generate(sk: &SecretKey) -> Self {
        Self {
            fingerprint: mix(sk.secret),
        }
    }

    /// Identifies this key in the ciphertexts encrypted under it.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Whether `sk` is the secret key this public key was generated from.
    pub fn matches(&self, sk: &SecretKey) -> bool {
        mix(sk.secret) == self.fingerprint
    }
}
