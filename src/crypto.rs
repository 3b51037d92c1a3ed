//! The cryptographic building blocks used to garble (= encrypt/decrypt) gate
//! table rows: 128-bit wire labels, the row-key PRF and the two-block AES
//! encryption with its all-zero verification tag.

use std::fmt;
use std::ops::BitXor;

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::{CryptoRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Number of bytes in a wire label (128-bit security parameter).
pub const LABEL_SIZE: usize = 16;

/// Number of bytes in one encrypted truth-table row: label plus padding tag.
pub const ROW_SIZE: usize = 2 * LABEL_SIZE;

/// One encrypted row of a garbled gate table.
pub type RowCiphertext = [u8; ROW_SIZE];

/// Errors raised by the cryptographic primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The padding block recovered during decryption was not all-zero.
    BadPadding,
    /// A byte slice did not have the length of a wire label.
    InvalidLabelLength(usize),
    /// A hex string could not be decoded into a wire label.
    InvalidHex,
}

/// A 128-bit wire label, opaque except for byte-wise equality.
///
/// When point-and-permute is used, the least significant bit of the last byte
/// carries the permutation bit; no other structure is observable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WireLabel([u8; LABEL_SIZE]);

impl WireLabel {
    /// The all-zero label, passed as the absent second key of unary gates.
    pub const ZERO: Self = WireLabel([0; LABEL_SIZE]);

    /// Samples a uniformly random label from the given CSPRNG.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0; LABEL_SIZE];
        rng.fill_bytes(&mut bytes);
        WireLabel(bytes)
    }

    /// Samples a random label whose permutation bit is forced to `bit`.
    pub fn random_with_perm_bit<R: Rng + CryptoRng>(rng: &mut R, bit: bool) -> Self {
        let mut label = Self::random(rng);
        label.0[LABEL_SIZE - 1] = (label.0[LABEL_SIZE - 1] & !1) | bit as u8;
        label
    }

    /// The permutation bit: the least significant bit of the last byte.
    pub fn perm_bit(&self) -> bool {
        self.0[LABEL_SIZE - 1] & 1 == 1
    }

    /// The raw bytes of the label.
    pub fn as_bytes(&self) -> &[u8; LABEL_SIZE] {
        &self.0
    }

    /// Builds a label from its raw bytes.
    pub fn from_bytes(bytes: [u8; LABEL_SIZE]) -> Self {
        WireLabel(bytes)
    }

    /// Builds a label from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; LABEL_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidLabelLength(bytes.len()))?;
        Ok(WireLabel(bytes))
    }

    /// Lowercase hex encoding of the label.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a label from its 32-character hex encoding.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidHex)?;
        Self::from_slice(&bytes).map_err(|_| CryptoError::InvalidHex)
    }
}

impl BitXor for WireLabel {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        let mut bytes = self.0;
        for (b, r) in bytes.iter_mut().zip(rhs.0.iter()) {
            *b ^= r;
        }
        WireLabel(bytes)
    }
}

impl fmt::Debug for WireLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireLabel({})", self.to_hex())
    }
}

/// The row-key PRF: SHA-256 over `k1 || k2 || gate_id` (gate id big-endian).
///
/// Only the first [`LABEL_SIZE`] bytes are used as an AES key, but the full
/// digest is returned so callers decide the truncation.
pub(crate) fn prf(k1: &WireLabel, k2: &WireLabel, gate_id: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(k1.as_bytes());
    hasher.update(k2.as_bytes());
    hasher.update(gate_id.to_be_bytes());
    hasher.finalize().into()
}

/// Encrypts an output label into a table row under the two input labels.
///
/// The plaintext is `output_label || 0x00^16`; the key is the truncated PRF of
/// the input labels and gate id. The two blocks are encrypted independently
/// with AES-128, which is sound here because every row uses a fresh key.
pub fn encrypt_row(
    output_label: &WireLabel,
    k1: &WireLabel,
    k2: &WireLabel,
    gate_id: u32,
) -> RowCiphertext {
    let key = prf(k1, k2, gate_id);
    let cipher = Aes128::new(GenericArray::from_slice(&key[..LABEL_SIZE]));
    let mut row = [0; ROW_SIZE];
    row[..LABEL_SIZE].copy_from_slice(output_label.as_bytes());
    for chunk in row.chunks_exact_mut(LABEL_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    row
}

/// Decrypts a table row, returning the output label if the padding verifies.
///
/// The padding check is what lets the evaluator distinguish the one row
/// addressed to it; a wrong key pair fails with probability `1 - 2^-128`.
pub fn decrypt_row(
    row: &RowCiphertext,
    k1: &WireLabel,
    k2: &WireLabel,
    gate_id: u32,
) -> Result<WireLabel, CryptoError> {
    let key = prf(k1, k2, gate_id);
    let cipher = Aes128::new(GenericArray::from_slice(&key[..LABEL_SIZE]));
    let mut plaintext = *row;
    for chunk in plaintext.chunks_exact_mut(LABEL_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    if plaintext[LABEL_SIZE..] != [0; LABEL_SIZE] {
        return Err(CryptoError::BadPadding);
    }
    let mut label = [0; LABEL_SIZE];
    label.copy_from_slice(&plaintext[..LABEL_SIZE]);
    Ok(WireLabel::from_bytes(label))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn encrypt_decrypt() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let out = WireLabel::random(&mut rng);
        let k1 = WireLabel::random(&mut rng);
        let k2 = WireLabel::random(&mut rng);

        let row = encrypt_row(&out, &k1, &k2, 7);
        assert_eq!(decrypt_row(&row, &k1, &k2, 7), Ok(out));
    }

    #[test]
    fn wrong_key_fails_padding() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let out = WireLabel::random(&mut rng);
        let k1 = WireLabel::random(&mut rng);
        let k2 = WireLabel::random(&mut rng);
        let other = WireLabel::random(&mut rng);

        let row = encrypt_row(&out, &k1, &k2, 0);
        assert_eq!(decrypt_row(&row, &other, &k2, 0), Err(CryptoError::BadPadding));
        assert_eq!(decrypt_row(&row, &k1, &other, 0), Err(CryptoError::BadPadding));
        // A different gate id derives a different key as well.
        assert_eq!(decrypt_row(&row, &k1, &k2, 1), Err(CryptoError::BadPadding));
    }

    #[test]
    fn unary_rows_use_the_zero_label() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let out = WireLabel::random(&mut rng);
        let k1 = WireLabel::random(&mut rng);

        let row = encrypt_row(&out, &k1, &WireLabel::ZERO, 3);
        assert_eq!(decrypt_row(&row, &k1, &WireLabel::ZERO, 3), Ok(out));
    }

    #[test]
    fn perm_bit_is_forced() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        for _ in 0..32 {
            assert!(!WireLabel::random_with_perm_bit(&mut rng, false).perm_bit());
            assert!(WireLabel::random_with_perm_bit(&mut rng, true).perm_bit());
        }
    }

    #[test]
    fn xor_and_hex_roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let a = WireLabel::random(&mut rng);
        let b = WireLabel::random(&mut rng);
        assert_eq!(a ^ b ^ b, a);
        assert_eq!(a ^ WireLabel::ZERO, a);
        assert_eq!(WireLabel::from_hex(&a.to_hex()), Ok(a));
        assert!(WireLabel::from_hex("deadbeef").is_err());
    }
}
