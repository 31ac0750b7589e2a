//! Cryptographic codecs owned by the bot: Keccak-256 and the secp256k1
//! signing flow.

pub mod keccak;
pub mod secp256k1;
