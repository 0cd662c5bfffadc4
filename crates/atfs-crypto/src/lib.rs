//! atfs-crypto: per-file encryption for atfs
//!
//! Every user file becomes a self-describing `.at` container:
//!
//! ```text
//! File Encryption Key (per file: cipher id + hash id + random key/iv)
//!   ├── payload:  <cipher id> (AES | 2FISH | CAMLL | 3DES × ECB | CBC | CFB | OFB)
//!   ├── name:     AES-256-OFB, key/iv = HKDF-SHA256(key ‖ iv, "atfs-names")
//!   └── envelopes: RSA-OAEP(SHA-256), one per recipient (owner + grants)
//! Owner signature: RSA PKCS#1 v1.5 over <hash id>(name len ‖ name ‖ plaintext)
//! ```
//!
//! The owner's private key is stored PKCS#8-encoded, sealed with
//! XChaCha20-Poly1305 under an Argon2id key, and buried in a haystack of
//! random bytes.

pub mod container;
pub mod cursor;
pub mod descriptor;
pub mod fek;
pub mod hash;
pub mod haystack;
pub mod kdf;
pub mod keys;
pub mod names;
pub mod registry;
pub mod scrub;
pub mod vault;

#[cfg(test)]
pub(crate) mod test_support;

pub use container::{decrypt, encrypt, owner_id_of, EncryptedContainer, StandardInformation};
pub use descriptor::SecurityDescriptor;
pub use fek::Fek;
pub use hash::{describe_hash, resolve_hash, HashFamily, HashId};
pub use haystack::{conceal, password_digest, reveal, HaystackParams};
pub use kdf::{derive_vault_key, KdfParams, VaultKey};
pub use keys::KeyPair;
pub use names::{decrypt_name, encrypt_name, stored_name, EXTENSION};
pub use registry::{describe, resolve, resolve_with, Algorithm, CipherId, CipherSuite, Mode};
pub use scrub::Scrubbed;
pub use vault::{open_private_key, seal_private_key, VaultParams};

pub use rsa::{RsaPrivateKey, RsaPublicKey};
