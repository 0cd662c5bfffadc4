//! Hash registry and RSA PKCS#1 v1.5 signatures over the selected digest
//!
//! Hash identifiers are at most 10 characters. The digest family (MD5, SHA1,
//! SHA256, SHA384, SHA512) and the signature family (MD2, MD4, SHA-224,
//! RIPEMD-*) can both sign a file; the family is kept as metadata.

use atfs_core::{AtfsError, AtfsResult};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Digest;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFamily {
    Digest,
    Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashId {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md2,
    Md4,
    Sha224,
    Ripemd128,
    Ripemd160,
    Ripemd256,
}

impl HashId {
    /// Longest identifier accepted.
    pub const MAX_LEN: usize = 10;

    pub const ALL: [HashId; 11] = [
        HashId::Md5,
        HashId::Sha1,
        HashId::Sha256,
        HashId::Sha384,
        HashId::Sha512,
        HashId::Md2,
        HashId::Md4,
        HashId::Sha224,
        HashId::Ripemd128,
        HashId::Ripemd160,
        HashId::Ripemd256,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HashId::Md5 => "MD5",
            HashId::Sha1 => "SHA1",
            HashId::Sha256 => "SHA256",
            HashId::Sha384 => "SHA384",
            HashId::Sha512 => "SHA512",
            HashId::Md2 => "MD2",
            HashId::Md4 => "MD4",
            HashId::Sha224 => "SHA-224",
            HashId::Ripemd128 => "RIPEMD-128",
            HashId::Ripemd160 => "RIPEMD-160",
            HashId::Ripemd256 => "RIPEMD-256",
        }
    }

    pub fn parse(s: &str) -> AtfsResult<Self> {
        if s.is_empty() || s.len() > Self::MAX_LEN || !s.is_ascii() {
            return Err(AtfsError::MalformedIdentifier(s.to_string()));
        }
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|h| h.name() == upper)
            .ok_or_else(|| AtfsError::UnsupportedHash(s.to_string()))
    }

    pub fn family(self) -> HashFamily {
        match self {
            HashId::Md5 | HashId::Sha1 | HashId::Sha256 | HashId::Sha384 | HashId::Sha512 => {
                HashFamily::Digest
            }
            _ => HashFamily::Signature,
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            HashId::Md2 | HashId::Md4 | HashId::Md5 | HashId::Ripemd128 => 16,
            HashId::Sha1 | HashId::Ripemd160 => 20,
            HashId::Sha224 => 28,
            HashId::Sha256 | HashId::Ripemd256 => 32,
            HashId::Sha384 => 48,
            HashId::Sha512 => 64,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashId::Md5 => md5::Md5::digest(data).to_vec(),
            HashId::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashId::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashId::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashId::Sha512 => sha2::Sha512::digest(data).to_vec(),
            HashId::Md2 => md2::Md2::digest(data).to_vec(),
            HashId::Md4 => md4::Md4::digest(data).to_vec(),
            HashId::Sha224 => sha2::Sha224::digest(data).to_vec(),
            HashId::Ripemd128 => ripemd::Ripemd128::digest(data).to_vec(),
            HashId::Ripemd160 => ripemd::Ripemd160::digest(data).to_vec(),
            HashId::Ripemd256 => ripemd::Ripemd256::digest(data).to_vec(),
        }
    }

    /// DER `DigestInfo` header preceding the digest in a PKCS#1 v1.5 signature.
    fn digest_info_prefix(self) -> &'static [u8] {
        match self {
            HashId::Md2 => &[
                0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x02,
                0x05, 0x00, 0x04, 0x10,
            ],
            HashId::Md4 => &[
                0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x04,
                0x05, 0x00, 0x04, 0x10,
            ],
            HashId::Md5 => &[
                0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05,
                0x05, 0x00, 0x04, 0x10,
            ],
            HashId::Sha1 => &[
                0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04,
                0x14,
            ],
            HashId::Sha224 => &[
                0x30, 0x2d, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x04, 0x05, 0x00, 0x04, 0x1c,
            ],
            HashId::Sha256 => &[
                0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x01, 0x05, 0x00, 0x04, 0x20,
            ],
            HashId::Sha384 => &[
                0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x02, 0x05, 0x00, 0x04, 0x30,
            ],
            HashId::Sha512 => &[
                0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x03, 0x05, 0x00, 0x04, 0x40,
            ],
            HashId::Ripemd128 => &[
                0x30, 0x1d, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x24, 0x03, 0x02, 0x02, 0x05, 0x00, 0x04,
                0x10,
            ],
            HashId::Ripemd160 => &[
                0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x24, 0x03, 0x02, 0x01, 0x05, 0x00, 0x04,
                0x14,
            ],
            HashId::Ripemd256 => &[
                0x30, 0x2d, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x24, 0x03, 0x02, 0x03, 0x05, 0x00, 0x04,
                0x20,
            ],
        }
    }

    fn pkcs1v15(self) -> Pkcs1v15Sign {
        Pkcs1v15Sign {
            hash_len: Some(self.output_len()),
            prefix: self.digest_info_prefix().into(),
        }
    }

    /// RSA PKCS#1 v1.5 signature over `hash(message)`.
    pub fn sign(self, key: &RsaPrivateKey, message: &[u8]) -> AtfsResult<Vec<u8>> {
        let digest = self.digest(message);
        key.sign(self.pkcs1v15(), &digest)
            .map_err(|e| AtfsError::Key(format!("signing with {self} failed: {e}")))
    }

    pub fn verify(self, key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
        let digest = self.digest(message);
        key.verify(self.pkcs1v15(), &digest, signature).is_ok()
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashId {
    type Err = AtfsError;

    fn from_str(s: &str) -> AtfsResult<Self> {
        HashId::parse(s)
    }
}

/// Resolve a hash identifier string.
pub fn resolve_hash(identifier: &str) -> AtfsResult<HashId> {
    HashId::parse(identifier)
}

pub fn describe_hash(hash: HashId) -> &'static str {
    hash.name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_parse_all_names() {
        for h in HashId::ALL {
            assert_eq!(HashId::parse(h.name()).unwrap(), h);
            assert!(h.name().len() <= HashId::MAX_LEN);
        }
    }

    #[test]
    fn test_identifier_length_boundary() {
        assert_eq!("RIPEMD-256".len(), 10);
        assert!(HashId::parse("RIPEMD-256").is_ok());
        assert!(matches!(
            HashId::parse("RIPEMD-2560"),
            Err(AtfsError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_unknown_hash() {
        assert!(matches!(
            HashId::parse("SHA3-256"),
            Err(AtfsError::UnsupportedHash(_))
        ));
    }

    #[test]
    fn test_families() {
        assert_eq!(HashId::Sha256.family(), HashFamily::Digest);
        assert_eq!(HashId::Ripemd160.family(), HashFamily::Signature);
        assert_eq!(HashId::Md2.family(), HashFamily::Signature);
    }

    #[test]
    fn test_digest_lengths() {
        for h in HashId::ALL {
            assert_eq!(h.digest(b"abc").len(), h.output_len(), "{h}");
        }
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            hex::encode(HashId::Sha256.digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex::encode(HashId::Md5.digest(b"abc")),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_prefix_encodes_digest_length() {
        for h in HashId::ALL {
            let prefix = h.digest_info_prefix();
            assert_eq!(*prefix.last().unwrap() as usize, h.output_len(), "{h}");
            assert_eq!(prefix[1] as usize, prefix.len() - 2 + h.output_len(), "{h}");
        }
    }

    #[test]
    fn test_sign_verify_every_hash() {
        let owner = test_support::alice();
        for h in HashId::ALL {
            let sig = h.sign(owner.private(), b"file body").unwrap();
            assert_eq!(sig.len(), owner.modulus_len());
            assert!(h.verify(owner.public(), b"file body", &sig), "{h}");
            assert!(!h.verify(owner.public(), b"file bodY", &sig), "{h}");
        }
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let sig = HashId::Sha512
            .sign(test_support::alice().private(), b"data")
            .unwrap();
        assert!(!HashId::Sha512.verify(test_support::bob().public(), b"data", &sig));
    }
}
