//! Filename encryption
//!
//! Names are always encrypted with AES-256-OFB, whatever cipher the payload
//! uses, so a listing can be decoded without knowing the payload mode. The
//! name key and IV are expanded from the FEK key ‖ IV with HKDF-SHA256
//! (domain "atfs-names"). On disk a container is called
//! `<lowercase hex of encrypted name>.at`.

use atfs_core::{AtfsError, AtfsResult};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::fek::Fek;
use crate::registry::{Algorithm, CipherId, CipherSuite, Mode};
use crate::scrub::Scrubbed;

/// Extension carried by every stored container.
pub const EXTENSION: &str = ".at";

/// Longest plaintext name in bytes. Its hex form plus the extension still
/// fits a 255-byte directory entry.
pub const MAX_NAME_LEN: usize = 126;

const NAME_DOMAIN: &[u8] = b"atfs-names";

fn name_suite(fek: &Fek) -> AtfsResult<CipherSuite> {
    let mut okm = Scrubbed::zeroed(48);
    Hkdf::<Sha256>::new(None, &fek.key_and_iv())
        .expand(NAME_DOMAIN, &mut okm)
        .map_err(|e| AtfsError::Key(format!("HKDF expand for name key: {e}")))?;
    let id = CipherId::new(Algorithm::Aes, 256, Mode::Ofb)?;
    CipherSuite::from_parts(id, &okm[..32], Some(&okm[32..]))
}

/// Encrypt a filename under the FEK. Output length equals input length.
pub fn encrypt_name(fek: &Fek, name: &str) -> AtfsResult<Vec<u8>> {
    if name.is_empty() {
        return Err(AtfsError::InvalidName("empty file name".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(AtfsError::InvalidName(format!(
            "name is {} bytes, limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }
    name_suite(fek)?.encrypt(name.as_bytes())
}

/// Decrypt a filename. A result that is not UTF-8 means the key or the
/// bytes are wrong.
pub fn decrypt_name(fek: &Fek, encrypted: &[u8]) -> AtfsResult<String> {
    let plain = name_suite(fek)?.decrypt(encrypted)?;
    String::from_utf8(plain)
        .map_err(|_| AtfsError::IntegrityViolation("file name did not decrypt to UTF-8".into()))
}

/// `<hex>.at` form of an encrypted name.
pub fn stored_name(encrypted: &[u8]) -> String {
    format!("{}{EXTENSION}", hex::encode(encrypted))
}

/// Inverse of [`stored_name`].
pub fn parse_stored_name(stored: &str) -> AtfsResult<Vec<u8>> {
    let stem = stored
        .strip_suffix(EXTENSION)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AtfsError::InvalidName(format!("{stored:?} is not an {EXTENSION} file")))?;
    hex::decode(stem).map_err(|e| AtfsError::InvalidName(format!("{stored:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashId;
    use proptest::prelude::*;

    fn fek(cipher: &str) -> Fek {
        Fek::generate(CipherId::parse(cipher).unwrap(), HashId::Sha256)
    }

    #[test]
    fn test_roundtrip() {
        let k = fek("AES-256-CBC");
        let enc = encrypt_name(&k, "note.txt").unwrap();
        assert_eq!(enc.len(), "note.txt".len());
        assert_ne!(enc, b"note.txt");
        assert_eq!(decrypt_name(&k, &enc).unwrap(), "note.txt");
    }

    #[test]
    fn test_independent_of_payload_mode() {
        // ECB payload still gets a stream-encrypted name with no padding
        let k = fek("3DES-ECB");
        let enc = encrypt_name(&k, "a").unwrap();
        assert_eq!(enc.len(), 1);
    }

    #[test]
    fn test_same_fek_same_name() {
        let k = fek("AES-128-OFB");
        assert_eq!(
            encrypt_name(&k, "report.pdf").unwrap(),
            encrypt_name(&k, "report.pdf").unwrap()
        );
    }

    #[test]
    fn test_different_fek_different_name() {
        let a = encrypt_name(&fek("AES-128-OFB"), "report.pdf").unwrap();
        let b = encrypt_name(&fek("AES-128-OFB"), "report.pdf").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            encrypt_name(&fek("AES-128-CBC"), ""),
            Err(AtfsError::InvalidName(_))
        ));
    }

    #[test]
    fn test_long_name_rejected() {
        let k = fek("AES-128-CBC");
        let longest = "n".repeat(MAX_NAME_LEN);
        let enc = encrypt_name(&k, &longest).unwrap();
        assert_eq!(stored_name(&enc).len(), 255);
        assert!(matches!(
            encrypt_name(&k, &format!("{longest}n")),
            Err(AtfsError::InvalidName(_))
        ));
    }

    #[test]
    fn test_stored_name_form() {
        assert_eq!(stored_name(&[0xde, 0xad, 0x01]), "dead01.at");
        assert_eq!(parse_stored_name("dead01.at").unwrap(), vec![0xde, 0xad, 0x01]);
        assert!(parse_stored_name("dead01.txt").is_err());
        assert!(parse_stored_name(".at").is_err());
        assert!(parse_stored_name("zz.at").is_err());
    }

    proptest! {
        #[test]
        fn name_roundtrip(name in "[\\PC]{1,30}") {
            let k = fek("CAMLL-192-CFB");
            let enc = encrypt_name(&k, &name).unwrap();
            prop_assert_eq!(decrypt_name(&k, &enc).unwrap(), name);
            prop_assert_eq!(parse_stored_name(&stored_name(&enc)).unwrap(), enc);
        }
    }
}
