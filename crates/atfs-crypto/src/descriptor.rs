//! Security Descriptor: the per-file table of who can unwrap the FEK
//!
//! Wire layout (little-endian, the owner id lives in StandardInformation):
//! ```text
//! [4B header len]
//! [1B cipher len][cipher][1B hash len][hash]
//! [4B owner envelope len][owner envelope]
//! [4B signature len][signature]
//! [4B recipient count] { [4B recipient id][4B envelope len][envelope] }*
//! ```
//!
//! Revoking a recipient only drops their envelope. The payload is not
//! re-encrypted, so anyone who kept a copy of an earlier envelope can still
//! read the ciphertext it was issued for.

use std::collections::BTreeMap;

use atfs_core::{AtfsError, AtfsResult, UserId};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::cursor::{put_u32_prefixed, put_u8_prefixed, Cursor, Truncated};
use crate::fek::Fek;
use crate::hash::HashId;
use crate::registry::CipherId;

#[derive(Clone, PartialEq, Eq)]
pub struct SecurityDescriptor {
    owner_id: UserId,
    cipher: CipherId,
    hash: HashId,
    owner_envelope: Vec<u8>,
    signature: Vec<u8>,
    others: BTreeMap<UserId, Vec<u8>>,
}

impl SecurityDescriptor {
    /// Wrap `fek` for its owner. No recipients, no signature yet.
    pub fn create(owner_id: UserId, fek: &Fek, owner_public: &RsaPublicKey) -> AtfsResult<Self> {
        Ok(SecurityDescriptor {
            owner_id,
            cipher: fek.cipher(),
            hash: fek.hash(),
            owner_envelope: fek.wrap(owner_public)?,
            signature: Vec::new(),
            others: BTreeMap::new(),
        })
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn cipher(&self) -> CipherId {
        self.cipher
    }

    pub fn hash(&self) -> HashId {
        self.hash
    }

    pub fn owner_envelope(&self) -> &[u8] {
        &self.owner_envelope
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Ids that hold an envelope besides the owner, in ascending order.
    pub fn recipients(&self) -> impl Iterator<Item = UserId> + '_ {
        self.others.keys().copied()
    }

    pub fn is_granted(&self, id: UserId) -> bool {
        id == self.owner_id || self.others.contains_key(&id)
    }

    /// Wrap `fek` for `recipient`. Re-granting replaces the old envelope.
    pub fn grant(
        &mut self,
        recipient: UserId,
        recipient_public: &RsaPublicKey,
        fek: &Fek,
    ) -> AtfsResult<()> {
        if recipient == self.owner_id {
            return Err(AtfsError::InvalidRecipient(format!(
                "user {recipient} already owns this file"
            )));
        }
        if fek.cipher() != self.cipher || fek.hash() != self.hash {
            return Err(AtfsError::InvalidRecipient(format!(
                "file key {}/{} does not belong to this descriptor",
                fek.cipher(),
                fek.hash()
            )));
        }
        let envelope = fek.wrap(recipient_public)?;
        if self.others.insert(recipient, envelope).is_some() {
            tracing::debug!(%recipient, "replaced existing grant");
        } else {
            tracing::debug!(%recipient, "granted access");
        }
        Ok(())
    }

    /// Drop `recipient`'s envelope. Returns whether one was present.
    pub fn revoke(&mut self, recipient: UserId) -> bool {
        let removed = self.others.remove(&recipient).is_some();
        tracing::debug!(%recipient, removed, "revoked access");
        removed
    }

    /// Unwrap the FEK copy that belongs to `requester`.
    pub fn resolve_key(&self, requester: UserId, private: &RsaPrivateKey) -> AtfsResult<Fek> {
        let envelope = if requester == self.owner_id {
            &self.owner_envelope
        } else {
            self.others.get(&requester).ok_or_else(|| {
                tracing::warn!(%requester, owner = %self.owner_id, "requester not in descriptor");
                AtfsError::AccessDenied(requester)
            })?
        };
        let fek = Fek::unwrap(envelope, private).map_err(|e| {
            tracing::warn!(%requester, error = %e, "file key unwrap failed");
            match e {
                AtfsError::EnvelopeCorrupt(_) => e,
                _ => AtfsError::DecryptionFailed,
            }
        })?;
        if fek.cipher() != self.cipher || fek.hash() != self.hash {
            return Err(AtfsError::EnvelopeCorrupt(
                "envelope algorithms disagree with descriptor".into(),
            ));
        }
        Ok(fek)
    }

    /// Sign `content` with the owner's key and keep the signature.
    pub fn sign(&mut self, content: &[u8], owner_private: &RsaPrivateKey) -> AtfsResult<&[u8]> {
        self.signature = self.hash.sign(owner_private, content)?;
        Ok(&self.signature)
    }

    pub fn verify(&self, content: &[u8], owner_public: &RsaPublicKey) -> bool {
        !self.signature.is_empty() && self.hash.verify(owner_public, content, &self.signature)
    }

    /// Bytes this header occupies on the wire, length prefix included.
    pub fn encoded_len(&self) -> usize {
        4 + 1
            + self.cipher.to_string().len()
            + 1
            + self.hash.name().len()
            + 4
            + self.owner_envelope.len()
            + 4
            + self.signature.len()
            + 4
            + self
                .others
                .values()
                .map(|env| 8 + env.len())
                .sum::<usize>()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> AtfsResult<()> {
        let len = u32::try_from(self.encoded_len()).map_err(|_| {
            AtfsError::MalformedContainer("security descriptor exceeds 4 GiB".into())
        })?;
        out.reserve(len as usize);
        out.extend_from_slice(&len.to_le_bytes());
        put_u8_prefixed(out, self.cipher.to_string().as_bytes());
        put_u8_prefixed(out, self.hash.name().as_bytes());
        put_u32_prefixed(out, &self.owner_envelope);
        put_u32_prefixed(out, &self.signature);
        out.extend_from_slice(&(self.others.len() as u32).to_le_bytes());
        for (id, envelope) in &self.others {
            out.extend_from_slice(&id.0.to_le_bytes());
            put_u32_prefixed(out, envelope);
        }
        Ok(())
    }

    pub fn encode(&self) -> AtfsResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Parse one descriptor header starting at `cur`. The header's own length
    /// field decides where the next header begins.
    pub fn decode(owner_id: UserId, cur: Cursor<'_>) -> AtfsResult<(Self, Cursor<'_>)> {
        let start = cur.position();
        let (len, _) = cur.read_u32().map_err(malformed)?;
        let (body, next) = cur.take(len as usize).map_err(malformed)?;

        let body_cur = Cursor::new(body);
        let (_, c) = body_cur.read_u32().map_err(malformed)?;
        let (cipher, c) = c.read_u8_prefixed().map_err(malformed)?;
        let (hash, c) = c.read_u8_prefixed().map_err(malformed)?;
        let (owner_envelope, c) = c.read_u32_prefixed().map_err(malformed)?;
        let (signature, c) = c.read_u32_prefixed().map_err(malformed)?;
        let (count, mut c) = c.read_u32().map_err(malformed)?;

        let mut others = BTreeMap::new();
        for _ in 0..count {
            let (id, rest) = c.read_u32().map_err(malformed)?;
            let (envelope, rest) = rest.read_u32_prefixed().map_err(malformed)?;
            let id = UserId(id);
            if id == owner_id || others.insert(id, envelope.to_vec()).is_some() {
                return Err(AtfsError::MalformedContainer(format!(
                    "duplicate recipient {id} in descriptor"
                )));
            }
            c = rest;
        }
        if !c.is_empty() {
            return Err(AtfsError::MalformedContainer(format!(
                "descriptor at {start} has {} unread bytes",
                c.remaining()
            )));
        }

        let cipher = std::str::from_utf8(cipher)
            .map_err(|_| AtfsError::MalformedIdentifier("non-ASCII cipher id".into()))
            .and_then(CipherId::parse)?;
        let hash = std::str::from_utf8(hash)
            .map_err(|_| AtfsError::MalformedIdentifier("non-ASCII hash id".into()))
            .and_then(HashId::parse)?;

        Ok((
            SecurityDescriptor {
                owner_id,
                cipher,
                hash,
                owner_envelope: owner_envelope.to_vec(),
                signature: signature.to_vec(),
                others,
            },
            next,
        ))
    }
}

fn malformed(t: Truncated) -> AtfsError {
    AtfsError::MalformedContainer(format!("security descriptor: {t}"))
}

impl std::fmt::Debug for SecurityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityDescriptor")
            .field("owner_id", &self.owner_id)
            .field("cipher", &self.cipher.to_string())
            .field("hash", &self.hash.name())
            .field("recipients", &self.others.keys().collect::<Vec<_>>())
            .field("signed", &!self.signature.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{alice, bob, carol};

    const OWNER: UserId = UserId(1);
    const BOB: UserId = UserId(2);
    const CAROL: UserId = UserId(3);

    fn setup() -> (Fek, SecurityDescriptor) {
        let fek = Fek::generate(
            CipherId::parse("AES-256-CBC").unwrap(),
            HashId::parse("SHA256").unwrap(),
        );
        let sd = SecurityDescriptor::create(OWNER, &fek, alice().public()).unwrap();
        (fek, sd)
    }

    #[test]
    fn test_owner_resolves_key() {
        let (fek, sd) = setup();
        assert_eq!(sd.resolve_key(OWNER, alice().private()).unwrap(), fek);
        assert_eq!(sd.recipients().count(), 0);
    }

    #[test]
    fn test_grant_resolve_revoke() {
        let (fek, mut sd) = setup();
        sd.grant(BOB, bob().public(), &fek).unwrap();
        assert!(sd.is_granted(BOB));
        assert_eq!(sd.resolve_key(BOB, bob().private()).unwrap(), fek);

        assert!(sd.revoke(BOB));
        assert!(matches!(
            sd.resolve_key(BOB, bob().private()),
            Err(AtfsError::AccessDenied(UserId(2)))
        ));
        assert!(!sd.revoke(BOB));
    }

    #[test]
    fn test_grant_is_last_write_wins() {
        let (fek, mut sd) = setup();
        sd.grant(BOB, carol().public(), &fek).unwrap();
        sd.grant(BOB, bob().public(), &fek).unwrap();
        assert_eq!(sd.recipients().collect::<Vec<_>>(), vec![BOB]);
        assert_eq!(sd.resolve_key(BOB, bob().private()).unwrap(), fek);
    }

    #[test]
    fn test_grant_to_owner_rejected() {
        let (fek, mut sd) = setup();
        assert!(matches!(
            sd.grant(OWNER, bob().public(), &fek),
            Err(AtfsError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_grant_with_foreign_fek_rejected() {
        let (_, mut sd) = setup();
        let other = Fek::generate(
            CipherId::parse("3DES-CBC").unwrap(),
            HashId::parse("SHA256").unwrap(),
        );
        assert!(matches!(
            sd.grant(BOB, bob().public(), &other),
            Err(AtfsError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_unknown_requester_denied() {
        let (_, sd) = setup();
        assert!(matches!(
            sd.resolve_key(CAROL, carol().private()),
            Err(AtfsError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_wrong_private_key_fails() {
        let (fek, mut sd) = setup();
        sd.grant(BOB, bob().public(), &fek).unwrap();
        assert!(matches!(
            sd.resolve_key(BOB, carol().private()),
            Err(AtfsError::DecryptionFailed)
        ));
        assert!(matches!(
            sd.resolve_key(OWNER, bob().private()),
            Err(AtfsError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_sign_verify() {
        let (_, mut sd) = setup();
        assert!(!sd.verify(b"content", alice().public()));
        sd.sign(b"content", alice().private()).unwrap();
        assert!(sd.verify(b"content", alice().public()));
        assert!(!sd.verify(b"Content", alice().public()));
        assert!(!sd.verify(b"content", bob().public()));
    }

    #[test]
    fn test_encode_decode() {
        let (fek, mut sd) = setup();
        sd.grant(CAROL, carol().public(), &fek).unwrap();
        sd.grant(BOB, bob().public(), &fek).unwrap();
        sd.sign(b"payload", alice().private()).unwrap();

        let mut bytes = sd.encode().unwrap();
        assert_eq!(bytes.len(), sd.encoded_len());
        assert_eq!(&bytes[..4], &(bytes.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b"next header");

        let (back, rest) = SecurityDescriptor::decode(OWNER, Cursor::new(&bytes)).unwrap();
        assert_eq!(back, sd);
        assert_eq!(rest.rest(), b"next header");
        assert_eq!(back.recipients().collect::<Vec<_>>(), vec![BOB, CAROL]);
        assert_eq!(back.resolve_key(CAROL, carol().private()).unwrap(), fek);
    }

    #[test]
    fn test_decode_truncated() {
        let (_, sd) = setup();
        let bytes = sd.encode().unwrap();
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(
                matches!(
                    SecurityDescriptor::decode(OWNER, Cursor::new(&bytes[..cut])),
                    Err(AtfsError::MalformedContainer(_))
                ),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_owner_listed_as_recipient() {
        let (_, sd) = setup();
        let mut bytes = sd.encode().unwrap();
        // append a recipient entry for the owner and patch count and length
        let count_at = bytes.len() - 4;
        bytes[count_at..].copy_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&OWNER.0.to_le_bytes());
        put_u32_prefixed(&mut bytes, b"env");
        let total = bytes.len() as u32;
        bytes[..4].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(
            SecurityDescriptor::decode(OWNER, Cursor::new(&bytes)),
            Err(AtfsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_debug_lists_recipients_only() {
        let (fek, mut sd) = setup();
        sd.grant(BOB, bob().public(), &fek).unwrap();
        let dbg = format!("{sd:?}");
        assert!(dbg.contains("AES-256-CBC"));
        assert!(!dbg.contains("envelope"));
    }
}
