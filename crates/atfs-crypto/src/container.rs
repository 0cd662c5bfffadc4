//! Encrypted Container: the on-disk `.at` file
//!
//! ```text
//! StandardInformation (48 B)
//!   [0..4)   header length (= 48)
//!   [4..8)   owner id
//!   [8..16)  created  (i64 ms)   [16..20) created by
//!   [20..28) altered  (i64 ms)   [28..32) altered by
//!   [32..40) read     (i64 ms)   [40..44) read by
//!   [44..48) reserved
//! SecurityDescriptor (see `descriptor`)
//! Data
//!   [4B header length]
//!   [4B encrypted name len][encrypted name]
//!   [4B ciphertext len][ciphertext]
//! ```
//!
//! Every header reports its own length, prefix included; the next header
//! starts right after it. The owner's signature covers
//! `u32 LE name len ‖ name ‖ plaintext`, so a change to any byte of the Data
//! header is caught on decrypt.

use atfs_core::{AtfsError, AtfsResult, Stamp, UserId};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::cursor::{put_u32_prefixed, Cursor, Truncated};
use crate::descriptor::SecurityDescriptor;
use crate::fek::Fek;
use crate::hash::HashId;
use crate::keys::KeyPair;
use crate::names::{self, MAX_NAME_LEN};
use crate::registry::CipherId;
use crate::scrub::Scrubbed;

/// Size of the fixed StandardInformation header.
pub const STANDARD_INFO_LEN: usize = 48;

/// Largest payload whose Data header still fits 32-bit length fields, with
/// room for the longest name and one block of padding.
pub const MAX_PAYLOAD: u64 = u32::MAX as u64 - 12 - MAX_NAME_LEN as u64 - 16;

const OWNER_OFFSET: usize = 4;

/// Fixed-size bookkeeping header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardInformation {
    owner: UserId,
    created: Stamp,
    altered: Stamp,
    read: Stamp,
}

impl StandardInformation {
    pub fn new(owner: UserId) -> Self {
        let now = Stamp::now(owner);
        StandardInformation {
            owner,
            created: now,
            altered: now,
            read: now,
        }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn created(&self) -> Stamp {
        self.created
    }

    pub fn altered(&self) -> Stamp {
        self.altered
    }

    pub fn read(&self) -> Stamp {
        self.read
    }

    pub fn touch_read(&mut self, by: UserId) {
        self.read = Stamp::now(by);
    }

    pub fn touch_altered(&mut self, by: UserId) {
        self.altered = Stamp::now(by);
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(STANDARD_INFO_LEN as u32).to_le_bytes());
        out.extend_from_slice(&self.owner.0.to_le_bytes());
        for stamp in [self.created, self.altered, self.read] {
            out.extend_from_slice(&stamp.at_ms.to_le_bytes());
            out.extend_from_slice(&stamp.by.0.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 4]);
    }

    fn decode(cur: Cursor<'_>) -> AtfsResult<(Self, Cursor<'_>)> {
        let malformed = |t: Truncated| {
            AtfsError::MalformedContainer(format!("standard information: {t}"))
        };
        let (len, c) = cur.read_u32().map_err(malformed)?;
        if len as usize != STANDARD_INFO_LEN {
            return Err(AtfsError::MalformedContainer(format!(
                "standard information claims {len} bytes, expected {STANDARD_INFO_LEN}"
            )));
        }
        let (owner, c) = c.read_u32().map_err(malformed)?;
        let mut stamps = [Stamp {
            at_ms: 0,
            by: UserId(0),
        }; 3];
        let mut c = c;
        for stamp in &mut stamps {
            let (at_ms, rest) = c.read_i64().map_err(malformed)?;
            let (by, rest) = rest.read_u32().map_err(malformed)?;
            *stamp = Stamp {
                at_ms,
                by: UserId(by),
            };
            c = rest;
        }
        let (_reserved, c) = c.read_array::<4>().map_err(malformed)?;
        let [created, altered, read] = stamps;
        Ok((
            StandardInformation {
                owner: UserId(owner),
                created,
                altered,
                read,
            },
            c,
        ))
    }
}

/// Encrypted name and payload.
#[derive(Clone, PartialEq, Eq)]
pub struct DataHeader {
    encrypted_name: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl DataHeader {
    pub fn encrypted_name(&self) -> &[u8] {
        &self.encrypted_name
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn encoded_len(&self) -> usize {
        12 + self.encrypted_name.len() + self.ciphertext.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> AtfsResult<()> {
        let len = u32::try_from(self.encoded_len()).map_err(|_| AtfsError::PayloadTooLarge {
            size: self.ciphertext.len() as u64,
            limit: MAX_PAYLOAD,
        })?;
        out.extend_from_slice(&len.to_le_bytes());
        put_u32_prefixed(out, &self.encrypted_name);
        put_u32_prefixed(out, &self.ciphertext);
        Ok(())
    }

    /// The Data header is covered by the signature, so any damage to it is
    /// reported as an integrity failure rather than a parse error.
    fn decode(cur: Cursor<'_>) -> AtfsResult<Self> {
        let damaged =
            |t: Truncated| AtfsError::IntegrityViolation(format!("data header damaged: {t}"));
        let (len, _) = cur.read_u32().map_err(damaged)?;
        if len as usize != cur.remaining() {
            return Err(AtfsError::IntegrityViolation(format!(
                "data header claims {len} bytes, {} present",
                cur.remaining()
            )));
        }
        let (_, c) = cur.read_u32().map_err(damaged)?;
        let (encrypted_name, c) = c.read_u32_prefixed().map_err(damaged)?;
        let (ciphertext, c) = c.read_u32_prefixed().map_err(damaged)?;
        if !c.is_empty() {
            return Err(AtfsError::IntegrityViolation(format!(
                "data header has {} unread bytes",
                c.remaining()
            )));
        }
        Ok(DataHeader {
            encrypted_name: encrypted_name.to_vec(),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

impl std::fmt::Debug for DataHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataHeader")
            .field("name_len", &self.encrypted_name.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// A parsed `.at` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContainer {
    info: StandardInformation,
    descriptor: SecurityDescriptor,
    data: DataHeader,
}

fn signed_message(name: &str, content: &[u8]) -> Scrubbed {
    let mut msg = Vec::with_capacity(4 + name.len() + content.len());
    put_u32_prefixed(&mut msg, name.as_bytes());
    msg.extend_from_slice(content);
    Scrubbed::new(msg)
}

pub fn check_payload_len(len: u64) -> AtfsResult<()> {
    if len > MAX_PAYLOAD {
        return Err(AtfsError::PayloadTooLarge {
            size: len,
            limit: MAX_PAYLOAD,
        });
    }
    Ok(())
}

impl EncryptedContainer {
    /// Encrypt `content` for `owner_id`. A fresh FEK is generated, wrapped for
    /// the owner, and the plaintext is signed with the owner's private key.
    pub fn seal(
        content: &[u8],
        filename: &str,
        owner_id: UserId,
        owner: &KeyPair,
        cipher: CipherId,
        hash: HashId,
    ) -> AtfsResult<Self> {
        check_payload_len(content.len() as u64)?;
        let fek = Fek::generate(cipher, hash);
        let encrypted_name = names::encrypt_name(&fek, filename)?;

        let mut descriptor = SecurityDescriptor::create(owner_id, &fek, owner.public())?;
        descriptor.sign(&signed_message(filename, content), owner.private())?;

        let ciphertext = fek.suite().encrypt(content)?;
        tracing::debug!(
            owner = %owner_id,
            cipher = %cipher,
            hash = %hash,
            plain_len = content.len(),
            cipher_len = ciphertext.len(),
            "sealed container"
        );
        Ok(EncryptedContainer {
            info: StandardInformation::new(owner_id),
            descriptor,
            data: DataHeader {
                encrypted_name,
                ciphertext,
            },
        })
    }

    /// Recover `(content, filename)` for `requester`. The signature is always
    /// checked against the owner's public key.
    pub fn open(
        &self,
        requester: UserId,
        private: &RsaPrivateKey,
        owner_public: &RsaPublicKey,
    ) -> AtfsResult<(Vec<u8>, String)> {
        let fek = self.descriptor.resolve_key(requester, private)?;

        let content = fek.suite().decrypt(&self.data.ciphertext).map_err(|e| {
            tracing::warn!(%requester, error = %e, "payload failed to decrypt");
            AtfsError::IntegrityViolation("payload failed to decrypt".into())
        })?;
        let content = Scrubbed::new(content);
        let name = names::decrypt_name(&fek, &self.data.encrypted_name).inspect_err(|e| {
            tracing::warn!(%requester, error = %e, "file name failed to decrypt");
        })?;

        if !self
            .descriptor
            .verify(&signed_message(&name, &content), owner_public)
        {
            tracing::warn!(%requester, owner = %self.info.owner, "signature mismatch");
            return Err(AtfsError::IntegrityViolation(
                "owner signature does not match content".into(),
            ));
        }
        tracing::debug!(%requester, len = content.len(), "opened container");
        Ok((content.to_vec(), name))
    }

    /// Walk the three headers in order.
    pub fn parse(bytes: &[u8]) -> AtfsResult<Self> {
        let (info, cur) = StandardInformation::decode(Cursor::new(bytes))?;
        let (descriptor, cur) = SecurityDescriptor::decode(info.owner, cur)?;
        let data = DataHeader::decode(cur)?;
        Ok(EncryptedContainer {
            info,
            descriptor,
            data,
        })
    }

    pub fn to_bytes(&self) -> AtfsResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.info.encode_into(&mut out);
        self.descriptor.encode_into(&mut out)?;
        self.data.encode_into(&mut out)?;
        Ok(out)
    }

    pub fn encoded_len(&self) -> usize {
        STANDARD_INFO_LEN + self.descriptor.encoded_len() + self.data.encoded_len()
    }

    /// Give `recipient` access. Only the owner can share, since the owner's
    /// envelope is the one unwrapped here.
    pub fn share(
        &mut self,
        owner_private: &RsaPrivateKey,
        recipient: UserId,
        recipient_public: &RsaPublicKey,
    ) -> AtfsResult<()> {
        let owner = self.info.owner;
        let fek = self.descriptor.resolve_key(owner, owner_private)?;
        self.descriptor.grant(recipient, recipient_public, &fek)?;
        self.info.touch_altered(owner);
        Ok(())
    }

    /// Remove `recipient`'s envelope. The ciphertext is left as is.
    pub fn unshare(&mut self, recipient: UserId) -> bool {
        let removed = self.descriptor.revoke(recipient);
        if removed {
            self.info.touch_altered(self.info.owner);
        }
        removed
    }

    pub fn info(&self) -> &StandardInformation {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut StandardInformation {
        &mut self.info
    }

    pub fn descriptor(&self) -> &SecurityDescriptor {
        &self.descriptor
    }

    pub fn data(&self) -> &DataHeader {
        &self.data
    }

    pub fn owner_id(&self) -> UserId {
        self.info.owner
    }

    /// `<hex>.at` name the container is stored under.
    pub fn stored_name(&self) -> String {
        names::stored_name(&self.data.encrypted_name)
    }
}

/// Encrypt a file for its owner and serialize the container.
pub fn encrypt(
    content: &[u8],
    filename: &str,
    owner_id: UserId,
    owner: &KeyPair,
    cipher: CipherId,
    hash: HashId,
) -> AtfsResult<Vec<u8>> {
    EncryptedContainer::seal(content, filename, owner_id, owner, cipher, hash)?.to_bytes()
}

/// Parse and decrypt a serialized container.
pub fn decrypt(
    bytes: &[u8],
    requester: UserId,
    private: &RsaPrivateKey,
    owner_public: &RsaPublicKey,
) -> AtfsResult<(Vec<u8>, String)> {
    EncryptedContainer::parse(bytes)?.open(requester, private, owner_public)
}

/// Owner id from its fixed offset, without parsing the rest.
pub fn owner_id_of(bytes: &[u8]) -> AtfsResult<UserId> {
    let (owner, _) = Cursor::new(bytes)
        .take(OWNER_OFFSET)
        .and_then(|(_, c)| c.read_u32())
        .map_err(|t| AtfsError::MalformedContainer(format!("owner id: {t}")))?;
    Ok(UserId(owner))
}

/// Stored-name form of a serialized container.
pub fn encrypted_name(bytes: &[u8]) -> AtfsResult<String> {
    Ok(EncryptedContainer::parse(bytes)?.stored_name())
}

/// Grant access on a serialized container and re-serialize it.
pub fn share(
    bytes: &[u8],
    owner_private: &RsaPrivateKey,
    recipient: UserId,
    recipient_public: &RsaPublicKey,
) -> AtfsResult<Vec<u8>> {
    let mut container = EncryptedContainer::parse(bytes)?;
    container.share(owner_private, recipient, recipient_public)?;
    container.to_bytes()
}

/// Revoke access on a serialized container. Returns the new bytes and
/// whether the recipient had access.
pub fn unshare(bytes: &[u8], recipient: UserId) -> AtfsResult<(Vec<u8>, bool)> {
    let mut container = EncryptedContainer::parse(bytes)?;
    let removed = container.unshare(recipient);
    Ok((container.to_bytes()?, removed))
}
