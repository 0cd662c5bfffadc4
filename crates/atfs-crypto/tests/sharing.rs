//! Multi-recipient sharing through serialized containers.

mod support;

use atfs_core::AtfsError;
use atfs_crypto::{container, decrypt, encrypt, owner_id_of, CipherId, EncryptedContainer, HashId};
use support::*;

fn shared_note() -> Vec<u8> {
    let bytes = encrypt(
        b"quarterly numbers",
        "q3.xlsx",
        OWNER,
        owner_key(),
        CipherId::parse("CAMLL-256-CBC").unwrap(),
        HashId::parse("RIPEMD-160").unwrap(),
    )
    .unwrap();
    container::share(&bytes, owner_key().private(), FRIEND, friend_key().public()).unwrap()
}

#[test]
fn friend_reads_shared_file() {
    let bytes = shared_note();
    let (plain, name) =
        decrypt(&bytes, FRIEND, friend_key().private(), owner_key().public()).unwrap();
    assert_eq!(plain, b"quarterly numbers");
    assert_eq!(name, "q3.xlsx");
    assert_eq!(owner_id_of(&bytes).unwrap(), OWNER);
}

#[test]
fn stranger_is_denied() {
    let bytes = shared_note();
    let err =
        decrypt(&bytes, STRANGER, stranger_key().private(), owner_key().public()).unwrap_err();
    assert!(matches!(err, AtfsError::AccessDenied(id) if id == STRANGER));
}

#[test]
fn stranger_claiming_friend_id_gets_no_plaintext() {
    let bytes = shared_note();
    let err =
        decrypt(&bytes, FRIEND, stranger_key().private(), owner_key().public()).unwrap_err();
    assert!(matches!(err, AtfsError::DecryptionFailed));
}

#[test]
fn revocation_only_removes_the_envelope() {
    let shared = shared_note();
    let before = EncryptedContainer::parse(&shared).unwrap();
    let friend_envelope_existed = before.descriptor().is_granted(FRIEND);

    let (revoked, removed) = container::unshare(&shared, FRIEND).unwrap();
    assert!(friend_envelope_existed && removed);

    let after = EncryptedContainer::parse(&revoked).unwrap();
    assert!(!after.descriptor().is_granted(FRIEND));
    // payload is not re-encrypted
    assert_eq!(after.data(), before.data());
    assert!(matches!(
        decrypt(&revoked, FRIEND, friend_key().private(), owner_key().public()),
        Err(AtfsError::AccessDenied(_))
    ));
}

#[test]
fn sharing_twice_keeps_one_entry() {
    let bytes = shared_note();
    let again =
        container::share(&bytes, owner_key().private(), FRIEND, friend_key().public()).unwrap();
    let parsed = EncryptedContainer::parse(&again).unwrap();
    assert_eq!(parsed.descriptor().recipients().count(), 1);
}

#[test]
fn owner_cannot_be_added_as_recipient() {
    let bytes = shared_note();
    assert!(matches!(
        container::share(&bytes, owner_key().private(), OWNER, owner_key().public()),
        Err(AtfsError::InvalidRecipient(_))
    ));
}
