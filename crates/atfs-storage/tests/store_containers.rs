//! Real containers through the local store.

use std::sync::OnceLock;

use atfs_core::{AtfsError, UserId};
use atfs_crypto::{container, CipherId, HashId, KeyPair};
use atfs_storage::LocalStore;

const OWNER: UserId = UserId(7);
const GUEST: UserId = UserId(8);

fn owner() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate(2048).unwrap())
}

fn guest() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate(2048).unwrap())
}

fn sealed(content: &[u8], name: &str) -> Vec<u8> {
    container::encrypt(
        content,
        name,
        OWNER,
        owner(),
        CipherId::parse("AES-128-CBC").unwrap(),
        HashId::Sha256,
    )
    .unwrap()
}

#[test]
fn put_get_decrypt() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path(), None).unwrap();
    let bytes = sealed(b"hello world!", "note.txt");

    let name = store.put(&bytes).unwrap();
    assert!(name.ends_with(".at"));
    assert!(dir.path().join(&name).is_file());
    assert_eq!(store.list().unwrap(), vec![name.clone()]);

    let back = store.get(&name).unwrap();
    let (plain, file) =
        container::decrypt(&back, OWNER, owner().private(), owner().public()).unwrap();
    assert_eq!(plain, b"hello world!");
    assert_eq!(file, "note.txt");
}

#[test]
fn put_refuses_when_quota_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = sealed(b"data", "a.txt");
    let store = LocalStore::open(dir.path(), Some(bytes.len() as u64 - 1)).unwrap();
    assert!(matches!(
        store.put(&bytes),
        Err(AtfsError::InsufficientStorage { .. })
    ));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn capacity_is_rechecked_for_each_write() {
    let dir = tempfile::tempdir().unwrap();
    let first = sealed(b"first", "1.txt");
    let second = sealed(b"second", "2.txt");
    let quota = first.len() as u64 + 10;
    let store = LocalStore::open(dir.path(), Some(quota)).unwrap();
    // a second handle sees the same directory, like a concurrent writer
    let other = LocalStore::open(dir.path(), Some(quota)).unwrap();

    other.put(&first).unwrap();
    assert!(matches!(
        store.put(&second),
        Err(AtfsError::InsufficientStorage { .. })
    ));
}

#[test]
fn share_and_replace_keeps_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path(), None).unwrap();
    let name = store.put(&sealed(b"shared", "s.txt")).unwrap();

    let shared = container::share(
        &store.get(&name).unwrap(),
        owner().private(),
        GUEST,
        guest().public(),
    )
    .unwrap();
    assert_eq!(container::encrypted_name(&shared).unwrap(), name);
    store.replace(&name, &shared).unwrap();

    let (plain, _) = container::decrypt(
        &store.get(&name).unwrap(),
        GUEST,
        guest().private(),
        owner().public(),
    )
    .unwrap();
    assert_eq!(plain, b"shared");
}

#[test]
fn duplicate_put_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path(), None).unwrap();
    let bytes = sealed(b"x", "x");
    store.put(&bytes).unwrap();
    assert!(matches!(store.put(&bytes), Err(AtfsError::InvalidName(_))));
}

#[test]
fn remove_deletes_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path(), None).unwrap();
    let name = store.put(&sealed(b"bye", "gone.txt")).unwrap();
    store.remove(&name).unwrap();
    assert!(!store.contains(&name));
    assert!(matches!(store.get(&name), Err(AtfsError::NotFound(_))));
}
