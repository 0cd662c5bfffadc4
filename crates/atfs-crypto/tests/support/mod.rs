//! Key pairs shared by the integration tests, generated once per binary.

#![allow(dead_code)]

use std::sync::OnceLock;

use atfs_core::UserId;
use atfs_crypto::KeyPair;

pub const OWNER: UserId = UserId(1000);
pub const FRIEND: UserId = UserId(1001);
pub const STRANGER: UserId = UserId(1002);

fn cached(cell: &'static OnceLock<KeyPair>) -> &'static KeyPair {
    cell.get_or_init(|| KeyPair::generate(2048).expect("RSA key generation"))
}

pub fn owner_key() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}

pub fn friend_key() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}

pub fn stranger_key() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}
