//! RSA fixtures shared by the unit tests. Key generation is slow, so each
//! identity is generated once per test binary.

use std::sync::OnceLock;

use crate::keys::KeyPair;

fn cached(cell: &'static OnceLock<KeyPair>) -> &'static KeyPair {
    cell.get_or_init(|| KeyPair::generate(2048).expect("RSA key generation"))
}

pub fn alice() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}

pub fn bob() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}

pub fn carol() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}
