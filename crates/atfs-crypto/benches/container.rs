use std::sync::OnceLock;

use atfs_core::UserId;
use atfs_crypto::{decrypt, encrypt, CipherId, HashId, KeyPair};

const OWNER: UserId = UserId(1);

fn key() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate(2048).unwrap())
}

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = ["AES-256-CBC", "2FISH-256-OFB", "CAMLL-128-CFB", "3DES-CBC"])]
fn bench_encrypt_64k(bencher: divan::Bencher, cipher: &str) {
    let cipher = CipherId::parse(cipher).unwrap();
    let data = make_data(65536);
    bencher
        .counter(divan::counter::BytesCount::new(data.len()))
        .bench(|| {
            encrypt(
                divan::black_box(&data),
                "bench.bin",
                OWNER,
                key(),
                cipher,
                HashId::Sha256,
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_aes(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let bytes = encrypt(
        &data,
        "bench.bin",
        OWNER,
        key(),
        CipherId::parse("AES-256-CBC").unwrap(),
        HashId::Sha256,
    )
    .unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt(
                divan::black_box(&bytes),
                OWNER,
                key().private(),
                key().public(),
            )
            .unwrap()
        });
}

fn main() {
    divan::main();
}
