use safearchive_crypto::{derive_key, DispatchOptions, Dispatcher, KdfParams, Password};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn fast_dispatcher() -> Dispatcher {
    Dispatcher::new(DispatchOptions {
        kdf: KdfParams::new(1_000).unwrap(),
        ..DispatchOptions::default()
    })
}

#[divan::bench]
fn bench_derive_key_default_rounds(bencher: divan::Bencher) {
    let password = Password::from("benchmark passphrase");
    let salt = [0x42u8; 16];
    let params = KdfParams::default();
    bencher.bench(|| derive_key(divan::black_box(&password), &salt, &params).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let dispatcher = fast_dispatcher();
    let password = Password::from("pw");
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            dispatcher
                .encrypt(divan::black_box(data.clone()), &password)
                .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let dispatcher = fast_dispatcher();
    let password = Password::from("pw");
    let envelope = dispatcher
        .encrypt(make_data(size), &password)
        .unwrap()
        .into_bytes();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            dispatcher
                .decrypt(divan::black_box(&envelope), &password)
                .unwrap()
        });
}

fn main() {
    divan::main();
}
