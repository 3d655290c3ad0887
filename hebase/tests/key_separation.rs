use std::{fs, path::PathBuf};

use hebase::{
    BGV_NOT_SECURE_48, CKKS_NOT_SECURE_512_FAST, CTile, Encoder, Error, HeContext, HeDirs,
    MockupBgvContext, MockupCkksContext, load_he_context, load_he_context_from_file,
};

fn output_path(name: &str) -> PathBuf {
    let dir = HeDirs::from_env().tests_output_dir.join("key_separation");
    fs::create_dir_all(&dir).unwrap();

    dir.join(name)
}

#[test]
fn server_computes_without_secret_key() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Client: create keys, ship the public context, keep the secret key.
    let client = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();
    let client_enc = Encoder::new(&client);

    let context_path = output_path("server_computes_context.bin");
    client.save_to_file(&context_path, false).unwrap();

    let mut x = CTile::new(&client);
    client_enc.encode_encrypt(&mut x, &[3i64, 4, 5], None).unwrap();
    let mut upload = vec![];
    x.save(&mut upload).unwrap();

    // Server: compute on data it can't read.
    let server = load_he_context_from_file(&context_path).unwrap();
    assert!(!server.has_secret_key());
    assert_eq!(server.scheme_name(), "BGV");

    let server_enc = Encoder::new(server.as_ref());
    let mut y = CTile::new(server.as_ref());
    y.load(&mut upload.as_slice()).unwrap();
    y.square().unwrap();
    y.add_scalar(1).unwrap();

    assert!(matches!(
        server_enc.decrypt_decode_i64(&y),
        Err(Error::NoSecretKey)
    ));

    let mut download = vec![];
    y.save(&mut download).unwrap();

    // Client: decrypt the result.
    let mut result = CTile::new(&client);
    result.load(&mut download.as_slice()).unwrap();

    assert_eq!(
        &client_enc.decrypt_decode_i64(&result).unwrap()[..3],
        &[10, 17, 26]
    );
    assert_eq!(result.chain_index(), y.chain_index());
}

#[test]
fn can_load_secret_key_later() {
    let _ = env_logger::builder().is_test(true).try_init();

    let client = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();

    let mut public = vec![];
    client.save(&mut public, false).unwrap();
    let sk_path = output_path("load_later_secret_key.bin");
    client.save_secret_key_to_file(&sk_path).unwrap();

    let he = load_he_context(&mut public.as_slice()).unwrap();
    let mut enc = Encoder::new(he.as_ref());
    enc.set_decrypt_added_noise_enabled(false).unwrap();

    let mut c = CTile::new(he.as_ref());
    enc.encode_encrypt(&mut c, &[0.5, -1.25], None).unwrap();
    c.multiply_scalar(2.0).unwrap();

    assert!(matches!(
        enc.decrypt_decode_f64(&c),
        Err(Error::NoSecretKey)
    ));

    he.load_secret_key_from_file(&sk_path).unwrap();
    assert!(he.has_secret_key());

    enc.assert_equals(&c, "doubled", &[1.0, -2.5], 1e-6, false)
        .unwrap();

    assert!(matches!(
        he.load_secret_key_from_file(&sk_path),
        Err(Error::SecretKeyAlreadyLoaded)
    ));
}

#[test]
fn rejects_foreign_keys_and_ciphertexts() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ours = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();
    let theirs = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

    let mut public = vec![];
    ours.save(&mut public, false).unwrap();
    let he = load_he_context(&mut public.as_slice()).unwrap();

    let mut foreign_sk = vec![];
    theirs.save_secret_key(&mut foreign_sk).unwrap();

    assert!(matches!(
        he.load_secret_key(&mut foreign_sk.as_slice()),
        Err(Error::KeyMismatch)
    ));
    assert!(!he.has_secret_key());

    let mut foreign = CTile::new(&theirs);
    Encoder::new(&theirs)
        .encode_encrypt(&mut foreign, &[1i64], None)
        .unwrap();
    let mut bytes = vec![];
    foreign.save(&mut bytes).unwrap();

    let mut c = CTile::new(&ours);
    c.load(&mut bytes.as_slice()).unwrap();

    assert!(matches!(
        Encoder::new(&ours).decrypt_decode_i64(&c),
        Err(Error::KeyMismatch)
    ));
}

#[test]
fn rejects_saving_secret_key_of_public_context() {
    let client = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

    let mut public = vec![];
    client.save(&mut public, false).unwrap();
    let he = load_he_context(&mut public.as_slice()).unwrap();

    let mut out = vec![];

    assert!(matches!(
        he.save_secret_key(&mut out),
        Err(Error::NoSecretKey)
    ));
}

#[test]
fn full_context_round_trips_through_files() {
    let _ = env_logger::builder().is_test(true).try_init();

    let he = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();
    let mut enc = Encoder::new(&he);
    enc.set_decrypt_added_noise_enabled(false).unwrap();

    let context_path = output_path("round_trip_context.bin");
    let tile_path = output_path("round_trip_tile.bin");

    let mut c = CTile::new(&he);
    enc.encode_encrypt(&mut c, &[1.5, 2.5, 3.5], None).unwrap();
    c.multiply(&c.clone()).unwrap();

    he.save_to_file(&context_path, true).unwrap();
    c.save_to_file(&tile_path).unwrap();

    let loaded = load_he_context_from_file(&context_path).unwrap();
    assert!(loaded.has_secret_key());
    assert_eq!(loaded.signature(), he.signature());
    assert_eq!(loaded.top_chain_index(), he.top_chain_index());

    let mut loaded_enc = Encoder::new(loaded.as_ref());
    loaded_enc.set_decrypt_added_noise_enabled(false).unwrap();

    let mut d = CTile::new(loaded.as_ref());
    d.load_from_file(&tile_path).unwrap();

    assert_eq!(d.chain_index(), c.chain_index());
    loaded_enc
        .assert_equals(&d, "squares", &[2.25, 6.25, 12.25], 1e-6, false)
        .unwrap();
}
