use hebase::{
    BGV_NOT_SECURE_48, CTile, Encoder, HeContext, MockupBgvContext, NativeFunctionEvaluator,
    Result,
};

const COUNTRIES: &[(&str, &str)] = &[
    ("Albania", "Tirana"),
    ("Austria", "Vienna"),
    ("Belgium", "Brussels"),
    ("Croatia", "Zagreb"),
    ("Denmark", "Copenhagen"),
    ("Estonia", "Tallinn"),
    ("France", "Paris"),
    ("Iceland", "Reykjavik"),
    ("Portugal", "Lisbon"),
];

fn to_ascii(s: &str) -> Vec<i64> {
    s.bytes().map(i64::from).collect()
}

fn from_ascii(vals: &[i64]) -> String {
    vals.iter()
        .take_while(|v| **v != 0)
        .map(|v| char::from(*v as u8))
        .collect()
}

struct EncryptedDb {
    he: MockupBgvContext,
    enc: Encoder,
    entries: Vec<(CTile, CTile)>,
}

impl EncryptedDb {
    fn new() -> Result<Self> {
        let he = MockupBgvContext::init(&BGV_NOT_SECURE_48)?;
        let enc = Encoder::new(&he);

        let entries = COUNTRIES
            .iter()
            .map(|(country, capital)| {
                let mut key = CTile::new(&he);
                let mut value = CTile::new(&he);
                enc.encode_encrypt(&mut key, &to_ascii(country), None)?;
                enc.encode_encrypt(&mut value, &to_ascii(capital), None)?;

                Ok((key, value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { he, enc, entries })
    }

    fn lookup(&self, query: &str) -> Result<String> {
        let eval = NativeFunctionEvaluator::new(&self.he);
        let p = self.he.traits().arithmetic_modulus;
        let slots = self.he.slot_count();

        let mut encrypted_query = CTile::new(&self.he);
        self.enc
            .encode_encrypt(&mut encrypted_query, &to_ascii(query), None)?;

        let mut result: Option<CTile> = None;

        for (key, value) in &self.entries {
            // 1 in every slot where the key matches the query, 0 elsewhere.
            let mut mask = key.clone();
            mask.sub(&encrypted_query)?;
            eval.power_in_place(&mut mask, (p - 1) as u32)?;
            mask.negate()?;
            mask.add_scalar(1)?;

            let rotated = (0..slots)
                .map(|i| {
                    let mut r = mask.clone();
                    r.rotate(-(i as i32))?;

                    Ok(r)
                })
                .collect::<Result<Vec<_>>>()?;

            eval.total_product(&mut mask, &rotated)?;
            mask.multiply_raw(value)?;

            match result.as_mut() {
                Some(r) => r.add(&mask)?,
                None => result = Some(mask),
            }
        }

        match result {
            Some(r) => Ok(from_ascii(&self.enc.decrypt_decode_i64(&r)?)),
            None => Ok(String::new()),
        }
    }
}

#[test]
fn can_find_capitals() {
    let _ = env_logger::builder().is_test(true).try_init();

    let db = EncryptedDb::new().unwrap();

    assert_eq!(db.lookup("France").unwrap(), "Paris");
    assert_eq!(db.lookup("Denmark").unwrap(), "Copenhagen");
    assert_eq!(db.lookup("Iceland").unwrap(), "Reykjavik");
}

#[test]
fn missing_country_yields_nothing() {
    let _ = env_logger::builder().is_test(true).try_init();

    let db = EncryptedDb::new().unwrap();

    assert_eq!(db.lookup("Narnia").unwrap(), "");
    assert_eq!(db.lookup("france").unwrap(), "");
    assert_eq!(db.lookup("Franc").unwrap(), "");
}

#[test]
fn lookup_stays_within_depth() {
    let db = EncryptedDb::new().unwrap();
    let eval = NativeFunctionEvaluator::new(&db.he);

    let mut mask = db.entries[0].0.clone();
    eval.power_in_place(&mut mask, 130).unwrap();

    // 130 = 0b10000010: seven squarings and one extra multiplication.
    assert_eq!(
        mask.chain_index(),
        Some(BGV_NOT_SECURE_48.depth - 8),
        "unexpected depth consumed by the Fermat mask"
    );
}
