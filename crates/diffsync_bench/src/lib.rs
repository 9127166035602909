//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use serde_json::{json, Value};

/// Generates random lowercase text of `len` characters.
pub fn random_text(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

/// Returns `text` with a short random span replaced somewhere in the middle.
pub fn mutate_text(text: &str) -> String {
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return random_text(4);
    }
    let start = rng.gen_range(0..chars.len());
    let end = (start + rng.gen_range(0..8)).min(chars.len());
    let mut out: String = chars[..start].iter().collect();
    out.push_str(&random_text(rng.gen_range(1..8)));
    out.extend(&chars[end..]);
    out
}

/// Generates a JSON object with `fields` members, some of them nested.
pub fn random_object(fields: usize) -> Value {
    let mut rng = rand::thread_rng();
    let map = (0..fields)
        .map(|i| {
            let value = match i % 3 {
                0 => json!(rng.gen_range(0..1000)),
                1 => json!(random_text(12)),
                _ => json!({ "tags": [random_text(4), random_text(4)], "score": rng.gen::<u8>() }),
            };
            (format!("field_{i}"), value)
        })
        .collect();
    Value::Object(map)
}

/// Returns `object` with roughly a tenth of its members changed.
pub fn mutate_object(object: &Value) -> Value {
    let mut rng = rand::thread_rng();
    let mut out = object.clone();
    if let Value::Object(map) = &mut out {
        for value in map.values_mut() {
            if rng.gen_ratio(1, 10) {
                *value = json!(random_text(6));
            }
        }
    }
    out
}
