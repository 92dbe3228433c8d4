//! WAF-evasion wrapper applied to every character-extraction probe:
//! junk keys injected into the body, all keys shuffled, and a rotating
//! User-Agent prefix — makes consecutive probes for the same character
//! look less like an automated binary search to a naive rule-based WAF.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::value::Value;

const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

pub fn inject_junk_and_shuffle(body: &Value, rng: &mut impl Rng) -> Value {
    let mut cloned = body.clone();
    let Some(map) = cloned.as_object_mut() else {
        return cloned;
    };
    let junk_count = rng.gen_range(1..=3);
    for _ in 0..junk_count {
        let key_len = rng_len(rng, 3, 5);
        let key = format!("_{}", random_ascii(rng, LOWER, key_len));
        let value_len = rng_len(rng, 4, 10);
        let value = random_ascii(rng, ALNUM, value_len);
        map.insert(key, Value::Str(value));
    }
    shuffle_keys(map, rng);
    cloned
}

fn rng_len(rng: &mut impl Rng, lo: usize, hi: usize) -> usize {
    rng.gen_range(lo..=hi)
}

fn random_ascii(rng: &mut impl Rng, alphabet: &[u8], len: usize) -> String {
    (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char).collect()
}

fn shuffle_keys(map: &mut IndexMap<String, Value>, rng: &mut impl Rng) {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.shuffle(rng);
    let mut reordered = IndexMap::new();
    for key in keys {
        if let Some(value) = map.shift_remove(&key) {
            reordered.insert(key, value);
        }
    }
    *map = reordered;
}

/// Returns a `(User-Agent, value)` header override with a fresh random
/// 10-char alphanumeric prefix spliced onto the base user agent string.
pub fn rotated_user_agent_header(base_user_agent: &str, rng: &mut impl Rng) -> (String, String) {
    let prefix = random_ascii(rng, ALNUM, 10);
    ("User-Agent".to_string(), format!("{prefix}-{base_user_agent}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn adds_between_one_and_three_junk_keys() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let body = Value::from_json(serde_json::json!({"username": "admin"}));
        let out = inject_junk_and_shuffle(&body, &mut rng);
        let map = out.as_object().unwrap();
        let junk = map.keys().filter(|k| k.starts_with('_') && *k != "username").count();
        assert!((1..=3).contains(&junk));
        assert!(map.contains_key("username"));
    }

    #[test]
    fn non_object_bodies_pass_through_unchanged() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let body = Value::Str("raw".to_string());
        let out = inject_junk_and_shuffle(&body, &mut rng);
        assert_eq!(out, Value::Str("raw".to_string()));
    }

    #[test]
    fn user_agent_gets_a_fresh_prefix_each_call() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let (_, a) = rotated_user_agent_header("base-ua", &mut rng);
        let (_, b) = rotated_user_agent_header("base-ua", &mut rng);
        assert_ne!(a, b);
    }
}
