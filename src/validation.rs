use crate::config::ValidationConfig;
use crate::error::ValidationError;
use crate::models::{NormalizedInvoice, NormalizedLineItem};
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::OnceLock;

/// 识别的币种代码 (ISO 4217 常用子集)
const KNOWN_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "HKD", "AUD", "CAD", "CHF", "SGD", "KRW", "INR",
];

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .unwrap_or_else(|e| panic!("email regex: {}", e))
    })
}

/// 取非空字符串字段 (去首尾空白)
fn str_field<'a>(raw: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 金额字段: 接受 JSON 数字或字符串, 统一转 BigDecimal
/// 返回 None = 缺失, Some(Err) = 存在但不可解析
fn decimal_value(value: &Value) -> Result<BigDecimal, String> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).map_err(|_| n.to_string()),
        Value::String(s) => BigDecimal::from_str(s.trim()).map_err(|_| s.clone()),
        other => Err(other.to_string()),
    }
}

fn decimal_field(raw: &Map<String, Value>, key: &str) -> Option<Result<BigDecimal, String>> {
    raw.get(key).filter(|v| !v.is_null()).map(decimal_value)
}

/// 校验引擎入口
///
/// 所有检查全部执行, 错误按检查声明顺序聚合成一个列表返回, 从不抛出;
/// 全部通过时返回规范化发票 (类型已转换, 缺省币种已填充)。
pub fn validate(
    raw: &Map<String, Value>,
    config: &ValidationConfig,
) -> Result<NormalizedInvoice, Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = Vec::new();

    // 1. 必填字段
    let invoice_number = str_field(raw, "invoice_number");
    if invoice_number.is_none() {
        errors.push(ValidationError::new(
            "invoice_number",
            "invoice_number is required and must be non-empty",
        ));
    }

    // 2. 格式检查 (仅在字段出现时); 松散载荷里非字符串也算格式错误, 不得静默当缺失
    let mut email: Option<String> = None;
    match raw.get("email").filter(|v| !v.is_null()) {
        Some(Value::String(s)) => {
            let t = s.trim();
            if !t.is_empty() {
                if email_regex().is_match(t) {
                    email = Some(t.to_string());
                } else {
                    errors.push(ValidationError::new(
                        "email",
                        format!("'{}' is not a valid email address", t),
                    ));
                }
            }
        }
        Some(other) => errors.push(ValidationError::new(
            "email",
            format!("'{}' is not a valid email address", other),
        )),
        None => {}
    }

    let mut invoice_date: Option<NaiveDate> = None;
    match raw.get("invoice_date").filter(|v| !v.is_null()) {
        Some(Value::String(s)) if s.trim().is_empty() => {}
        Some(Value::String(s)) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(parsed) => invoice_date = Some(parsed),
            Err(_) => errors.push(ValidationError::new(
                "invoice_date",
                format!("'{}' is not a valid date, expected YYYY-MM-DD", s.trim()),
            )),
        },
        Some(other) => errors.push(ValidationError::new(
            "invoice_date",
            format!("'{}' is not a valid date, expected YYYY-MM-DD", other),
        )),
        None => {}
    }

    let currency = match raw.get("currency").filter(|v| !v.is_null()) {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let upper = s.trim().to_uppercase();
            if KNOWN_CURRENCIES.contains(&upper.as_str()) {
                upper
            } else {
                errors.push(ValidationError::new(
                    "currency",
                    format!("'{}' is not a recognized 3-letter currency code", s.trim()),
                ));
                config.default_currency.clone()
            }
        }
        Some(Value::String(_)) | None => config.default_currency.clone(),
        Some(other) => {
            errors.push(ValidationError::new(
                "currency",
                format!("'{}' is not a recognized 3-letter currency code", other),
            ));
            config.default_currency.clone()
        }
    };

    // 3. 业务规则
    let mut total_amount: Option<BigDecimal> = None;
    match decimal_field(raw, "total_amount") {
        Some(Ok(v)) => {
            if v < BigDecimal::zero() {
                errors.push(ValidationError::new(
                    "total_amount",
                    "total_amount must be non-negative",
                ));
            } else {
                total_amount = Some(v);
            }
        }
        Some(Err(bad)) => errors.push(ValidationError::new(
            "total_amount",
            format!("'{}' is not a valid decimal amount", bad),
        )),
        None => {}
    }

    let items_before = errors.len();
    let line_items = collect_line_items(raw, &config.amount_tolerance, &mut errors);
    let items_ok = errors.len() == items_before;

    // 小计之和与总额一致性只在明细全部可解析时才有意义
    if items_ok && !line_items.is_empty() {
        if let Some(total) = &total_amount {
            let sum = line_items
                .iter()
                .fold(BigDecimal::zero(), |acc, i| acc + &i.subtotal);
            if (&sum - total).abs() > config.amount_tolerance {
                errors.push(ValidationError::new(
                    "line_items",
                    format!(
                        "sum of line item subtotals {} does not match total_amount {}",
                        sum, total
                    ),
                ));
            }
        }
    }

    match (errors.is_empty(), invoice_number) {
        (true, Some(number)) => {
            // 总额缺失时由明细小计推导
            let total = total_amount.unwrap_or_else(|| {
                line_items
                    .iter()
                    .fold(BigDecimal::zero(), |acc, i| acc + &i.subtotal)
            });
            Ok(NormalizedInvoice {
                vendor_name: str_field(raw, "vendor_name").unwrap_or("").to_string(),
                invoice_number: number.to_string(),
                invoice_date,
                total_amount: total,
                currency,
                email,
                line_items,
            })
        }
        _ => Err(errors),
    }
}

fn collect_line_items(
    raw: &Map<String, Value>,
    tolerance: &BigDecimal,
    errors: &mut Vec<ValidationError>,
) -> Vec<NormalizedLineItem> {
    let Some(items) = raw.get("line_items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let field = format!("line_items[{}]", idx);
        let Some(obj) = item.as_object() else {
            errors.push(ValidationError::new(&field, "line item must be an object"));
            continue;
        };

        let mut parts = Vec::with_capacity(3);
        for key in ["quantity", "unit_price", "subtotal"] {
            match obj.get(key).filter(|v| !v.is_null()).map(decimal_value) {
                Some(Ok(v)) => parts.push(v),
                Some(Err(bad)) => errors.push(ValidationError::new(
                    &field,
                    format!("'{}' is not a valid decimal for {}", bad, key),
                )),
                None => errors.push(ValidationError::new(&field, format!("{} is required", key))),
            }
        }
        let [quantity, unit_price, subtotal] = match <[BigDecimal; 3]>::try_from(parts) {
            Ok(p) => p,
            Err(_) => continue,
        };

        if (&quantity * &unit_price - &subtotal).abs() > *tolerance {
            errors.push(ValidationError::new(
                &field,
                format!(
                    "quantity {} x unit_price {} does not match subtotal {}",
                    quantity, unit_price, subtotal
                ),
            ));
            continue;
        }

        out.push(NormalizedLineItem {
            description: obj
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            quantity,
            unit_price,
            subtotal,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ValidationConfig {
        ValidationConfig {
            default_currency: "USD".to_string(),
            amount_tolerance: BigDecimal::from(1) / BigDecimal::from(100),
        }
    }

    fn as_map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("payload must be an object"),
        }
    }

    fn valid_payload() -> Map<String, Value> {
        as_map(json!({
            "vendor_name": "Acme Corp",
            "invoice_number": "INV-001",
            "invoice_date": "2026-03-15",
            "total_amount": "30.00",
            "currency": "usd",
            "email": "billing@acme.example.com",
            "line_items": [
                {"description": "Widget", "quantity": "2", "unit_price": "10.00", "subtotal": "20.00"},
                {"description": "Gadget", "quantity": 1, "unit_price": 10.0, "subtotal": 10.0}
            ]
        }))
    }

    #[test]
    fn accepts_valid_payload_and_normalizes() {
        let inv = validate(&valid_payload(), &config()).unwrap();
        assert_eq!(inv.invoice_number, "INV-001");
        assert_eq!(inv.currency, "USD");
        assert_eq!(inv.invoice_date, NaiveDate::from_ymd_opt(2026, 3, 15));
        assert_eq!(inv.total_amount, BigDecimal::from(30));
        assert_eq!(inv.line_items.len(), 2);
    }

    #[test]
    fn missing_invoice_number_reported_even_when_rest_is_valid() {
        let mut raw = valid_payload();
        raw.remove("invoice_number");
        let errors = validate(&raw, &config()).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "invoice_number"));
    }

    #[test]
    fn empty_invoice_number_is_missing() {
        let mut raw = valid_payload();
        raw.insert("invoice_number".into(), json!("   "));
        let errors = validate(&raw, &config()).unwrap_err();
        assert_eq!(errors[0].field, "invoice_number");
    }

    #[test]
    fn negative_total_amount_rejected() {
        let mut raw = valid_payload();
        raw.remove("line_items");
        raw.insert("total_amount".into(), json!("-0.01"));
        let errors = validate(&raw, &config()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "total_amount");
        assert!(errors[0].message.contains("non-negative"));
    }

    #[test]
    fn collects_all_errors_in_declaration_order() {
        let raw = as_map(json!({
            "email": "not-an-email",
            "invoice_date": "15/03/2026",
            "currency": "XXX",
            "total_amount": "-5"
        }));
        let errors = validate(&raw, &config()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "invoice_number",
                "email",
                "invoice_date",
                "currency",
                "total_amount"
            ]
        );
    }

    #[test]
    fn missing_currency_defaults() {
        let mut raw = valid_payload();
        raw.remove("currency");
        let inv = validate(&raw, &config()).unwrap();
        assert_eq!(inv.currency, "USD");
    }

    #[test]
    fn line_item_price_quantity_mismatch_rejected() {
        let mut raw = valid_payload();
        raw.insert(
            "line_items".into(),
            json!([{"description": "Widget", "quantity": "2", "unit_price": "10.00", "subtotal": "25.00"}]),
        );
        raw.insert("total_amount".into(), json!("25.00"));
        let errors = validate(&raw, &config()).unwrap_err();
        assert_eq!(errors[0].field, "line_items[0]");
    }

    #[test]
    fn subtotal_sum_within_tolerance_accepts() {
        let mut raw = valid_payload();
        raw.insert("total_amount".into(), json!("30.005"));
        assert!(validate(&raw, &config()).is_ok());
    }

    #[test]
    fn subtotal_sum_beyond_tolerance_rejects() {
        let mut raw = valid_payload();
        raw.insert("total_amount".into(), json!("31.00"));
        let errors = validate(&raw, &config()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "line_items");
    }

    #[test]
    fn total_amount_derived_from_items_when_absent() {
        let mut raw = valid_payload();
        raw.remove("total_amount");
        let inv = validate(&raw, &config()).unwrap();
        assert_eq!(inv.total_amount, BigDecimal::from(30));
    }

    #[test]
    fn non_string_format_fields_are_format_errors() {
        let mut raw = valid_payload();
        raw.insert("email".into(), json!(123));
        raw.insert("invoice_date".into(), json!(20260315));
        raw.insert("currency".into(), json!(840));
        let errors = validate(&raw, &config()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "invoice_date", "currency"]);
    }

    #[test]
    fn bad_email_rejected_good_email_passes() {
        let mut raw = valid_payload();
        raw.insert("email".into(), json!("a@b"));
        let errors = validate(&raw, &config()).unwrap_err();
        assert_eq!(errors[0].field, "email");
    }
}
