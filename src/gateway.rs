//! Payment gateway boundary: MD5 request signing, callback verification and
//! notification parsing.
//!
//! The signature is `md5(k1=v1&k2=v2...&kN=vN + secret)` over every non-empty
//! parameter except `sign` and `sign_type`, with keys in ascending order.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use rust_decimal::Decimal;

use crate::{
    config::GatewayConfig,
    error::{AppError, AppResult},
};

pub type Params = BTreeMap<String, String>;

pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub correlation_id: String,
    pub trade_ref: String,
    /// Minor currency units.
    pub amount: i64,
    pub status: String,
}

impl Notification {
    pub fn is_success(&self) -> bool {
        self.status == TRADE_SUCCESS
    }
}

fn signing_string(params: &Params) -> String {
    params
        .iter()
        .filter(|(k, v)| !v.is_empty() && k.as_str() != "sign" && k.as_str() != "sign_type")
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sign(params: &Params, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(signing_string(params).as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_signature(params: &Params, secret: &str) -> bool {
    match params.get("sign") {
        Some(given) if !given.is_empty() => given.eq_ignore_ascii_case(&sign(params, secret)),
        _ => false,
    }
}

pub fn parse_notification(params: &Params) -> AppResult<Notification> {
    let field = |key: &str| -> AppResult<String> {
        params
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| AppError::BadRequest(format!("missing {key}")))
    };

    Ok(Notification {
        correlation_id: field("out_trade_no")?,
        trade_ref: field("trade_no")?,
        amount: parse_amount(&field("money")?)?,
        status: field("trade_status")?,
    })
}

/// Parse a two-decimal major-unit amount ("12.30") into minor units (1230).
pub fn parse_amount(raw: &str) -> AppResult<i64> {
    let invalid = || AppError::BadRequest(format!("invalid amount {raw:?}"));
    let value: Decimal = raw.trim().parse().map_err(|_| invalid())?;
    if value.is_sign_negative() || value.normalize().scale() > 2 {
        return Err(invalid());
    }
    let minor = value * Decimal::ONE_HUNDRED;
    i64::try_from(minor.trunc()).map_err(|_| invalid())
}

pub fn format_amount(minor: i64) -> String {
    Decimal::new(minor, 2).to_string()
}

/// Signed submit URL that sends the user to the gateway's checkout page.
pub fn payment_url(
    config: &GatewayConfig,
    correlation_id: &str,
    subject: &str,
    payable: i64,
) -> String {
    let mut params = Params::new();
    params.insert("pid".into(), config.merchant_id.clone());
    params.insert("type".into(), config.pay_type.clone());
    params.insert("out_trade_no".into(), correlation_id.to_string());
    params.insert("notify_url".into(), config.notify_url.clone());
    params.insert("return_url".into(), config.return_url.clone());
    params.insert("name".into(), subject.to_string());
    params.insert("money".into(), format_amount(payable));

    let signature = sign(&params, &config.secret_key);
    params.insert("sign".into(), signature);
    params.insert("sign_type".into(), "MD5".into());

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", config.submit_url, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(secret: &str) -> Params {
        let mut params = Params::new();
        params.insert("pid".into(), "1000".into());
        params.insert("out_trade_no".into(), "CS20250101000000abcdef123456".into());
        params.insert("trade_no".into(), "T9001".into());
        params.insert("money".into(), "12.30".into());
        params.insert("trade_status".into(), TRADE_SUCCESS.into());
        params.insert("param".into(), String::new());
        let signature = sign(&params, secret);
        params.insert("sign".into(), signature);
        params.insert("sign_type".into(), "MD5".into());
        params
    }

    #[test]
    fn signing_string_skips_empty_and_sign_fields() {
        let params = callback("k");
        assert_eq!(
            signing_string(&params),
            "money=12.30&out_trade_no=CS20250101000000abcdef123456&pid=1000&trade_no=T9001&trade_status=TRADE_SUCCESS"
        );
    }

    #[test]
    fn known_md5_vector() {
        let mut params = Params::new();
        params.insert("a".into(), "1".into());
        // md5("a=1") where the secret is empty
        assert_eq!(sign(&params, ""), "3872c9ae3f427af0be0ead09d07ae2cf");
    }

    #[test]
    fn verify_accepts_valid_and_rejects_tampered() {
        let mut params = callback("secret");
        assert!(verify_signature(&params, "secret"));
        assert!(!verify_signature(&params, "other"));

        params.insert("money".into(), "0.01".into());
        assert!(!verify_signature(&params, "secret"));

        params.remove("sign");
        assert!(!verify_signature(&params, "secret"));
    }

    #[test]
    fn uppercase_signature_is_accepted() {
        let mut params = callback("secret");
        let upper = params["sign"].to_uppercase();
        params.insert("sign".into(), upper);
        assert!(verify_signature(&params, "secret"));
    }

    #[test]
    fn parses_notification_fields() {
        let n = parse_notification(&callback("s")).unwrap();
        assert_eq!(n.trade_ref, "T9001");
        assert_eq!(n.amount, 1230);
        assert!(n.is_success());
    }

    #[test]
    fn missing_field_is_bad_request() {
        let mut params = callback("s");
        params.remove("trade_no");
        assert!(matches!(parse_notification(&params), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn amount_parsing() {
        assert_eq!(parse_amount("12.30").unwrap(), 1230);
        assert_eq!(parse_amount("5").unwrap(), 500);
        assert_eq!(parse_amount("0.01").unwrap(), 1);
        assert_eq!(parse_amount("7.50000").unwrap(), 750);
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("-1.00").is_err());
        assert!(parse_amount("abc").is_err());
        assert_eq!(format_amount(1230), "12.30");
        assert_eq!(format_amount(5), "0.05");
    }

    #[test]
    fn payment_url_is_signed_and_encoded() {
        let config = GatewayConfig {
            submit_url: "https://pay.example.com/submit.php".into(),
            merchant_id: "1000".into(),
            secret_key: "secret".into(),
            pay_type: "alipay".into(),
            notify_url: "https://shop.example.com/api/payments/notify".into(),
            return_url: "https://shop.example.com/".into(),
        };
        let url = payment_url(&config, "CS1", "Gift Card", 1990);
        assert!(url.starts_with("https://pay.example.com/submit.php?"));
        assert!(url.contains("money=19.90"));
        assert!(url.contains("name=Gift%20Card"));
        assert!(url.contains("sign_type=MD5"));
        assert!(url.contains("notify_url=https%3A%2F%2Fshop.example.com%2Fapi%2Fpayments%2Fnotify"));
    }
}
