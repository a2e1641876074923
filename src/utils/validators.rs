use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

// DDD + number, without country code: 10 digits landline, 11 digits mobile
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]{2}[0-9]{8,9}$").unwrap());

/// Largest amount accepted for a single charge.
pub static MAX_CHARGE_AMOUNT: Lazy<Decimal> = Lazy::new(|| Decimal::new(99_999_999, 2));

/// Canonical phone form stored on clients: digits only.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

pub fn validate_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount <= *MAX_CHARGE_AMOUNT && amount.scale() <= 2
}

pub fn sanitize_string(input: &str) -> String {
    input.trim().replace(['<', '>'], "")
}

/// Trimmed text, or `None` when nothing remains.
pub fn sanitize_optional(input: Option<&str>) -> Option<String> {
    input
        .map(sanitize_string)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("(11) 98765-4321"), "11987654321");
        assert_eq!(normalize_phone("+55 11 3333-4444"), "551133334444");
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("11987654321"));
        assert!(validate_phone("1133334444"));
        assert!(!validate_phone("987654321"));
        assert!(!validate_phone("551198765432100"));
        assert!(!validate_phone("01987654321"));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::from_str("150.00").unwrap()));
        assert!(validate_amount(Decimal::from_str("999999.99").unwrap()));
        assert!(!validate_amount(Decimal::from_str("1000000.00").unwrap()));
        assert!(!validate_amount(Decimal::ZERO));
        assert!(!validate_amount(Decimal::from_str("-5").unwrap()));
        assert!(!validate_amount(Decimal::from_str("10.001").unwrap()));
    }

    #[test]
    fn test_sanitize_optional() {
        assert_eq!(sanitize_optional(Some("  nota <b> ")), Some("nota b".to_string()));
        assert_eq!(sanitize_optional(Some("   ")), None);
        assert_eq!(sanitize_optional(None), None);
    }
}
