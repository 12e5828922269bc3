//! Per-cell field normalizers.
//!
//! Every function here is pure and idempotent: feeding a normalizer its own
//! output returns [`Outcome::Unchanged`]. The pipeline relies on that to make
//! cleaning a fixed point, and the dedup key relies on it to compare rows the
//! way they will look after cleaning.

use serde::{Deserialize, Serialize};

use crate::models::Value;

/// What a normalizer decided about one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unchanged,
    Changed(Value),
    /// The cell could not be normalized. `replacement` is what to store
    /// instead, or `None` to keep the original value.
    Invalid {
        reason: String,
        replacement: Option<Value>,
    },
}

impl Outcome {
    /// The value the cell ends up with.
    pub fn resolve(self, original: &Value) -> Value {
        match self {
            Outcome::Unchanged => original.clone(),
            Outcome::Changed(v) => v,
            Outcome::Invalid { replacement, .. } => replacement.unwrap_or_else(|| original.clone()),
        }
    }
}

/// What to do with a phone number that does not have 10 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhonePolicy {
    /// Replace with missing and flag the cell.
    #[default]
    Blank,
    /// Keep the original text and flag the cell.
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Case {
    #[default]
    Preserve,
    Title,
    Upper,
    Lower,
}

/// A per-field transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldTransform {
    /// Canonical `XXX-XXX-XXXX`.
    Phone {
        #[serde(default)]
        policy: PhonePolicy,
    },
    /// Strip `trim_chars` from both ends, then apply `case`.
    Text {
        #[serde(default)]
        trim_chars: String,
        #[serde(default)]
        case: Case,
    },
    /// Yes/no values to `Y` / `N`.
    Boolean,
    /// `$1,234.50` to a number.
    Currency,
}

impl FieldTransform {
    pub fn label(&self) -> &'static str {
        match self {
            FieldTransform::Phone { .. } => "phone",
            FieldTransform::Text { .. } => "text",
            FieldTransform::Boolean => "boolean",
            FieldTransform::Currency => "currency",
        }
    }

    pub fn apply(&self, value: &Value) -> Outcome {
        match self {
            FieldTransform::Phone { policy } => phone(value, *policy),
            FieldTransform::Text { trim_chars, case } => text(value, trim_chars, *case),
            FieldTransform::Boolean => boolean(value),
            FieldTransform::Currency => currency(value),
        }
    }
}

fn changed_unless_same(original: &Value, new: Value) -> Outcome {
    if &new == original {
        Outcome::Unchanged
    } else {
        Outcome::Changed(new)
    }
}

fn digits_of(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.chars().filter(char::is_ascii_digit).collect()),
        Value::Int(i) => Some(i.unsigned_abs().to_string()),
        _ => None,
    }
}

/// True if the cell holds exactly ten digits once punctuation is removed.
pub fn phone_is_valid(value: &Value) -> bool {
    digits_of(value).is_some_and(|d| d.len() == 10)
}

pub fn phone(value: &Value, policy: PhonePolicy) -> Outcome {
    if value.is_missing() {
        return Outcome::Unchanged;
    }
    let Some(digits) = digits_of(value) else {
        return Outcome::Invalid {
            reason: format!("{} value is not a phone number", value.kind()),
            replacement: match policy {
                PhonePolicy::Blank => Some(Value::Missing),
                PhonePolicy::Flag => None,
            },
        };
    };

    match digits.len() {
        // Placeholders like "Na--" carry no digits at all: that is a gap, not a bad number.
        0 => Outcome::Changed(Value::Missing),
        10 => changed_unless_same(
            value,
            Value::Text(format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..])),
        ),
        n => Outcome::Invalid {
            reason: format!("expected 10 digits, found {n}"),
            replacement: match policy {
                PhonePolicy::Blank => Some(Value::Missing),
                PhonePolicy::Flag => None,
            },
        },
    }
}

pub fn text(value: &Value, trim_chars: &str, case: Case) -> Outcome {
    let Value::Text(s) = value else {
        return Outcome::Unchanged;
    };
    let stripped = s
        .trim()
        .trim_matches(|c: char| trim_chars.contains(c))
        .trim();
    if stripped.is_empty() {
        return Outcome::Changed(Value::Missing);
    }
    let cased = match case {
        Case::Preserve => stripped.to_string(),
        Case::Upper => stripped.to_uppercase(),
        Case::Lower => stripped.to_lowercase(),
        Case::Title => title_case(stripped),
    };
    changed_unless_same(value, Value::Text(cased))
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Interpret a cell as yes/no. `None` when it is neither.
pub fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(1) => Some(true),
        Value::Int(0) => Some(false),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" | "t" | "1" => Some(true),
            "n" | "no" | "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn boolean(value: &Value) -> Outcome {
    if value.is_missing() {
        return Outcome::Unchanged;
    }
    match truthy(value) {
        Some(true) => changed_unless_same(value, Value::text("Y")),
        Some(false) => changed_unless_same(value, Value::text("N")),
        None => Outcome::Invalid {
            reason: "not a yes/no value".into(),
            replacement: None,
        },
    }
}

pub fn currency(value: &Value) -> Outcome {
    let Value::Text(s) = value else {
        return Outcome::Unchanged;
    };
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                Outcome::Changed(Value::Int(f as i64))
            } else {
                Outcome::Changed(Value::Float(f))
            }
        }
        _ => Outcome::Invalid {
            reason: "not a currency amount".into(),
            replacement: None,
        },
    }
}

/// Parts of an address line split as `street, state[, zip]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParts {
    pub street: String,
    pub state: String,
    pub zip: Option<String>,
}

/// Split on the first two commas. Needs at least a street and a state.
pub fn parse_address(line: &str) -> Option<AddressParts> {
    let mut parts = line.splitn(3, ',').map(str::trim);
    let street = parts.next().filter(|s| !s.is_empty())?;
    let state = parts.next().filter(|s| !s.is_empty())?;
    let zip = parts.next().filter(|s| !s.is_empty());
    Some(AddressParts {
        street: street.to_string(),
        state: state.to_string(),
        zip: zip.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_formats_ten_digits() {
        for raw in ["5551234567", "555-123-4567", "555.123.4567", "(555) 123 4567"] {
            let out = phone(&Value::text(raw), PhonePolicy::Blank).resolve(&Value::text(raw));
            assert_eq!(out, Value::text("555-123-4567"), "{raw}");
        }
    }

    #[test]
    fn test_phone_is_idempotent() {
        let v = Value::text("555-123-4567");
        assert_eq!(phone(&v, PhonePolicy::Blank), Outcome::Unchanged);
    }

    #[test]
    fn test_phone_placeholder_becomes_missing() {
        assert_eq!(
            phone(&Value::text("Na--"), PhonePolicy::Flag),
            Outcome::Changed(Value::Missing)
        );
    }

    #[test]
    fn test_invalid_phone_policy() {
        let v = Value::text("12345");
        match phone(&v, PhonePolicy::Blank) {
            Outcome::Invalid { replacement, reason } => {
                assert_eq!(replacement, Some(Value::Missing));
                assert!(reason.contains("found 5"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(phone(&v, PhonePolicy::Flag).resolve(&v), v);
    }

    #[test]
    fn test_name_cleaning_matches_messy_inputs() {
        let t = FieldTransform::Text {
            trim_chars: "123./_-".into(),
            case: Case::Title,
        };
        let cases = [("John123", "John"), ("Smith/_", "Smith"), ("bob--", "Bob"), ("JANE", "Jane")];
        for (raw, want) in cases {
            let v = Value::text(raw);
            assert_eq!(t.apply(&v).resolve(&v), Value::text(want), "{raw}");
        }
        assert_eq!(t.apply(&Value::text("Jane")), Outcome::Unchanged);
    }

    #[test]
    fn test_title_case_after_punctuation() {
        assert_eq!(title_case("o'brien-smith"), "O'Brien-Smith");
        assert_eq!(title_case(&title_case("mcDONALD")), "Mcdonald");
    }

    #[test]
    fn test_boolean_standardisation() {
        for (raw, want) in [("Yes", "Y"), ("TRUE", "Y"), ("N", "N"), ("FALSE", "N"), ("no", "N")] {
            let v = Value::text(raw);
            assert_eq!(boolean(&v).resolve(&v), Value::text(want), "{raw}");
        }
        assert!(matches!(boolean(&Value::text("maybe")), Outcome::Invalid { .. }));
        assert_eq!(boolean(&Value::text("Y")), Outcome::Unchanged);
    }

    #[test]
    fn test_currency_strips_symbols() {
        assert_eq!(currency(&Value::text("$365,817")), Outcome::Changed(Value::Int(365_817)));
        assert_eq!(currency(&Value::text("$1,234.50")), Outcome::Changed(Value::Float(1234.5)));
        assert!(matches!(currency(&Value::text("n/a")), Outcome::Invalid { .. }));
        assert_eq!(currency(&Value::Int(5)), Outcome::Unchanged);
    }

    #[test]
    fn test_parse_address() {
        let parts = parse_address("123 Main St, NY, 10001").unwrap();
        assert_eq!(parts.street, "123 Main St");
        assert_eq!(parts.state, "NY");
        assert_eq!(parts.zip.as_deref(), Some("10001"));
        let short = parse_address("1 Main ,NY").unwrap();
        assert_eq!((short.street.as_str(), short.state.as_str()), ("1 Main", "NY"));
        assert_eq!(short.zip, None);
        assert!(parse_address("no commas here").is_none());
        assert!(parse_address(", NY").is_none());
    }
}
