//! Two-stage decode pipeline
//!
//! Stage one is a strict JSON parse. If that fails, a fixed, ordered list of
//! repair transforms is applied to the raw text and the parse is attempted
//! exactly once more. Anything still unparseable is reported as corrupt.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

static TRAILING_COMMA: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r",(\s*[}\]])").ok());

/// Named text repair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTransform {
    /// Remove leading and trailing whitespace
    TrimWhitespace,
    /// Drop commas directly before `}` or `]`
    StripTrailingCommas,
}

impl RepairTransform {
    /// Transforms in application order
    pub const PIPELINE: [RepairTransform; 2] = [
        RepairTransform::TrimWhitespace,
        RepairTransform::StripTrailingCommas,
    ];

    /// Stable name for logs
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TrimWhitespace => "trim-whitespace",
            Self::StripTrailingCommas => "strip-trailing-commas",
        }
    }

    /// Apply to raw text
    #[must_use]
    pub fn apply(self, raw: &str) -> Cow<'_, str> {
        match self {
            Self::TrimWhitespace => Cow::Borrowed(raw.trim()),
            Self::StripTrailingCommas => match TRAILING_COMMA.as_ref() {
                Some(re) => re.replace_all(raw, "$1"),
                None => Cow::Borrowed(raw),
            },
        }
    }
}

/// Outcome of decoding a stored value
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Parsed on the first attempt
    Clean(Value),
    /// Parsed after repair; `canonical` is the re-encoded text to write back
    Repaired {
        /// Decoded value
        value: Value,
        /// Re-encoded JSON
        canonical: String,
        /// Transforms that changed the text
        applied: Vec<RepairTransform>,
    },
    /// Unrecoverable
    Corrupt {
        /// Parser message from the final attempt
        reason: String,
    },
}

/// Decode raw stored text
#[must_use]
pub fn decode(raw: &str) -> Decoded {
    if let Ok(value) = serde_json::from_str(raw) {
        return Decoded::Clean(value);
    }

    let mut text = raw.to_string();
    let mut applied = Vec::new();
    for transform in RepairTransform::PIPELINE {
        let next = transform.apply(&text);
        if next != text.as_str() {
            applied.push(transform);
            text = next.into_owned();
        }
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Decoded::Repaired {
            canonical: value.to_string(),
            value,
            applied,
        },
        Err(e) => Decoded::Corrupt {
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_input_is_untouched() {
        assert_eq!(decode(r#"{"a":[1,2]}"#), Decoded::Clean(json!({"a":[1,2]})));
    }

    #[test]
    fn trailing_commas_are_repaired() {
        match decode("  {\"a\":[1,2,],\"b\":{\"c\":3,\n},}  ") {
            Decoded::Repaired {
                value,
                canonical,
                applied,
            } => {
                assert_eq!(value, json!({"a":[1,2],"b":{"c":3}}));
                assert_eq!(canonical, r#"{"a":[1,2],"b":{"c":3}}"#);
                assert_eq!(
                    applied,
                    vec![
                        RepairTransform::TrimWhitespace,
                        RepairTransform::StripTrailingCommas
                    ]
                );
            }
            other => panic!("expected repair, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(decode("{not json"), Decoded::Corrupt { .. }));
        assert!(matches!(decode("plain text"), Decoded::Corrupt { .. }));
    }
}
