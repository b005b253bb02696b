//! JSON decode boundary for backend output.
//!
//! Backends wrap JSON in code fences or surround it with prose. Every call
//! site that expects structured output goes through `decode_json`, and a
//! decode failure is a soft outcome the caller recovers from.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no JSON object found in backend output")]
    NoJsonFound,

    #[error("malformed JSON in backend output: {reason}")]
    Malformed { reason: String },
}

/// Decode the first JSON object found in `raw`.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let candidate = extract_object(raw).ok_or(DecodeError::NoJsonFound)?;
    serde_json::from_str(candidate).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
    })
}

fn extract_object(raw: &str) -> Option<&str> {
    let body = strip_fence(raw.trim());
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn strip_fence(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let after = &raw[open + 3..];
    // Skip a language tag such as `json`.
    let after = match after.find('\n') {
        Some(nl) if !after[..nl].contains('{') => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(close) => &after[..close],
        None => after,
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// An object survives any brace-free prose around it.
        #[test]
        fn prop_object_survives_surrounding_prose(
            map in prop::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 0..6),
            prefix in "[a-zA-Z .,:\n]{0,40}",
            suffix in "[a-zA-Z .,:\n]{0,40}",
        ) {
            let json = serde_json::to_string(&map).unwrap();
            let raw = format!("{}{}{}", prefix, json, suffix);
            let decoded: BTreeMap<String, String> = decode_json(&raw).unwrap();
            prop_assert_eq!(decoded, map);
        }
    }
}
