// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PII redaction for audit payloads.
//!
//! Dispatch is by key name only (case-insensitive), never by value, so
//! redacting an already-redacted document changes nothing.
//!
//! | Keys | Strategy | Example |
//! |------|----------|---------|
//! | `nik`, `no_ktp` | national id, 16 chars | `************3456` |
//! | `nip` | employee number, 18 chars | `**************5678` |
//! | `email` | first char + domain | `j***@example.com` |
//! | `telepon`, `phone`, `no_hp` | digits only, last 4 (4 or fewer: full mask) | `****7890` |
//! | `password`, `alamat`, `gaji`, ... | full mask | `****` |

use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::{Map, Value};

/// The full mask token.
pub const MASK: &str = "****";

const NATIONAL_ID_LEN: usize = 16;
const EMPLOYEE_NUMBER_LEN: usize = 18;
const VISIBLE_TAIL: usize = 4;

/// How a sensitive value is masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NationalId,
    EmployeeNumber,
    Email,
    Phone,
    FullMask,
}

impl Strategy {
    fn apply(self, value: &Value) -> Value {
        let Value::String(s) = value else {
            return Value::String(MASK.to_string());
        };
        Value::String(match self {
            Strategy::NationalId => mask_fixed(s, NATIONAL_ID_LEN),
            Strategy::EmployeeNumber => mask_fixed(s, EMPLOYEE_NUMBER_LEN),
            Strategy::Email => mask_email(s),
            Strategy::Phone => mask_phone(s),
            Strategy::FullMask => MASK.to_string(),
        })
    }
}

/// Key name → masking strategy.
#[derive(Debug, Clone)]
pub struct RedactionRules {
    rules: HashMap<String, Strategy>,
}

static STANDARD: LazyLock<RedactionRules> = LazyLock::new(RedactionRules::standard);

impl RedactionRules {
    /// The HR record rule set.
    pub fn standard() -> Self {
        let mut rules = HashMap::new();
        for key in ["nik", "no_ktp"] {
            rules.insert(key.to_string(), Strategy::NationalId);
        }
        rules.insert("nip".to_string(), Strategy::EmployeeNumber);
        rules.insert("email".to_string(), Strategy::Email);
        for key in ["telepon", "phone", "no_hp"] {
            rules.insert(key.to_string(), Strategy::Phone);
        }
        for key in [
            "password",
            "alamat",
            "gaji",
            "gaji_pokok",
            "no_rekening",
            "npwp",
            "tempat_lahir",
            "tanggal_lahir",
            "ibu_kandung",
            "token",
            "secret",
        ] {
            rules.insert(key.to_string(), Strategy::FullMask);
        }
        Self { rules }
    }

    /// Add or override a field.
    pub fn with_field(mut self, key: &str, strategy: Strategy) -> Self {
        self.rules.insert(key.to_lowercase(), strategy);
        self
    }

    pub fn strategy_for(&self, key: &str) -> Option<Strategy> {
        self.rules.get(&key.to_lowercase()).copied()
    }

    /// Redact a JSON document.
    ///
    /// Objects are walked at every depth, including objects inside arrays.
    /// A top-level value that is not an object (including `null`) is
    /// returned unchanged.
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_object(map)),
            other => other.clone(),
        }
    }

    fn redact_object(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let redacted = match self.strategy_for(key) {
                    Some(strategy) => strategy.apply(value),
                    None => self.redact_nested(value),
                };
                (key.clone(), redacted)
            })
            .collect()
    }

    fn redact_nested(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_object(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_nested(v)).collect()),
            other => other.clone(),
        }
    }
}

impl Default for RedactionRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Redact with the standard rule set.
pub fn redact(value: &Value) -> Value {
    STANDARD.redact(value)
}

/// `****` plus the last four characters, or just `****` for short values.
pub fn mask_tail(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= VISIBLE_TAIL {
        return MASK.to_string();
    }
    let tail: String = chars[chars.len() - VISIBLE_TAIL..].iter().collect();
    format!("{MASK}{tail}")
}

/// Mask prefix sized to the canonical length, keeping the last four.
///
/// Values of any other length fall back to [`mask_tail`].
pub fn mask_fixed(value: &str, canonical_len: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() != canonical_len {
        return mask_tail(value);
    }
    let tail: String = chars[canonical_len - VISIBLE_TAIL..].iter().collect();
    format!("{}{tail}", "*".repeat(canonical_len - VISIBLE_TAIL))
}

/// First character of the local part plus the full domain.
///
/// Anything that is not `local@domain` is fully masked.
pub fn mask_email(value: &str) -> String {
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return MASK.to_string();
    };
    let mut local_chars = local.chars();
    match (local_chars.next(), local_chars.next()) {
        (Some(first), Some(_)) => format!("{first}***@{domain}"),
        _ => format!("*@{domain}"),
    }
}

/// Digits only, keeping the last four behind the mask.
///
/// Four digits or fewer are fully masked, except a value that is already
/// in masked form, which is returned as is.
pub fn mask_phone(value: &str) -> String {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= VISIBLE_TAIL {
        let already_masked = digits.len() == VISIBLE_TAIL && value == format!("{MASK}{digits}");
        return if already_masked {
            value.to_string()
        } else {
            MASK.to_string()
        };
    }
    format!("{MASK}{}", &digits[digits.len() - VISIBLE_TAIL..])
}
