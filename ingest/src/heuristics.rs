//! Regex-based field extraction and credential detection (spec §4.5 step 2–3).

use regex::Regex;
use std::sync::OnceLock;

/// Fields an ingest caller may have left unset, to be filled heuristically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    /// Subject of the statement (`"user"`, `"project"`, a proper noun, …).
    pub entity: Option<String>,
    /// Attribute name (`"prefers"`, `"deadline"`, …).
    pub key: Option<String>,
    /// Attribute value.
    pub value: Option<String>,
}

fn templates() -> &'static [(Regex, &'static str)] {
    static TEMPLATES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TEMPLATES.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)^(?:i|we) (?:decided|chose|will use) (?:to )?(?P<value>.+)$").unwrap(),
                "decision",
            ),
            (
                Regex::new(r"(?i)^(?:always|never) (?P<value>.+)$").unwrap(),
                "rule",
            ),
            (
                Regex::new(r"(?i)^(?:i|the user) prefers? (?P<value>.+)$").unwrap(),
                "preference",
            ),
            (
                Regex::new(r"(?i)^(?P<entity>[a-z][\w\s]{0,30}?)'s (?P<key>[\w\s]{1,30}) (?:is|are) (?P<value>.+)$")
                    .unwrap(),
                "possessive",
            ),
        ]
    })
}

/// Fills `entity`/`key`/`value` from regex templates when the caller left
/// them unset. Never overwrites a caller-supplied field.
#[must_use]
pub fn extract_fields(text: &str, entity: Option<&str>, key: Option<&str>, value: Option<&str>) -> ExtractedFields {
    let mut out = ExtractedFields {
        entity: entity.map(str::to_string),
        key: key.map(str::to_string),
        value: value.map(str::to_string),
    };

    if out.entity.is_some() && out.key.is_some() && out.value.is_some() {
        return out;
    }

    for (pattern, kind) in templates() {
        let Some(caps) = pattern.captures(text.trim()) else {
            continue;
        };
        if out.value.is_none() {
            if let Some(m) = caps.name("value") {
                out.value = Some(m.as_str().trim().to_string());
            }
        }
        if out.entity.is_none() {
            out.entity = caps
                .name("entity")
                .map(|m| m.as_str().trim().to_string())
                .or_else(|| Some(kind.to_string()));
        }
        if out.key.is_none() {
            if let Some(m) = caps.name("key") {
                out.key = Some(m.as_str().trim().to_string());
            }
        }
        break;
    }

    out
}

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(sk-[a-z0-9]{20,}|ghp_[a-z0-9]{30,}|bearer\s+[a-z0-9._-]{20,}|[a-z0-9]{32,}|password\s*[:=]\s*\S+|api[_-]?key\s*[:=]\s*\S+)",
        )
        .unwrap()
    })
}

/// Whether `value` looks like a raw credential (spec §4.5 step 3, §3.4
/// invariant 6: a credential value is never stored in a fact row).
#[must_use]
pub fn looks_like_credential(value: &str) -> bool {
    credential_pattern().is_match(value)
}

fn service_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b([a-z][a-z0-9]{1,20})\s+(api[_ -]?key|password|token|secret)\b").unwrap())
}

/// Best-effort `(service, type, value)` split of credential-like text (spec
/// §4.5 step 3: "parse into `{service, type, value}`"). Falls back to a
/// generic service/type when no named service is recognized.
#[must_use]
pub fn parse_credential_fields(text: &str) -> crate::vault::CredentialFields {
    let value = credential_pattern()
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| text.trim().to_string());

    let (service, cred_type) = service_pattern()
        .captures(text)
        .map(|caps| {
            (
                caps[1].to_lowercase(),
                caps[2].to_lowercase().replace([' ', '-'], "_"),
            )
        })
        .unwrap_or_else(|| ("unknown".to_string(), "credential".to_string()));

    crate::vault::CredentialFields { service, cred_type, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_template_extracts_value() {
        let fields = extract_fields("We decided to use PostgreSQL for storage", None, None, None);
        assert_eq!(fields.entity.as_deref(), Some("decision"));
        assert_eq!(fields.value.as_deref(), Some("PostgreSQL for storage"));
    }

    #[test]
    fn possessive_template_extracts_entity_key_value() {
        let fields = extract_fields("Alice's timezone is PST", None, None, None);
        assert_eq!(fields.entity.as_deref(), Some("Alice"));
        assert_eq!(fields.key.as_deref(), Some("timezone"));
        assert_eq!(fields.value.as_deref(), Some("PST"));
    }

    #[test]
    fn caller_supplied_fields_are_never_overwritten() {
        let fields = extract_fields("We decided to use Rust", Some("team"), None, Some("Rust, explicitly"));
        assert_eq!(fields.entity.as_deref(), Some("team"));
        assert_eq!(fields.value.as_deref(), Some("Rust, explicitly"));
    }

    #[test]
    fn detects_api_key_like_values() {
        assert!(looks_like_credential("sk-abcdefghijklmnopqrstuvwxyz123456"));
        assert!(looks_like_credential("api_key: 9f8e7d6c5b4a3f2e1d0c"));
        assert!(!looks_like_credential("PostgreSQL"));
    }

    #[test]
    fn parses_named_service_and_type() {
        let fields = parse_credential_fields("stripe api key: sk-abcdefghijklmnopqrstuvwxyz123456");
        assert_eq!(fields.service, "stripe");
        assert_eq!(fields.cred_type, "api_key");
        assert_eq!(fields.value, "sk-abcdefghijklmnopqrstuvwxyz123456");
    }

    #[test]
    fn falls_back_to_unknown_service() {
        let fields = parse_credential_fields("sk-abcdefghijklmnopqrstuvwxyz123456");
        assert_eq!(fields.service, "unknown");
        assert_eq!(fields.cred_type, "credential");
    }
}
