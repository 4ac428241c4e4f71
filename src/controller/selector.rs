//! Label selector evaluation
//!
//! Converts a `LabelSelector` from an Etcd spec into a matcher once per
//! reconciliation, so malformed expressions fail before any StatefulSet is
//! listed.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::In(key, values) => labels
                .get(key)
                .map(|v| values.iter().any(|want| want == v))
                .unwrap_or(false),
            Requirement::NotIn(key, values) => labels
                .get(key)
                .map(|v| !values.iter().any(|want| want == v))
                .unwrap_or(true),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// A parsed label selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMatcher {
    // None selects nothing, an empty list selects everything
    requirements: Option<Vec<Requirement>>,
}

impl LabelMatcher {
    /// Matcher that selects nothing
    pub fn nothing() -> Self {
        Self { requirements: None }
    }

    /// Build a matcher from an optional selector.
    ///
    /// A missing selector selects nothing; an empty one selects everything.
    ///
    /// # Errors
    ///
    /// Returns `Error::SelectorInvalid` for keys that are not qualified names,
    /// values that are not valid label values, unknown operators, `In`/`NotIn`
    /// without values and `Exists`/`DoesNotExist` with values.
    pub fn from_selector(selector: Option<&LabelSelector>) -> Result<Self> {
        let Some(selector) = selector else {
            return Ok(Self::nothing());
        };

        let mut requirements = Vec::new();

        if let Some(match_labels) = &selector.match_labels {
            for (key, value) in match_labels {
                validate_key(key)?;
                validate_value(key, value)?;
                requirements.push(Requirement::In(key.clone(), vec![value.clone()]));
            }
        }

        if let Some(expressions) = &selector.match_expressions {
            for expr in expressions {
                requirements.push(parse_requirement(expr)?);
            }
        }

        Ok(Self {
            requirements: Some(requirements),
        })
    }

    /// Whether the given labels satisfy every requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match &self.requirements {
            None => false,
            Some(requirements) => requirements.iter().all(|r| r.matches(labels)),
        }
    }

    pub fn selects_nothing(&self) -> bool {
        self.requirements.is_none()
    }
}

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Keys are qualified names: an optional DNS subdomain prefix and `/`,
/// then a name of up to 63 characters.
fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::SelectorInvalid(format!(
            "label key {:?} {}",
            key, reason
        )))
    };

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !is_dns_subdomain(prefix) {
            return invalid("has an invalid prefix");
        }
    }
    if name.is_empty() {
        return invalid("must have a non-empty name");
    }
    if name.len() > MAX_NAME_LEN || !is_label_name(name) {
        return invalid("must be at most 63 characters of [A-Za-z0-9_.-], beginning and ending alphanumeric");
    }
    Ok(())
}

/// Values are empty or follow the same rule as the name part of a key
fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.is_empty() || (value.len() <= MAX_NAME_LEN && is_label_name(value)) {
        return Ok(());
    }
    Err(Error::SelectorInvalid(format!(
        "value {:?} for label key {:?} must be empty or at most 63 characters of [A-Za-z0-9_.-], beginning and ending alphanumeric",
        value, key
    )))
}

fn is_label_name(s: &str) -> bool {
    starts_and_ends_alphanumeric(s)
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_dns_subdomain(s: &str) -> bool {
    s.split('.').all(|part| {
        starts_and_ends_alphanumeric(part)
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}

fn starts_and_ends_alphanumeric(s: &str) -> bool {
    match (s.chars().next(), s.chars().last()) {
        (Some(first), Some(last)) => first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric(),
        _ => false,
    }
}

fn parse_requirement(expr: &LabelSelectorRequirement) -> Result<Requirement> {
    validate_key(&expr.key)?;
    let values = expr.values.clone().unwrap_or_default();

    match expr.operator.as_str() {
        "In" | "NotIn" if values.is_empty() => Err(Error::SelectorInvalid(format!(
            "operator {} on key {:?} requires at least one value",
            expr.operator, expr.key
        ))),
        "In" | "NotIn" => {
            for value in &values {
                validate_value(&expr.key, value)?;
            }
            if expr.operator == "In" {
                Ok(Requirement::In(expr.key.clone(), values))
            } else {
                Ok(Requirement::NotIn(expr.key.clone(), values))
            }
        }
        "Exists" | "DoesNotExist" if !values.is_empty() => Err(Error::SelectorInvalid(format!(
            "operator {} on key {:?} takes no values",
            expr.operator, expr.key
        ))),
        "Exists" => Ok(Requirement::Exists(expr.key.clone())),
        "DoesNotExist" => Ok(Requirement::DoesNotExist(expr.key.clone())),
        other => Err(Error::SelectorInvalid(format!(
            "unknown operator {:?} on key {:?}",
            other, expr.key
        ))),
    }
}

/// Evaluate a selector against a label set in one step
pub fn matches(labels: &BTreeMap<String, String>, selector: Option<&LabelSelector>) -> Result<bool> {
    Ok(LabelMatcher::from_selector(selector)?.matches(labels))
}
