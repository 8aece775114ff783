use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// The only action that makes a statement contribute role references
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("No policy document provided")]
    MissingDocument,

    #[error("Invalid policy document: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },
}

/// Deduplicated set of role ARNs, always iterated in ascending lexical order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a role set from an optional list, dropping duplicates
    pub fn dedup<I>(roles: Option<I>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        roles.into_iter().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[cfg(test)]
    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for RoleSet {
    fn extend<T: IntoIterator<Item = S>>(&mut self, iter: T) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for RoleSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Extract the roles a policy document allows assuming.
///
/// A missing document or one that is not valid JSON is an error. Anything
/// structurally unexpected below the document level (statements that are not
/// objects, missing `Effect`/`Action`/`Resource`, non-string values) simply
/// contributes nothing.
pub fn extract_roles(document: Option<&str>) -> Result<RoleSet, PolicyError> {
    let document = document.ok_or(PolicyError::MissingDocument)?;

    let mut roles = RoleSet::new();
    if document.trim().is_empty() {
        return Ok(roles);
    }

    let parsed: Value = serde_json::from_str(document)?;
    collect_roles(&parsed, &mut roles);
    Ok(roles)
}

fn collect_roles(document: &Value, roles: &mut RoleSet) {
    let Some(statements) = document.get("Statement").and_then(Value::as_array) else {
        return;
    };

    for statement in statements.iter().filter_map(Value::as_object) {
        if statement.get("Effect").and_then(Value::as_str) != Some("Allow") {
            continue;
        }

        let assumes_role = string_or_list(statement.get("Action"))
            .iter()
            .any(|action| *action == ASSUME_ROLE_ACTION);
        if !assumes_role {
            continue;
        }

        roles.extend(string_or_list(statement.get("Resource")));
    }
}

/// Policy fields may hold a single string or a list of strings
fn string_or_list(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}
