//! Configuration options and the tenant namespace that aliases their keys.
//!
//! Every option has a *logical* name (`site_title`) and up to two *physical*
//! rows: one stored under the tenant prefix (`tenant_site_title`) and one stored
//! unprefixed. Both rows describe the same logical option; the prefixed row wins
//! whenever both exist. [`OptionNamespace`] owns that mapping so callers never
//! concatenate prefixes by hand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

pub type OptionId = i64;

/// Whether an option is part of the eager bulk fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "option_autoload", rename_all = "snake_case")]
pub enum Autoload {
    Yes,
    No,
}

impl Autoload {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl From<bool> for Autoload {
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

/// A physical option row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionRecord {
    pub id: OptionId,
    pub option_name: String,
    pub option_value: String,
    pub autoload: Autoload,
}

/// Which physical form a row was stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyForm {
    Unprefixed,
    Prefixed,
}

/// Maps logical option names to physical keys and back.
///
/// Any stored name that starts with the prefix is read as a prefixed row, so an
/// unprefixed row such as `tenant_foo` is only reachable as logical `foo`. For
/// the same reason [`OptionNamespace::normalize`] refuses logical names that
/// already carry the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionNamespace {
    prefix: String,
}

impl OptionNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical keys for a logical name, highest precedence first.
    pub fn physical_keys(&self, logical: &str) -> [String; 2] {
        [self.prefixed(logical), logical.to_string()]
    }

    pub fn prefixed(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, logical)
    }

    /// Trim and validate a logical option name.
    pub fn normalize(&self, name: &str) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyOptionName);
        }
        if !self.prefix.is_empty() && self.logical_name(trimmed).1 == KeyForm::Prefixed {
            return Err(DomainError::PrefixedOptionName {
                name: trimmed.to_string(),
                prefix: self.prefix.clone(),
            });
        }
        Ok(trimmed.to_string())
    }

    /// Resolve a stored row name back to its logical name.
    pub fn logical_name<'a>(&self, physical: &'a str) -> (&'a str, KeyForm) {
        if self.prefix.is_empty() {
            return (physical, KeyForm::Prefixed);
        }
        match physical.strip_prefix(self.prefix.as_str()) {
            Some(rest) if !rest.is_empty() => (rest, KeyForm::Prefixed),
            _ => (physical, KeyForm::Unprefixed),
        }
    }

    /// Pick the winning value among rows stored for the same logical name.
    pub fn resolve<'a, I>(&self, logical: &str, rows: I) -> Option<&'a OptionRecord>
    where
        I: IntoIterator<Item = &'a OptionRecord>,
    {
        rows.into_iter()
            .filter_map(|row| {
                let (name, form) = self.logical_name(&row.option_name);
                (name == logical).then_some((form, row))
            })
            .max_by_key(|(form, _)| *form)
            .map(|(_, row)| row)
    }

    /// Fold physical rows into a logical `name -> value` map, prefixed rows winning.
    pub fn fold_logical<'a, I>(&self, rows: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = &'a OptionRecord>,
    {
        let mut resolved: BTreeMap<String, (KeyForm, String)> = BTreeMap::new();
        for row in rows {
            let (name, form) = self.logical_name(&row.option_name);
            match resolved.get(name) {
                Some((existing, _)) if *existing >= form => {}
                _ => {
                    resolved.insert(name.to_string(), (form, row.option_value.clone()));
                }
            }
        }
        resolved
            .into_iter()
            .map(|(name, (_, value))| (name, value))
            .collect()
    }
}
