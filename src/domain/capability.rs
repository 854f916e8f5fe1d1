//! Capabilities and the role map that grants them.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Named permission required by a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageOptions,
    ManageCategories,
    ManageLinks,
    EditPosts,
    EditPages,
    EditForms,
}

impl Capability {
    /// Returns the slug stored in the role map.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageOptions => "manage_options",
            Self::ManageCategories => "manage_categories",
            Self::ManageLinks => "manage_links",
            Self::EditPosts => "edit_posts",
            Self::EditPages => "edit_pages",
            Self::EditForms => "edit_forms",
        }
    }

    /// Returns the human-readable description used in rejection messages.
    pub fn description(self) -> &'static str {
        match self {
            Self::ManageOptions => "manage site options",
            Self::ManageCategories => "manage categories and tags",
            Self::ManageLinks => "manage links",
            Self::EditPosts => "edit posts",
            Self::EditPages => "edit pages",
            Self::EditForms => "edit forms",
        }
    }

    pub fn all() -> &'static [Capability] {
        &[
            Self::ManageOptions,
            Self::ManageCategories,
            Self::ManageLinks,
            Self::EditPosts,
            Self::EditPages,
            Self::EditForms,
        ]
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|capability| capability.as_str() == s)
            .ok_or(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RoleDefinition {
    #[serde(default)]
    capabilities: BTreeMap<String, bool>,
}

/// Role name to granted capabilities, decoded from the JSON role-map option.
/// Keys other than `capabilities`, such as a display `name`, are ignored.
///
/// ```json
/// {"editor": {"name": "Editor", "capabilities": {"manage_categories": true}}}
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    roles: BTreeMap<String, RoleDefinition>,
}

impl RoleMap {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let roles: BTreeMap<String, RoleDefinition> = serde_json::from_str(raw)
            .map_err(|err| DomainError::malformed_role_map(err.to_string()))?;
        Ok(Self { roles })
    }

    pub fn grants(&self, role: &str, capability: Capability) -> bool {
        self.roles
            .get(role)
            .and_then(|definition| definition.capabilities.get(capability.as_str()))
            .copied()
            .unwrap_or(false)
    }
}
