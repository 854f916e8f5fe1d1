//! Hierarchical taxonomy entities.
//!
//! A taxonomy node belongs to exactly one forest, identified by its taxonomy
//! discriminator (`category`, `tag`, or a custom string) and its integer group.
//! `parent_id == 0` marks a root. Relationship rows link content objects
//! (posts, pages, forms, links) to nodes and carry a sort order.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Identifier of a taxonomy node (`term_taxonomy_id` on relationship rows).
pub type NodeId = i64;

/// Identifier of a content object a node can be related to.
pub type ObjectId = i64;

/// Parent id used by root nodes.
pub const ROOT_PARENT: NodeId = 0;

/// Default partition for nodes that were not assigned a group.
pub const DEFAULT_GROUP: i32 = 0;

const MAX_TAXONOMY_CHARS: usize = 32;

/// Taxonomy discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Taxonomy(String);

impl Taxonomy {
    pub const CATEGORY: &'static str = "category";
    pub const TAG: &'static str = "tag";

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidTaxonomy(value));
        }
        if trimmed.chars().count() > MAX_TAXONOMY_CHARS
            || !trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::InvalidTaxonomy(value));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn category() -> Self {
        Self(Self::CATEGORY.to_string())
    }

    pub fn tag() -> Self {
        Self(Self::TAG.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Taxonomy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Taxonomy {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Taxonomy> for String {
    fn from(value: Taxonomy) -> Self {
        value.0
    }
}

/// A node of a taxonomy forest.
///
/// Columns that were not part of the requested [`TermFields`] projection are
/// left at their default value by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyNode {
    pub id: NodeId,
    pub name: String,
    pub slug: String,
    pub taxonomy: String,
    pub description: String,
    pub parent_id: NodeId,
    pub group: i32,
    pub count: i64,
}

impl TaxonomyNode {
    /// Whether this node lives in the forest identified by `taxonomy` and `group`.
    pub fn shares_forest(&self, taxonomy: &str, group: i32) -> bool {
        self.taxonomy == taxonomy && self.group == group
    }
}

/// Edge between a content object and a taxonomy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectRelationship {
    pub object_id: ObjectId,
    pub term_taxonomy_id: NodeId,
    pub order: i32,
}

/// Selectable node columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermField {
    Id,
    Name,
    Slug,
    Taxonomy,
    Description,
    ParentId,
    Group,
    Count,
}

impl TermField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Slug => "slug",
            Self::Taxonomy => "taxonomy",
            Self::Description => "description",
            Self::ParentId => "parent_id",
            Self::Group => "group",
            Self::Count => "count",
        }
    }

    pub fn all() -> &'static [TermField] {
        &[
            Self::Id,
            Self::Name,
            Self::Slug,
            Self::Taxonomy,
            Self::Description,
            Self::ParentId,
            Self::Group,
            Self::Count,
        ]
    }

    /// Columns every projection carries because hierarchy resolution needs them.
    pub fn structural() -> &'static [TermField] {
        &[Self::Id, Self::Taxonomy, Self::ParentId, Self::Group]
    }
}

impl std::str::FromStr for TermField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| DomainError::UnknownField(s.to_string()))
    }
}

/// Projection of node columns requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermFields(BTreeSet<TermField>);

impl TermFields {
    pub fn all() -> Self {
        Self(TermField::all().iter().copied().collect())
    }

    /// Only the structural columns.
    pub fn minimal() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, field: TermField) -> bool {
        self.0.contains(&field) || TermField::structural().contains(&field)
    }
}

impl Default for TermFields {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<TermField> for TermFields {
    fn from_iter<I: IntoIterator<Item = TermField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
