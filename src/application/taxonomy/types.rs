use serde::Serialize;

use crate::domain::taxonomy::{
    DEFAULT_GROUP, NodeId, ObjectId, ROOT_PARENT, Taxonomy, TaxonomyNode,
};

/// Service tuning read from the `[taxonomy]` settings section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyConfig {
    /// Logical option name holding the default category id.
    pub default_category_option: String,
    /// Levels expanded by [`super::TaxonomyService::tree`], roots included.
    pub max_tree_depth: usize,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            default_category_option: "default_category".to_string(),
            max_tree_depth: 16,
        }
    }
}

impl From<&crate::config::TaxonomySettings> for TaxonomyConfig {
    fn from(settings: &crate::config::TaxonomySettings) -> Self {
        Self {
            default_category_option: settings.default_category_option.clone(),
            max_tree_depth: settings.max_tree_depth,
        }
    }
}

/// Filters shared by every list flavour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub group: Option<i32>,
    pub parent_id: Option<NodeId>,
    pub keyword: Option<String>,
    pub excludes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNodeFilter {
    pub object_id: ObjectId,
    pub taxonomy: Taxonomy,
    pub group: Option<i32>,
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CreateNodeCommand {
    pub name: String,
    /// Derived from `name` when absent.
    pub slug: Option<String>,
    pub taxonomy: Taxonomy,
    pub description: String,
    pub parent_id: NodeId,
    pub group: i32,
    /// Content object to relate the new node to, atomically.
    pub object_id: Option<ObjectId>,
    pub order: i32,
}

impl CreateNodeCommand {
    pub fn new(taxonomy: Taxonomy, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            taxonomy,
            description: String::new(),
            parent_id: ROOT_PARENT,
            group: DEFAULT_GROUP,
            object_id: None,
            order: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateNodeCommand {
    pub id: NodeId,
    pub name: String,
    /// Keeps the stored slug when absent.
    pub slug: Option<String>,
    pub description: String,
    pub parent_id: NodeId,
    pub group: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipCommand {
    pub object_id: ObjectId,
    pub term_taxonomy_id: NodeId,
    pub order: i32,
}

/// A node with its resolved descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: TaxonomyNode,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}
