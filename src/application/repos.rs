//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::options::{Autoload, OptionId, OptionRecord};
use crate::domain::taxonomy::{NodeId, ObjectId, ObjectRelationship, TaxonomyNode, TermFields};

/// Persistence failure. `Clone` so one batched failure can reach every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Shape shared by every node listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermQuery {
    pub taxonomy: String,
    pub group: Option<i32>,
    pub parent_id: Option<NodeId>,
    pub keyword: Option<String>,
    pub excludes: Vec<NodeId>,
}

impl TermQuery {
    pub fn new(taxonomy: impl Into<String>) -> Self {
        Self {
            taxonomy: taxonomy.into(),
            group: None,
            parent_id: None,
            keyword: None,
            excludes: Vec::new(),
        }
    }
}

/// Node listing scoped to one content object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTermQuery {
    pub object_id: ObjectId,
    pub taxonomy: String,
    pub group: Option<i32>,
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelationship {
    pub object_id: ObjectId,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNodeParams {
    pub name: String,
    pub slug: String,
    pub taxonomy: String,
    pub description: String,
    pub parent_id: NodeId,
    pub group: i32,
    /// Relationship inserted in the same transaction as the node.
    pub relationship: Option<NewRelationship>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedNode {
    pub node: TaxonomyNode,
    pub relationship: Option<ObjectRelationship>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNodeParams {
    pub id: NodeId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parent_id: NodeId,
    pub group: i32,
}

#[async_trait]
pub trait TaxonomyRepo: Send + Sync {
    async fn find_node(
        &self,
        id: NodeId,
        fields: &TermFields,
    ) -> Result<Option<TaxonomyNode>, RepoError>;

    async fn find_by_slug(
        &self,
        taxonomy: &str,
        group: i32,
        slug: &str,
    ) -> Result<Option<TaxonomyNode>, RepoError>;

    async fn list_nodes(
        &self,
        query: &TermQuery,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError>;

    /// Children of every parent in `parent_ids`, in one round trip.
    async fn list_children(
        &self,
        parent_ids: &[NodeId],
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError>;

    async fn list_by_object(
        &self,
        query: &ObjectTermQuery,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError>;

    async fn list_relationships(
        &self,
        object_id: ObjectId,
    ) -> Result<Vec<ObjectRelationship>, RepoError>;
}

#[async_trait]
pub trait TaxonomyWriteRepo: Send + Sync {
    async fn create_node(&self, params: CreateNodeParams) -> Result<CreatedNode, RepoError>;

    async fn update_node(&self, params: UpdateNodeParams) -> Result<TaxonomyNode, RepoError>;

    /// Deletes nodes only; relationship rows are left untouched.
    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<u64, RepoError>;

    async fn create_relationship(
        &self,
        relationship: ObjectRelationship,
    ) -> Result<ObjectRelationship, RepoError>;

    async fn delete_relationship(
        &self,
        object_id: ObjectId,
        term_taxonomy_id: NodeId,
    ) -> Result<bool, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptionParams {
    pub option_name: String,
    pub option_value: String,
    pub autoload: Autoload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptionParams {
    pub id: OptionId,
    pub option_value: String,
    pub autoload: Autoload,
}

#[async_trait]
pub trait OptionsRepo: Send + Sync {
    /// Rows whose physical name is any of `names`, in one round trip.
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<OptionRecord>, RepoError>;

    async fn find_by_id(&self, id: OptionId) -> Result<Option<OptionRecord>, RepoError>;

    async fn list_autoload(&self) -> Result<Vec<OptionRecord>, RepoError>;

    async fn create_option(&self, params: CreateOptionParams) -> Result<OptionRecord, RepoError>;

    async fn update_option(&self, params: UpdateOptionParams) -> Result<OptionRecord, RepoError>;

    async fn delete_option(&self, id: OptionId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UserMetaRepo: Send + Sync {
    async fn find_user_meta(&self, user_id: i64, key: &str) -> Result<Option<String>, RepoError>;
}
