use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::guard::{Actor, CapabilityGuard, GuardError};
use crate::application::repos::{
    CreateNodeParams, CreatedNode, NewRelationship, ObjectTermQuery, RepoError, TaxonomyRepo,
    TaxonomyWriteRepo, TermQuery, UpdateNodeParams,
};
use crate::cache::OptionCache;
use crate::domain::capability::Capability;
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, SlugLookupError, unique_slug};
use crate::domain::taxonomy::{
    NodeId, ObjectId, ObjectRelationship, ROOT_PARENT, Taxonomy, TaxonomyNode, TermFields,
};

use super::loader::{CascadeLoader, ChildrenRequest};
use super::types::{
    CreateNodeCommand, NodeFilter, ObjectNodeFilter, RelationshipCommand, TaxonomyConfig,
    TreeNode, UpdateNodeCommand,
};

const REQUIRED: Capability = Capability::ManageCategories;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("{0}")]
    Validation(String),
    #[error("you are not allowed to {}", .capability.description())]
    Forbidden { capability: Capability },
    #[error("object {object_id} is already related to term {term_taxonomy_id}")]
    DuplicateRelationship {
        object_id: ObjectId,
        term_taxonomy_id: NodeId,
    },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl TaxonomyError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<GuardError> for TaxonomyError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::Forbidden { capability } => Self::Forbidden { capability },
            GuardError::Repo(err) => Self::Repo(err),
            GuardError::Domain(err) => Self::Domain(err),
        }
    }
}

impl From<SlugLookupError<RepoError>> for TaxonomyError {
    fn from(error: SlugLookupError<RepoError>) -> Self {
        match error {
            SlugLookupError::Slug(SlugError::EmptyInput | SlugError::Unrepresentable { .. }) => {
                Self::validation("name cannot be turned into a slug")
            }
            SlugLookupError::Slug(SlugError::Exhausted { base }) => {
                Self::validation(format!("no free slug left for `{base}`"))
            }
            SlugLookupError::Lookup(err) => Self::Repo(err),
        }
    }
}

#[derive(Clone)]
pub struct TaxonomyService {
    reader: Arc<dyn TaxonomyRepo>,
    writer: Arc<dyn TaxonomyWriteRepo>,
    options: Arc<OptionCache>,
    guard: CapabilityGuard,
    config: TaxonomyConfig,
}

impl TaxonomyService {
    pub fn new(
        reader: Arc<dyn TaxonomyRepo>,
        writer: Arc<dyn TaxonomyWriteRepo>,
        options: Arc<OptionCache>,
        guard: CapabilityGuard,
        config: TaxonomyConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            options,
            guard,
            config,
        }
    }

    /// A fresh batching loader scoped to one caller operation.
    pub fn loader(&self) -> CascadeLoader {
        CascadeLoader::new(self.reader.clone())
    }

    pub async fn get(
        &self,
        id: NodeId,
        fields: &TermFields,
    ) -> Result<Option<TaxonomyNode>, TaxonomyError> {
        Ok(self.reader.find_node(id, fields).await?)
    }

    pub async fn list(
        &self,
        taxonomy: &Taxonomy,
        filter: NodeFilter,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, TaxonomyError> {
        let query = term_query(taxonomy, filter);
        Ok(self.reader.list_nodes(&query, fields).await?)
    }

    /// Category listing; hides the configured default category unless
    /// `include_default` is set.
    pub async fn list_categories(
        &self,
        mut filter: NodeFilter,
        include_default: bool,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, TaxonomyError> {
        if !include_default && let Some(default_id) = self.default_category_id().await? {
            filter.excludes.push(default_id);
        }
        self.list(&Taxonomy::category(), filter, fields).await
    }

    pub async fn list_tags(
        &self,
        filter: NodeFilter,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, TaxonomyError> {
        self.list(&Taxonomy::tag(), filter, fields).await
    }

    /// Expand a forest from its roots, one batched children lookup per level.
    pub async fn tree(
        &self,
        taxonomy: &Taxonomy,
        group: i32,
        fields: &TermFields,
    ) -> Result<Vec<TreeNode>, TaxonomyError> {
        let roots_filter = NodeFilter {
            group: Some(group),
            parent_id: Some(ROOT_PARENT),
            ..NodeFilter::default()
        };
        let roots = self.list(taxonomy, roots_filter, fields).await?;

        let loader = self.loader();
        let mut children: HashMap<NodeId, Vec<TaxonomyNode>> = HashMap::new();
        let mut frontier: Vec<NodeId> = roots.iter().map(|node| node.id).collect();
        let mut seen: HashSet<NodeId> = frontier.iter().copied().collect();

        for depth in 1..self.config.max_tree_depth {
            if frontier.is_empty() {
                break;
            }

            let levels = join_all(
                frontier
                    .iter()
                    .map(|id| loader.load(ChildrenRequest::new(*id, fields.clone()))),
            )
            .await;

            let mut next = Vec::new();
            for (parent_id, level) in frontier.iter().zip(levels) {
                let nodes: Vec<TaxonomyNode> = level?
                    .into_iter()
                    .filter(|node| node.shares_forest(taxonomy.as_str(), group))
                    .filter(|node| seen.insert(node.id))
                    .collect();
                next.extend(nodes.iter().map(|node| node.id));
                children.insert(*parent_id, nodes);
            }

            debug!(depth, expanded = next.len(), "taxonomy tree level resolved");
            frontier = next;
        }

        if !frontier.is_empty() {
            debug!(
                taxonomy = taxonomy.as_str(),
                group,
                max_depth = self.config.max_tree_depth,
                "taxonomy tree truncated"
            );
        }

        Ok(roots
            .into_iter()
            .map(|root| assemble(root, &mut children))
            .collect())
    }

    pub async fn list_by_object(
        &self,
        filter: ObjectNodeFilter,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, TaxonomyError> {
        let query = ObjectTermQuery {
            object_id: filter.object_id,
            taxonomy: filter.taxonomy.as_str().to_string(),
            group: filter.group,
            parent_id: filter.parent_id,
        };
        Ok(self.reader.list_by_object(&query, fields).await?)
    }

    /// Raw relationship rows for an object, including edges whose node is gone.
    pub async fn relationships_for_object(
        &self,
        object_id: ObjectId,
    ) -> Result<Vec<ObjectRelationship>, TaxonomyError> {
        Ok(self.reader.list_relationships(object_id).await?)
    }

    pub async fn create(
        &self,
        actor: Actor,
        command: CreateNodeCommand,
    ) -> Result<CreatedNode, TaxonomyError> {
        self.guard.require(actor, REQUIRED).await?;

        let name = non_empty(&command.name, "name")?;
        let taxonomy = command.taxonomy.as_str();
        self.ensure_parent(taxonomy, command.group, command.parent_id, None)
            .await?;

        let slug_source = command
            .slug
            .as_deref()
            .filter(|slug| !slug.trim().is_empty())
            .unwrap_or(&name);
        let slug = self
            .unique_slug(slug_source, taxonomy, command.group, None)
            .await?;

        let params = CreateNodeParams {
            name,
            slug,
            taxonomy: taxonomy.to_string(),
            description: command.description.trim().to_string(),
            parent_id: command.parent_id,
            group: command.group,
            relationship: command.object_id.map(|object_id| NewRelationship {
                object_id,
                order: command.order,
            }),
        };

        let created = self
            .writer
            .create_node(params)
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => {
                    TaxonomyError::validation("a term with this slug already exists")
                }
                other => TaxonomyError::Repo(other),
            })?;

        info!(
            target = "application::taxonomy::create",
            node_id = created.node.id,
            taxonomy,
            slug = created.node.slug.as_str(),
            object_id = ?command.object_id,
            "term created"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        actor: Actor,
        command: UpdateNodeCommand,
    ) -> Result<TaxonomyNode, TaxonomyError> {
        self.guard.require(actor, REQUIRED).await?;

        let existing = self.require_node(command.id).await?;
        let name = non_empty(&command.name, "name")?;
        self.ensure_parent(
            &existing.taxonomy,
            command.group,
            command.parent_id,
            Some(existing.id),
        )
        .await?;
        if command.group != existing.group {
            self.ensure_childless(existing.id).await?;
        }

        let slug_source = command
            .slug
            .as_deref()
            .filter(|slug| !slug.trim().is_empty())
            .unwrap_or(&existing.slug);
        let slug = self
            .unique_slug(slug_source, &existing.taxonomy, command.group, Some(existing.id))
            .await?;

        let node = self
            .writer
            .update_node(UpdateNodeParams {
                id: existing.id,
                name,
                slug,
                description: command.description.trim().to_string(),
                parent_id: command.parent_id,
                group: command.group,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => {
                    TaxonomyError::validation("a term with this slug already exists")
                }
                RepoError::NotFound => not_found(command.id),
                other => TaxonomyError::Repo(other),
            })?;

        info!(
            target = "application::taxonomy::update",
            node_id = node.id,
            slug = node.slug.as_str(),
            "term updated"
        );
        Ok(node)
    }

    /// Delete one node. Relationship rows pointing at it are kept.
    pub async fn delete(&self, actor: Actor, id: NodeId) -> Result<(), TaxonomyError> {
        self.bulk_delete(actor, &[id]).await.map(|_| ())
    }

    /// Delete several nodes at once. Relationship rows pointing at them are kept.
    pub async fn bulk_delete(&self, actor: Actor, ids: &[NodeId]) -> Result<u64, TaxonomyError> {
        self.guard.require(actor, REQUIRED).await?;

        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        if unique.is_empty() {
            return Err(TaxonomyError::validation("no term ids given"));
        }

        try_join_all(unique.iter().map(|id| self.require_node(*id))).await?;

        let deleted = self.writer.delete_nodes(&unique).await?;
        info!(
            target = "application::taxonomy::bulk_delete",
            requested = unique.len(),
            deleted,
            "terms deleted"
        );
        Ok(deleted)
    }

    pub async fn create_relationship(
        &self,
        actor: Actor,
        command: RelationshipCommand,
    ) -> Result<ObjectRelationship, TaxonomyError> {
        self.guard.require(actor, REQUIRED).await?;
        self.require_node(command.term_taxonomy_id).await?;

        let relationship = self
            .writer
            .create_relationship(ObjectRelationship {
                object_id: command.object_id,
                term_taxonomy_id: command.term_taxonomy_id,
                order: command.order,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => TaxonomyError::DuplicateRelationship {
                    object_id: command.object_id,
                    term_taxonomy_id: command.term_taxonomy_id,
                },
                other => TaxonomyError::Repo(other),
            })?;

        info!(
            target = "application::taxonomy::create_relationship",
            object_id = relationship.object_id,
            term_taxonomy_id = relationship.term_taxonomy_id,
            "relationship created"
        );
        Ok(relationship)
    }

    pub async fn delete_relationship(
        &self,
        actor: Actor,
        object_id: ObjectId,
        term_taxonomy_id: NodeId,
    ) -> Result<(), TaxonomyError> {
        self.guard.require(actor, REQUIRED).await?;

        if !self
            .writer
            .delete_relationship(object_id, term_taxonomy_id)
            .await?
        {
            return Err(TaxonomyError::validation(format!(
                "object {object_id} is not related to term {term_taxonomy_id}"
            )));
        }

        info!(
            target = "application::taxonomy::delete_relationship",
            object_id, term_taxonomy_id, "relationship deleted"
        );
        Ok(())
    }

    async fn default_category_id(&self) -> Result<Option<NodeId>, TaxonomyError> {
        let option = self.config.default_category_option.as_str();
        let Some(raw) = self.options.get_value(option).await? else {
            return Ok(None);
        };

        match raw.trim().parse::<NodeId>() {
            Ok(id) if id > 0 => Ok(Some(id)),
            _ => {
                warn!(option, value = raw.as_str(), "default category option is not a term id");
                Ok(None)
            }
        }
    }

    async fn require_node(&self, id: NodeId) -> Result<TaxonomyNode, TaxonomyError> {
        self.reader
            .find_node(id, &TermFields::all())
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Children share their parent's group, so a parent cannot switch groups alone.
    async fn ensure_childless(&self, id: NodeId) -> Result<(), TaxonomyError> {
        let children = self
            .reader
            .list_children(&[id], &TermFields::minimal())
            .await?;
        if !children.is_empty() {
            return Err(DomainError::hierarchy(format!(
                "term {id} has {} child term(s) and cannot change group",
                children.len()
            ))
            .into());
        }
        Ok(())
    }

    /// Parent must be a root marker or an existing node of the same forest that
    /// is not `node_id` itself or one of its descendants.
    async fn ensure_parent(
        &self,
        taxonomy: &str,
        group: i32,
        parent_id: NodeId,
        node_id: Option<NodeId>,
    ) -> Result<(), TaxonomyError> {
        if parent_id == ROOT_PARENT {
            return Ok(());
        }
        if parent_id < 0 {
            return Err(TaxonomyError::validation("parent id must not be negative"));
        }
        if node_id == Some(parent_id) {
            return Err(DomainError::hierarchy("a term cannot be its own parent").into());
        }

        let fields = TermFields::minimal();
        let parent = self
            .reader
            .find_node(parent_id, &fields)
            .await?
            .ok_or_else(|| TaxonomyError::validation(format!("parent term {parent_id} does not exist")))?;
        if !parent.shares_forest(taxonomy, group) {
            return Err(DomainError::hierarchy(format!(
                "parent term {parent_id} belongs to a different taxonomy or group"
            ))
            .into());
        }

        let Some(node_id) = node_id else {
            return Ok(());
        };

        let mut visited = HashSet::from([parent.id]);
        let mut cursor = parent.parent_id;
        while cursor != ROOT_PARENT {
            if cursor == node_id {
                return Err(DomainError::hierarchy(format!(
                    "moving term {node_id} under {parent_id} would create a cycle"
                ))
                .into());
            }
            if !visited.insert(cursor) {
                return Err(DomainError::hierarchy(format!(
                    "ancestors of term {parent_id} already form a cycle"
                ))
                .into());
            }
            match self.reader.find_node(cursor, &fields).await? {
                Some(ancestor) => cursor = ancestor.parent_id,
                None => break,
            }
        }

        Ok(())
    }

    async fn unique_slug(
        &self,
        source: &str,
        taxonomy: &str,
        group: i32,
        owner: Option<NodeId>,
    ) -> Result<String, TaxonomyError> {
        let reader = self.reader.clone();
        let taxonomy = taxonomy.to_string();
        let slug = unique_slug(source, move |candidate| {
            let reader = reader.clone();
            let taxonomy = taxonomy.clone();
            async move {
                reader
                    .find_by_slug(&taxonomy, group, &candidate)
                    .await
                    .map(|existing| existing.is_none_or(|node| Some(node.id) == owner))
            }
        })
        .await?;
        Ok(slug)
    }
}

fn term_query(taxonomy: &Taxonomy, filter: NodeFilter) -> TermQuery {
    TermQuery {
        taxonomy: taxonomy.as_str().to_string(),
        group: filter.group,
        parent_id: filter.parent_id,
        keyword: filter
            .keyword
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty()),
        excludes: filter.excludes,
    }
}

fn assemble(node: TaxonomyNode, children: &mut HashMap<NodeId, Vec<TaxonomyNode>>) -> TreeNode {
    let kids = children.remove(&node.id).unwrap_or_default();
    TreeNode {
        children: kids
            .into_iter()
            .map(|child| assemble(child, children))
            .collect(),
        node,
    }
}

fn non_empty(value: &str, field: &str) -> Result<String, TaxonomyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TaxonomyError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn not_found(id: NodeId) -> TaxonomyError {
    TaxonomyError::validation(format!("term {id} does not exist"))
}
