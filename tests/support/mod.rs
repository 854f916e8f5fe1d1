//! In-memory repositories and a wired application for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arbor::application::guard::{Actor, CapabilityGuard, GuardConfig};
use arbor::application::options::OptionService;
use arbor::application::repos::{
    CreateNodeParams, CreateOptionParams, CreatedNode, ObjectTermQuery, OptionsRepo, RepoError,
    TaxonomyRepo, TaxonomyWriteRepo, TermQuery, UpdateNodeParams, UpdateOptionParams,
    UserMetaRepo,
};
use arbor::application::taxonomy::{TaxonomyConfig, TaxonomyService};
use arbor::cache::{CacheConfig, OptionCache};
use arbor::domain::options::{Autoload, OptionId, OptionNamespace, OptionRecord};
use arbor::domain::taxonomy::{
    NodeId, ObjectId, ObjectRelationship, TaxonomyNode, TermField, TermFields,
};
use async_trait::async_trait;

pub const ADMIN: Actor = Actor::User(1);
pub const SUBSCRIBER: Actor = Actor::User(2);

pub const ROLE_MAP: &str = r#"{
    "administrator": {
        "name": "Administrator",
        "capabilities": {"manage_options": true, "manage_categories": true}
    },
    "subscriber": {"capabilities": {"read": true}}
}"#;

#[derive(Default)]
struct State {
    options: Vec<OptionRecord>,
    next_option_id: OptionId,
    terms: BTreeMap<NodeId, TaxonomyNode>,
    next_term_id: NodeId,
    relationships: Vec<ObjectRelationship>,
    usermeta: HashMap<(i64, String), String>,
}

/// Implements every repository trait over one mutex-guarded state.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    option_reads: AtomicUsize,
    writes: AtomicUsize,
    children_calls: Mutex<Vec<Vec<NodeId>>>,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock")
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Insert an option row directly, as another process would.
    pub fn put_option(&self, name: &str, value: &str, autoload: Autoload) -> OptionRecord {
        let mut state = self.state();
        if let Some(row) = state.options.iter_mut().find(|row| row.option_name == name) {
            row.option_value = value.to_string();
            row.autoload = autoload;
            return row.clone();
        }
        state.next_option_id += 1;
        let record = OptionRecord {
            id: state.next_option_id,
            option_name: name.to_string(),
            option_value: value.to_string(),
            autoload,
        };
        state.options.push(record.clone());
        record
    }

    pub fn option_value(&self, name: &str) -> Option<String> {
        self.state()
            .options
            .iter()
            .find(|row| row.option_name == name)
            .map(|row| row.option_value.clone())
    }

    pub fn put_user_role(&self, user_id: i64, role: &str) {
        self.state()
            .usermeta
            .insert((user_id, "role".to_string()), role.to_string());
    }

    /// Insert a node directly, bypassing slug derivation and capability checks.
    pub fn put_term(&self, taxonomy: &str, name: &str, parent_id: NodeId, group: i32) -> TaxonomyNode {
        let mut state = self.state();
        state.next_term_id += 1;
        let node = TaxonomyNode {
            id: state.next_term_id,
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            taxonomy: taxonomy.to_string(),
            description: String::new(),
            parent_id,
            group,
            count: 0,
        };
        state.terms.insert(node.id, node.clone());
        node
    }

    pub fn term(&self, id: NodeId) -> Option<TaxonomyNode> {
        self.state().terms.get(&id).cloned()
    }

    pub fn term_count(&self) -> usize {
        self.state().terms.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state().relationships.len()
    }

    pub fn option_reads(&self) -> usize {
        self.option_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn children_calls(&self) -> Vec<Vec<NodeId>> {
        self.children_calls.lock().expect("calls lock").clone()
    }
}

fn project(node: &TaxonomyNode, fields: &TermFields) -> TaxonomyNode {
    let mut projected = node.clone();
    if !fields.contains(TermField::Name) {
        projected.name = String::new();
    }
    if !fields.contains(TermField::Slug) {
        projected.slug = String::new();
    }
    if !fields.contains(TermField::Description) {
        projected.description = String::new();
    }
    if !fields.contains(TermField::Count) {
        projected.count = 0;
    }
    projected
}

fn by_name(a: &TaxonomyNode, b: &TaxonomyNode) -> std::cmp::Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then(a.id.cmp(&b.id))
}

fn slug_taken(state: &State, taxonomy: &str, group: i32, slug: &str, except: Option<NodeId>) -> bool {
    state.terms.values().any(|node| {
        node.taxonomy == taxonomy
            && node.group == group
            && node.slug == slug
            && Some(node.id) != except
    })
}

fn adjust_count(state: &mut State, id: NodeId, delta: i64) -> i64 {
    match state.terms.get_mut(&id) {
        Some(node) => {
            node.count = (node.count + delta).max(0);
            node.count
        }
        None => 0,
    }
}

fn insert_relationship(
    state: &mut State,
    relationship: ObjectRelationship,
) -> Result<i64, RepoError> {
    let exists = state.relationships.iter().any(|edge| {
        edge.object_id == relationship.object_id
            && edge.term_taxonomy_id == relationship.term_taxonomy_id
    });
    if exists {
        return Err(RepoError::Duplicate {
            constraint: "term_relationships_pkey".to_string(),
        });
    }
    state.relationships.push(relationship);
    Ok(adjust_count(state, relationship.term_taxonomy_id, 1))
}

#[async_trait]
impl OptionsRepo for MemoryStore {
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<OptionRecord>, RepoError> {
        self.option_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state()
            .options
            .iter()
            .filter(|row| names.contains(&row.option_name))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: OptionId) -> Result<Option<OptionRecord>, RepoError> {
        Ok(self.state().options.iter().find(|row| row.id == id).cloned())
    }

    async fn list_autoload(&self) -> Result<Vec<OptionRecord>, RepoError> {
        self.option_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state()
            .options
            .iter()
            .filter(|row| row.autoload == Autoload::Yes)
            .cloned()
            .collect())
    }

    async fn create_option(&self, params: CreateOptionParams) -> Result<OptionRecord, RepoError> {
        self.record_write();
        let mut state = self.state();
        if state
            .options
            .iter()
            .any(|row| row.option_name == params.option_name)
        {
            return Err(RepoError::Duplicate {
                constraint: "options_option_name_key".to_string(),
            });
        }
        state.next_option_id += 1;
        let record = OptionRecord {
            id: state.next_option_id,
            option_name: params.option_name,
            option_value: params.option_value,
            autoload: params.autoload,
        };
        state.options.push(record.clone());
        Ok(record)
    }

    async fn update_option(&self, params: UpdateOptionParams) -> Result<OptionRecord, RepoError> {
        self.record_write();
        let mut state = self.state();
        let row = state
            .options
            .iter_mut()
            .find(|row| row.id == params.id)
            .ok_or(RepoError::NotFound)?;
        row.option_value = params.option_value;
        row.autoload = params.autoload;
        Ok(row.clone())
    }

    async fn delete_option(&self, id: OptionId) -> Result<(), RepoError> {
        self.record_write();
        let mut state = self.state();
        let before = state.options.len();
        state.options.retain(|row| row.id != id);
        if state.options.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserMetaRepo for MemoryStore {
    async fn find_user_meta(&self, user_id: i64, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self
            .state()
            .usermeta
            .get(&(user_id, key.to_string()))
            .cloned())
    }
}

#[async_trait]
impl TaxonomyRepo for MemoryStore {
    async fn find_node(
        &self,
        id: NodeId,
        fields: &TermFields,
    ) -> Result<Option<TaxonomyNode>, RepoError> {
        Ok(self.state().terms.get(&id).map(|node| project(node, fields)))
    }

    async fn find_by_slug(
        &self,
        taxonomy: &str,
        group: i32,
        slug: &str,
    ) -> Result<Option<TaxonomyNode>, RepoError> {
        Ok(self
            .state()
            .terms
            .values()
            .find(|node| node.taxonomy == taxonomy && node.group == group && node.slug == slug)
            .cloned())
    }

    async fn list_nodes(
        &self,
        query: &TermQuery,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError> {
        let keyword = query.keyword.as_ref().map(|keyword| keyword.to_lowercase());
        let mut nodes: Vec<TaxonomyNode> = self
            .state()
            .terms
            .values()
            .filter(|node| node.taxonomy == query.taxonomy)
            .filter(|node| query.group.is_none_or(|group| node.group == group))
            .filter(|node| query.parent_id.is_none_or(|parent| node.parent_id == parent))
            .filter(|node| {
                keyword.as_ref().is_none_or(|keyword| {
                    node.name.to_lowercase().contains(keyword.as_str())
                        || node.slug.to_lowercase().contains(keyword.as_str())
                })
            })
            .filter(|node| !query.excludes.contains(&node.id))
            .cloned()
            .collect();
        nodes.sort_by(by_name);
        Ok(nodes.iter().map(|node| project(node, fields)).collect())
    }

    async fn list_children(
        &self,
        parent_ids: &[NodeId],
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError> {
        self.children_calls
            .lock()
            .expect("calls lock")
            .push(parent_ids.to_vec());

        let mut nodes: Vec<TaxonomyNode> = self
            .state()
            .terms
            .values()
            .filter(|node| parent_ids.contains(&node.parent_id))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.parent_id.cmp(&b.parent_id).then_with(|| by_name(a, b)));
        Ok(nodes.iter().map(|node| project(node, fields)).collect())
    }

    async fn list_by_object(
        &self,
        query: &ObjectTermQuery,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError> {
        let state = self.state();
        let mut edges: Vec<ObjectRelationship> = state
            .relationships
            .iter()
            .filter(|edge| edge.object_id == query.object_id)
            .copied()
            .collect();
        edges.sort_by_key(|edge| edge.order);

        Ok(edges
            .iter()
            .filter_map(|edge| state.terms.get(&edge.term_taxonomy_id))
            .filter(|node| node.taxonomy == query.taxonomy)
            .filter(|node| query.group.is_none_or(|group| node.group == group))
            .filter(|node| query.parent_id.is_none_or(|parent| node.parent_id == parent))
            .map(|node| project(node, fields))
            .collect())
    }

    async fn list_relationships(
        &self,
        object_id: ObjectId,
    ) -> Result<Vec<ObjectRelationship>, RepoError> {
        let mut edges: Vec<ObjectRelationship> = self
            .state()
            .relationships
            .iter()
            .filter(|edge| edge.object_id == object_id)
            .copied()
            .collect();
        edges.sort_by_key(|edge| (edge.order, edge.term_taxonomy_id));
        Ok(edges)
    }
}

#[async_trait]
impl TaxonomyWriteRepo for MemoryStore {
    async fn create_node(&self, params: CreateNodeParams) -> Result<CreatedNode, RepoError> {
        self.record_write();
        let mut state = self.state();
        if slug_taken(&state, &params.taxonomy, params.group, &params.slug, None) {
            return Err(RepoError::Duplicate {
                constraint: "terms_taxonomy_term_group_slug_key".to_string(),
            });
        }

        state.next_term_id += 1;
        let mut node = TaxonomyNode {
            id: state.next_term_id,
            name: params.name,
            slug: params.slug,
            taxonomy: params.taxonomy,
            description: params.description,
            parent_id: params.parent_id,
            group: params.group,
            count: 0,
        };
        state.terms.insert(node.id, node.clone());

        let relationship = match params.relationship {
            Some(link) => {
                let relationship = ObjectRelationship {
                    object_id: link.object_id,
                    term_taxonomy_id: node.id,
                    order: link.order,
                };
                node.count = insert_relationship(&mut state, relationship)?;
                Some(relationship)
            }
            None => None,
        };

        Ok(CreatedNode { node, relationship })
    }

    async fn update_node(&self, params: UpdateNodeParams) -> Result<TaxonomyNode, RepoError> {
        self.record_write();
        let mut state = self.state();
        let taxonomy = state
            .terms
            .get(&params.id)
            .map(|node| node.taxonomy.clone())
            .ok_or(RepoError::NotFound)?;
        if slug_taken(&state, &taxonomy, params.group, &params.slug, Some(params.id)) {
            return Err(RepoError::Duplicate {
                constraint: "terms_taxonomy_term_group_slug_key".to_string(),
            });
        }

        let node = state.terms.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        node.name = params.name;
        node.slug = params.slug;
        node.description = params.description;
        node.parent_id = params.parent_id;
        node.group = params.group;
        Ok(node.clone())
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<u64, RepoError> {
        self.record_write();
        let mut state = self.state();
        let mut deleted = 0;
        for id in ids {
            let Some(removed) = state.terms.remove(id) else {
                continue;
            };
            for node in state.terms.values_mut() {
                if node.parent_id == removed.id {
                    node.parent_id = removed.parent_id;
                }
            }
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn create_relationship(
        &self,
        relationship: ObjectRelationship,
    ) -> Result<ObjectRelationship, RepoError> {
        self.record_write();
        let mut state = self.state();
        insert_relationship(&mut state, relationship)?;
        Ok(relationship)
    }

    async fn delete_relationship(
        &self,
        object_id: ObjectId,
        term_taxonomy_id: NodeId,
    ) -> Result<bool, RepoError> {
        self.record_write();
        let mut state = self.state();
        let before = state.relationships.len();
        state.relationships.retain(|edge| {
            !(edge.object_id == object_id && edge.term_taxonomy_id == term_taxonomy_id)
        });
        if state.relationships.len() == before {
            return Ok(false);
        }
        adjust_count(&mut state, term_taxonomy_id, -1);
        Ok(true)
    }
}

/// Services wired over one [`MemoryStore`] the way the binary wires them.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<OptionCache>,
    pub options: OptionService,
    pub taxonomy: TaxonomyService,
}

impl TestApp {
    /// User 1 is an administrator, user 2 a subscriber.
    pub fn new(prefix: &str) -> Self {
        Self::with_cache(prefix, CacheConfig::default())
    }

    pub fn with_cache(prefix: &str, cache_config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        store.put_option("user_roles", ROLE_MAP, Autoload::No);
        store.put_user_role(1, "administrator");
        store.put_user_role(2, "subscriber");

        let options_repo: Arc<dyn OptionsRepo> = store.clone();
        let user_meta: Arc<dyn UserMetaRepo> = store.clone();
        let reader: Arc<dyn TaxonomyRepo> = store.clone();
        let writer: Arc<dyn TaxonomyWriteRepo> = store.clone();

        let cache = Arc::new(OptionCache::new(
            options_repo.clone(),
            OptionNamespace::new(prefix),
            cache_config,
        ));
        let guard = CapabilityGuard::new(cache.clone(), user_meta, GuardConfig::default());

        Self {
            options: OptionService::new(options_repo, cache.clone(), guard.clone()),
            taxonomy: TaxonomyService::new(
                reader,
                writer,
                cache.clone(),
                guard,
                TaxonomyConfig::default(),
            ),
            store,
            cache,
        }
    }
}
