//! Capability checks shared by every mutating service.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::{RepoError, UserMetaRepo};
use crate::cache::OptionCache;
use crate::domain::capability::{Capability, RoleMap};
use crate::domain::error::DomainError;

/// Identity a request runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(i64),
}

impl Actor {
    pub fn user_id(self) -> Option<i64> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("you are not allowed to {}", .capability.description())]
    Forbidden { capability: Capability },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Where the guard finds roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Logical option name holding the JSON role map.
    pub role_map_option: String,
    /// User metadata key holding a user's role slug.
    pub role_meta_key: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            role_map_option: "user_roles".to_string(),
            role_meta_key: "role".to_string(),
        }
    }
}

impl From<&crate::config::GuardSettings> for GuardConfig {
    fn from(settings: &crate::config::GuardSettings) -> Self {
        Self {
            role_map_option: settings.role_map_option.clone(),
            role_meta_key: settings.role_meta_key.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CapabilityGuard {
    options: Arc<OptionCache>,
    user_meta: Arc<dyn UserMetaRepo>,
    config: GuardConfig,
}

impl CapabilityGuard {
    pub fn new(
        options: Arc<OptionCache>,
        user_meta: Arc<dyn UserMetaRepo>,
        config: GuardConfig,
    ) -> Self {
        Self {
            options,
            user_meta,
            config,
        }
    }

    /// Succeeds only when `actor` holds `capability`.
    pub async fn require(&self, actor: Actor, capability: Capability) -> Result<(), GuardError> {
        let Some(user_id) = actor.user_id() else {
            debug!(capability = capability.as_str(), "anonymous actor rejected");
            return Err(GuardError::Forbidden { capability });
        };

        if self.capabilities_for(user_id).await?.contains(&capability) {
            return Ok(());
        }

        debug!(
            user_id,
            capability = capability.as_str(),
            "capability check failed"
        );
        Err(GuardError::Forbidden { capability })
    }

    /// Every capability granted to `user_id` through their role.
    pub async fn capabilities_for(&self, user_id: i64) -> Result<Vec<Capability>, GuardError> {
        let Some(role) = self
            .user_meta
            .find_user_meta(user_id, &self.config.role_meta_key)
            .await?
        else {
            return Ok(Vec::new());
        };

        let roles = self.role_map().await?;
        Ok(Capability::all()
            .iter()
            .copied()
            .filter(|capability| roles.grants(role.trim(), *capability))
            .collect())
    }

    async fn role_map(&self) -> Result<RoleMap, GuardError> {
        let Some(raw) = self.options.get_value(&self.config.role_map_option).await? else {
            return Ok(RoleMap::default());
        };

        RoleMap::parse(&raw).map_err(|err| {
            warn!(
                option = self.config.role_map_option.as_str(),
                error = %err,
                "role map option could not be decoded"
            );
            GuardError::from(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::{CreateOptionParams, OptionsRepo, UpdateOptionParams};
    use crate::cache::CacheConfig;
    use crate::domain::options::{Autoload, OptionId, OptionNamespace, OptionRecord};

    const ROLES: &str = r#"{
        "administrator": {"name": "Administrator", "capabilities": {"manage_options": true, "manage_categories": true}},
        "author": {"capabilities": {"edit_posts": true}}
    }"#;

    struct StaticOptions(Option<String>);

    #[async_trait]
    impl OptionsRepo for StaticOptions {
        async fn find_by_names(&self, names: &[String]) -> Result<Vec<OptionRecord>, RepoError> {
            Ok(self
                .0
                .iter()
                .filter(|_| names.iter().any(|name| name == "user_roles"))
                .map(|value| OptionRecord {
                    id: 1,
                    option_name: "user_roles".to_string(),
                    option_value: value.clone(),
                    autoload: Autoload::Yes,
                })
                .collect())
        }

        async fn find_by_id(&self, _id: OptionId) -> Result<Option<OptionRecord>, RepoError> {
            Ok(None)
        }

        async fn list_autoload(&self) -> Result<Vec<OptionRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn create_option(
            &self,
            _params: CreateOptionParams,
        ) -> Result<OptionRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn update_option(
            &self,
            _params: UpdateOptionParams,
        ) -> Result<OptionRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn delete_option(&self, _id: OptionId) -> Result<(), RepoError> {
            Err(RepoError::NotFound)
        }
    }

    struct StaticMeta(HashMap<i64, String>);

    #[async_trait]
    impl UserMetaRepo for StaticMeta {
        async fn find_user_meta(
            &self,
            user_id: i64,
            key: &str,
        ) -> Result<Option<String>, RepoError> {
            assert_eq!(key, "role");
            Ok(self.0.get(&user_id).cloned())
        }
    }

    fn guard_with(roles: Option<&str>) -> CapabilityGuard {
        let cache = OptionCache::new(
            Arc::new(StaticOptions(roles.map(str::to_string))),
            OptionNamespace::new("tenant_"),
            CacheConfig::default(),
        );
        let meta = StaticMeta(HashMap::from([
            (1, "administrator".to_string()),
            (2, "author".to_string()),
        ]));
        CapabilityGuard::new(Arc::new(cache), Arc::new(meta), GuardConfig::default())
    }

    #[tokio::test]
    async fn role_grants_are_honoured() {
        let guard = guard_with(Some(ROLES));
        assert!(
            guard
                .require(Actor::User(1), Capability::ManageCategories)
                .await
                .is_ok()
        );
        assert_eq!(
            guard
                .require(Actor::User(2), Capability::ManageCategories)
                .await,
            Err(GuardError::Forbidden {
                capability: Capability::ManageCategories
            })
        );
    }

    #[tokio::test]
    async fn anonymous_and_roleless_users_are_forbidden() {
        let guard = guard_with(Some(ROLES));
        assert!(matches!(
            guard.require(Actor::Anonymous, Capability::EditPosts).await,
            Err(GuardError::Forbidden { .. })
        ));
        assert!(matches!(
            guard.require(Actor::User(99), Capability::EditPosts).await,
            Err(GuardError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn missing_role_map_grants_nothing() {
        let guard = guard_with(None);
        assert!(guard.capabilities_for(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_role_map_is_an_error_not_a_denial() {
        let guard = guard_with(Some("{not json"));
        assert!(matches!(
            guard.require(Actor::User(1), Capability::ManageOptions).await,
            Err(GuardError::Domain(DomainError::MalformedRoleMap { .. }))
        ));
    }

    #[test]
    fn forbidden_message_describes_capability() {
        let err = GuardError::Forbidden {
            capability: Capability::ManageCategories,
        };
        assert_eq!(err.to_string(), "you are not allowed to manage categories and tags");
    }
}
