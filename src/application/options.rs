use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::guard::{Actor, CapabilityGuard, GuardError};
use crate::application::repos::{CreateOptionParams, OptionsRepo, RepoError, UpdateOptionParams};
use crate::cache::OptionCache;
use crate::domain::capability::Capability;
use crate::domain::error::DomainError;
use crate::domain::options::{Autoload, OptionId, OptionRecord};

#[derive(Debug, Error)]
pub enum OptionError {
    #[error("{0}")]
    Validation(String),
    #[error("option `{name}` already exists")]
    Duplicate { name: String },
    #[error("you are not allowed to {}", .capability.description())]
    Forbidden { capability: Capability },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<GuardError> for OptionError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::Forbidden { capability } => Self::Forbidden { capability },
            GuardError::Repo(err) => Self::Repo(err),
            GuardError::Domain(err) => Self::Domain(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateOptionCommand {
    pub name: String,
    pub value: String,
    pub autoload: Autoload,
}

#[derive(Debug, Clone)]
pub struct UpdateOptionCommand {
    pub id: OptionId,
    pub value: String,
    pub autoload: Autoload,
}

/// Reads go through the shared [`OptionCache`]; writes require `manage_options`
/// and keep the cache coherent.
#[derive(Clone)]
pub struct OptionService {
    repo: Arc<dyn OptionsRepo>,
    cache: Arc<OptionCache>,
    guard: CapabilityGuard,
}

impl OptionService {
    pub fn new(repo: Arc<dyn OptionsRepo>, cache: Arc<OptionCache>, guard: CapabilityGuard) -> Self {
        Self { repo, cache, guard }
    }

    pub async fn get_value(&self, name: &str) -> Result<Option<String>, OptionError> {
        let name = self.cache.namespace().normalize(name)?;
        Ok(self.cache.get_value(&name).await?)
    }

    pub async fn autoload(&self) -> Result<BTreeMap<String, String>, OptionError> {
        Ok(self.cache.autoload_options().await?)
    }

    pub async fn find_by_id(
        &self,
        actor: Actor,
        id: OptionId,
    ) -> Result<Option<OptionRecord>, OptionError> {
        self.guard.require(actor, Capability::ManageOptions).await?;
        Ok(self.repo.find_by_id(id).await?)
    }

    /// Insert a new option under the tenant prefix.
    ///
    /// Rejected when the logical name already exists in either physical form.
    pub async fn create(
        &self,
        actor: Actor,
        command: CreateOptionCommand,
    ) -> Result<OptionRecord, OptionError> {
        self.guard.require(actor, Capability::ManageOptions).await?;

        let namespace = self.cache.namespace();
        let name = namespace.normalize(&command.name)?;
        let existing = self
            .repo
            .find_by_names(&namespace.physical_keys(&name))
            .await?;
        if !existing.is_empty() {
            return Err(OptionError::Duplicate { name });
        }

        let record = self
            .repo
            .create_option(CreateOptionParams {
                option_name: namespace.prefixed(&name),
                option_value: command.value,
                autoload: command.autoload,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => OptionError::Duplicate { name: name.clone() },
                other => OptionError::Repo(other),
            })?;

        self.cache.prime(&name, record.option_value.clone());
        info!(
            target = "application::options::create",
            option_id = record.id,
            option = record.option_name.as_str(),
            "option created"
        );
        Ok(record)
    }

    pub async fn update(
        &self,
        actor: Actor,
        command: UpdateOptionCommand,
    ) -> Result<OptionRecord, OptionError> {
        self.guard.require(actor, Capability::ManageOptions).await?;

        let existing = self.require_existing(command.id).await?;
        let record = self
            .repo
            .update_option(UpdateOptionParams {
                id: command.id,
                option_value: command.value,
                autoload: command.autoload,
            })
            .await?;

        self.cache.invalidate_physical(&existing.option_name);
        info!(
            target = "application::options::update",
            option_id = record.id,
            option = record.option_name.as_str(),
            "option updated"
        );
        Ok(record)
    }

    pub async fn delete(&self, actor: Actor, id: OptionId) -> Result<(), OptionError> {
        self.guard.require(actor, Capability::ManageOptions).await?;

        // The stored name carries the prefix; read it before the row is gone.
        let existing = self.require_existing(id).await?;
        self.repo.delete_option(id).await?;

        self.cache.invalidate_physical(&existing.option_name);
        info!(
            target = "application::options::delete",
            option_id = id,
            option = existing.option_name.as_str(),
            "option deleted"
        );
        Ok(())
    }

    pub async fn reset_cache(&self, actor: Actor) -> Result<(), OptionError> {
        self.guard.require(actor, Capability::ManageOptions).await?;
        self.cache.clear();
        info!(target = "application::options::reset_cache", "option cache reset");
        Ok(())
    }

    async fn require_existing(&self, id: OptionId) -> Result<OptionRecord, OptionError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| OptionError::Validation(format!("option {id} does not exist")))
    }
}
