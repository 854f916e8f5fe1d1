use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("`{0}` is not a valid taxonomy name")]
    InvalidTaxonomy(String),
    #[error("unknown term field `{0}`")]
    UnknownField(String),
    #[error("option name must not be empty")]
    EmptyOptionName,
    #[error("option name `{name}` already carries the tenant prefix `{prefix}`")]
    PrefixedOptionName { name: String, prefix: String },
    #[error("role map is malformed: {message}")]
    MalformedRoleMap { message: String },
    #[error("hierarchy invariant violated: {message}")]
    Hierarchy { message: String },
}

impl DomainError {
    pub fn malformed_role_map(message: impl Into<String>) -> Self {
        Self::MalformedRoleMap {
            message: message.into(),
        }
    }

    pub fn hierarchy(message: impl Into<String>) -> Self {
        Self::Hierarchy {
            message: message.into(),
        }
    }
}
