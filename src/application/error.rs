use std::error::Error as StdError;
use std::process::ExitCode;

use thiserror::Error;

use crate::application::options::OptionError;
use crate::application::taxonomy::TaxonomyError;
use crate::config::LoadError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Error message plus its `source()` chain, for terminal output.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn render(&self) -> String {
        format!("error: {}", self.messages.join("\n  caused by: "))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Options(#[from] OptionError),
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),
    #[error("resource not found")]
    NotFound,
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    /// Process exit status, following sysexits(3) where one fits.
    pub fn exit_status(&self) -> u8 {
        match self {
            AppError::NotFound => 1,
            AppError::Domain(_)
            | AppError::Options(OptionError::Validation(_) | OptionError::Duplicate { .. })
            | AppError::Taxonomy(
                TaxonomyError::Validation(_) | TaxonomyError::DuplicateRelationship { .. },
            ) => 65,
            AppError::Options(OptionError::Forbidden { .. })
            | AppError::Taxonomy(TaxonomyError::Forbidden { .. }) => 77,
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::Database { .. })
            | AppError::Options(OptionError::Repo(_))
            | AppError::Taxonomy(TaxonomyError::Repo(_)) => 69,
            AppError::Infra(InfraError::Io(_)) => 74,
            AppError::Options(OptionError::Domain(_))
            | AppError::Taxonomy(TaxonomyError::Domain(_))
            | AppError::Infra(InfraError::Telemetry(_)) => 70,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
