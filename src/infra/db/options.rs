use async_trait::async_trait;

use crate::application::repos::{CreateOptionParams, OptionsRepo, RepoError, UpdateOptionParams};
use crate::domain::options::{Autoload, OptionId, OptionRecord};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct OptionRow {
    id: i64,
    option_name: String,
    option_value: String,
    autoload: Autoload,
}

impl From<OptionRow> for OptionRecord {
    fn from(row: OptionRow) -> Self {
        Self {
            id: row.id,
            option_name: row.option_name,
            option_value: row.option_value,
            autoload: row.autoload,
        }
    }
}

#[async_trait]
impl OptionsRepo for PostgresRepositories {
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<OptionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, OptionRow>(
            r#"
            SELECT id, option_name, option_value, autoload
            FROM options
            WHERE option_name = ANY($1)
            "#,
        )
        .bind(names)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(OptionRecord::from).collect())
    }

    async fn find_by_id(&self, id: OptionId) -> Result<Option<OptionRecord>, RepoError> {
        let row = sqlx::query_as::<_, OptionRow>(
            r#"
            SELECT id, option_name, option_value, autoload
            FROM options
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(OptionRecord::from))
    }

    async fn list_autoload(&self) -> Result<Vec<OptionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, OptionRow>(
            r#"
            SELECT id, option_name, option_value, autoload
            FROM options
            WHERE autoload = $1
            ORDER BY option_name
            "#,
        )
        .bind(Autoload::Yes)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(OptionRecord::from).collect())
    }

    async fn create_option(&self, params: CreateOptionParams) -> Result<OptionRecord, RepoError> {
        let row = sqlx::query_as::<_, OptionRow>(
            r#"
            INSERT INTO options (option_name, option_value, autoload)
            VALUES ($1, $2, $3)
            RETURNING id, option_name, option_value, autoload
            "#,
        )
        .bind(&params.option_name)
        .bind(&params.option_value)
        .bind(params.autoload)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_option(&self, params: UpdateOptionParams) -> Result<OptionRecord, RepoError> {
        let row = sqlx::query_as::<_, OptionRow>(
            r#"
            UPDATE options
            SET option_value = $2, autoload = $3
            WHERE id = $1
            RETURNING id, option_name, option_value, autoload
            "#,
        )
        .bind(params.id)
        .bind(&params.option_value)
        .bind(params.autoload)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_option(&self, id: OptionId) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM options WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
