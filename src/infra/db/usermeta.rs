use async_trait::async_trait;

use crate::application::repos::{RepoError, UserMetaRepo};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl UserMetaRepo for PostgresRepositories {
    async fn find_user_meta(&self, user_id: i64, key: &str) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT meta_value
            FROM usermeta
            WHERE user_id = $1 AND meta_key = $2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
