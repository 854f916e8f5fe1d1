//! `term_relationships` statements shared by the taxonomy adapter.
//!
//! Inserting or removing an edge adjusts the node's `count` inside the caller's
//! transaction.

use sqlx::{PgConnection, PgExecutor};

use crate::application::repos::RepoError;
use crate::domain::taxonomy::{NodeId, ObjectId, ObjectRelationship};

use super::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    object_id: i64,
    term_taxonomy_id: i64,
    term_order: i32,
}

impl From<RelationshipRow> for ObjectRelationship {
    fn from(row: RelationshipRow) -> Self {
        Self {
            object_id: row.object_id,
            term_taxonomy_id: row.term_taxonomy_id,
            order: row.term_order,
        }
    }
}

pub(super) async fn list_for_object<'e, E>(
    executor: E,
    object_id: ObjectId,
) -> Result<Vec<ObjectRelationship>, RepoError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, RelationshipRow>(
        r#"
        SELECT object_id, term_taxonomy_id, term_order
        FROM term_relationships
        WHERE object_id = $1
        ORDER BY term_order, term_taxonomy_id
        "#,
    )
    .bind(object_id)
    .fetch_all(executor)
    .await
    .map_err(map_sqlx_error)?;

    Ok(rows.into_iter().map(ObjectRelationship::from).collect())
}

/// Insert an edge and bump the node's usage counter. Returns the new counter.
pub(super) async fn insert(
    conn: &mut PgConnection,
    relationship: ObjectRelationship,
) -> Result<(ObjectRelationship, i64), RepoError> {
    let row = sqlx::query_as::<_, RelationshipRow>(
        r#"
        INSERT INTO term_relationships (object_id, term_taxonomy_id, term_order)
        VALUES ($1, $2, $3)
        RETURNING object_id, term_taxonomy_id, term_order
        "#,
    )
    .bind(relationship.object_id)
    .bind(relationship.term_taxonomy_id)
    .bind(relationship.order)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    let count = adjust_count(conn, relationship.term_taxonomy_id, 1).await?;
    Ok((row.into(), count))
}

/// Remove an edge; the node counter only moves when a row was deleted.
pub(super) async fn remove(
    conn: &mut PgConnection,
    object_id: ObjectId,
    term_taxonomy_id: NodeId,
) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"
        DELETE FROM term_relationships
        WHERE object_id = $1 AND term_taxonomy_id = $2
        "#,
    )
    .bind(object_id)
    .bind(term_taxonomy_id)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    adjust_count(conn, term_taxonomy_id, -1).await?;
    Ok(true)
}

/// Dangling edges (node already deleted) have no counter to adjust.
async fn adjust_count(
    conn: &mut PgConnection,
    term_taxonomy_id: NodeId,
    delta: i64,
) -> Result<i64, RepoError> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE terms
        SET count = GREATEST(count + $2, 0)
        WHERE id = $1
        RETURNING count
        "#,
    )
    .bind(term_taxonomy_id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    Ok(count.unwrap_or(0))
}
