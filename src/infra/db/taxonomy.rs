use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{
    CreateNodeParams, CreatedNode, ObjectTermQuery, RepoError, TaxonomyRepo, TaxonomyWriteRepo,
    TermQuery, UpdateNodeParams,
};
use crate::domain::taxonomy::{
    NodeId, ObjectId, ObjectRelationship, TaxonomyNode, TermField, TermFields,
};

use super::{PostgresRepositories, contains_pattern, map_sqlx_error, relationships};

const FULL_PROJECTION: &str =
    "t.id, t.name, t.slug, t.taxonomy, t.description, t.parent_id, t.term_group, t.count";

#[derive(sqlx::FromRow)]
struct TermRow {
    id: i64,
    name: String,
    slug: String,
    taxonomy: String,
    description: String,
    parent_id: i64,
    term_group: i32,
    count: i64,
}

impl From<TermRow> for TaxonomyNode {
    fn from(row: TermRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            taxonomy: row.taxonomy,
            description: row.description,
            parent_id: row.parent_id,
            group: row.term_group,
            count: row.count,
        }
    }
}

/// Select the requested columns; the rest come back as neutral literals so
/// every query decodes into the same row type.
fn push_projection(qb: &mut QueryBuilder<'_, Postgres>, fields: &TermFields) {
    let columns: Vec<&str> = TermField::all()
        .iter()
        .map(|field| {
            let selected = fields.contains(*field);
            match field {
                TermField::Id => "t.id",
                TermField::Taxonomy => "t.taxonomy",
                TermField::ParentId => "t.parent_id",
                TermField::Group => "t.term_group",
                TermField::Name if selected => "t.name",
                TermField::Name => "''::TEXT AS name",
                TermField::Slug if selected => "t.slug",
                TermField::Slug => "''::TEXT AS slug",
                TermField::Description if selected => "t.description",
                TermField::Description => "''::TEXT AS description",
                TermField::Count if selected => "t.count",
                TermField::Count => "0::BIGINT AS count",
            }
        })
        .collect();
    qb.push(columns.join(", "));
}

fn select_terms<'a>(fields: &TermFields) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    push_projection(&mut qb, fields);
    qb.push(" FROM terms t");
    qb
}

#[async_trait]
impl TaxonomyRepo for PostgresRepositories {
    async fn find_node(
        &self,
        id: NodeId,
        fields: &TermFields,
    ) -> Result<Option<TaxonomyNode>, RepoError> {
        let mut qb = select_terms(fields);
        qb.push(" WHERE t.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<TermRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TaxonomyNode::from))
    }

    async fn find_by_slug(
        &self,
        taxonomy: &str,
        group: i32,
        slug: &str,
    ) -> Result<Option<TaxonomyNode>, RepoError> {
        let sql = format!(
            "SELECT {FULL_PROJECTION} FROM terms t \
             WHERE t.taxonomy = $1 AND t.term_group = $2 AND t.slug = $3"
        );
        let row = sqlx::query_as::<_, TermRow>(&sql)
            .bind(taxonomy)
            .bind(group)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TaxonomyNode::from))
    }

    async fn list_nodes(
        &self,
        query: &TermQuery,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError> {
        let mut qb = select_terms(fields);
        qb.push(" WHERE t.taxonomy = ");
        qb.push_bind(query.taxonomy.clone());

        if let Some(group) = query.group {
            qb.push(" AND t.term_group = ");
            qb.push_bind(group);
        }
        if let Some(parent_id) = query.parent_id {
            qb.push(" AND t.parent_id = ");
            qb.push_bind(parent_id);
        }
        if let Some(keyword) = query.keyword.as_ref() {
            let pattern = contains_pattern(keyword);
            qb.push(" AND (t.name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(r" ESCAPE '\' OR t.slug ILIKE ");
            qb.push_bind(pattern);
            qb.push(r" ESCAPE '\')");
        }
        if !query.excludes.is_empty() {
            qb.push(" AND NOT (t.id = ANY(");
            qb.push_bind(query.excludes.clone());
            qb.push("))");
        }
        qb.push(" ORDER BY LOWER(t.name), t.id");

        let rows = qb
            .build_query_as::<TermRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaxonomyNode::from).collect())
    }

    async fn list_children(
        &self,
        parent_ids: &[NodeId],
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = select_terms(fields);
        qb.push(" WHERE t.parent_id = ANY(");
        qb.push_bind(parent_ids.to_vec());
        qb.push(") ORDER BY t.parent_id, LOWER(t.name), t.id");

        let rows = qb
            .build_query_as::<TermRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaxonomyNode::from).collect())
    }

    async fn list_by_object(
        &self,
        query: &ObjectTermQuery,
        fields: &TermFields,
    ) -> Result<Vec<TaxonomyNode>, RepoError> {
        let mut qb = select_terms(fields);
        qb.push(" INNER JOIN term_relationships r ON r.term_taxonomy_id = t.id WHERE r.object_id = ");
        qb.push_bind(query.object_id);
        qb.push(" AND t.taxonomy = ");
        qb.push_bind(query.taxonomy.clone());

        if let Some(group) = query.group {
            qb.push(" AND t.term_group = ");
            qb.push_bind(group);
        }
        if let Some(parent_id) = query.parent_id {
            qb.push(" AND t.parent_id = ");
            qb.push_bind(parent_id);
        }
        qb.push(" ORDER BY r.term_order, LOWER(t.name), t.id");

        let rows = qb
            .build_query_as::<TermRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaxonomyNode::from).collect())
    }

    async fn list_relationships(
        &self,
        object_id: ObjectId,
    ) -> Result<Vec<ObjectRelationship>, RepoError> {
        relationships::list_for_object(self.pool(), object_id).await
    }
}

#[async_trait]
impl TaxonomyWriteRepo for PostgresRepositories {
    async fn create_node(&self, params: CreateNodeParams) -> Result<CreatedNode, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO terms AS t (name, slug, taxonomy, description, parent_id, term_group) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {FULL_PROJECTION}"
        );
        let row = sqlx::query_as::<_, TermRow>(&sql)
            .bind(&params.name)
            .bind(&params.slug)
            .bind(&params.taxonomy)
            .bind(&params.description)
            .bind(params.parent_id)
            .bind(params.group)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut node = TaxonomyNode::from(row);
        let relationship = match params.relationship {
            Some(link) => {
                let (relationship, count) = relationships::insert(
                    &mut *tx,
                    ObjectRelationship {
                        object_id: link.object_id,
                        term_taxonomy_id: node.id,
                        order: link.order,
                    },
                )
                .await?;
                node.count = count;
                Some(relationship)
            }
            None => None,
        };

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(CreatedNode { node, relationship })
    }

    async fn update_node(&self, params: UpdateNodeParams) -> Result<TaxonomyNode, RepoError> {
        let sql = format!(
            "UPDATE terms AS t \
             SET name = $2, slug = $3, description = $4, parent_id = $5, term_group = $6 \
             WHERE t.id = $1 \
             RETURNING {FULL_PROJECTION}"
        );
        let row = sqlx::query_as::<_, TermRow>(&sql)
            .bind(params.id)
            .bind(&params.name)
            .bind(&params.slug)
            .bind(&params.description)
            .bind(params.parent_id)
            .bind(params.group)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_nodes(&self, ids: &[NodeId]) -> Result<u64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut deleted = 0;

        for id in ids {
            // Children move up to the deleted node's parent so the forest stays closed.
            sqlx::query(
                r#"
                UPDATE terms AS c
                SET parent_id = d.parent_id
                FROM terms AS d
                WHERE d.id = $1 AND c.parent_id = $1
                "#,
            )
            .bind(*id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            deleted += sqlx::query("DELETE FROM terms WHERE id = $1")
                .bind(*id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(deleted)
    }

    async fn create_relationship(
        &self,
        relationship: ObjectRelationship,
    ) -> Result<ObjectRelationship, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let (relationship, _) = relationships::insert(&mut *tx, relationship).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(relationship)
    }

    async fn delete_relationship(
        &self,
        object_id: ObjectId,
        term_taxonomy_id: NodeId,
    ) -> Result<bool, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let removed = relationships::remove(&mut *tx, object_id, term_taxonomy_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(removed)
    }
}
