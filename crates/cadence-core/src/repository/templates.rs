use crate::error::CoreError;
use crate::models::EventTemplate;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::TemplateRepository for SqliteRepository {
    async fn find_template_by_id(&self, id: Uuid) -> Result<Option<EventTemplate>, CoreError> {
        let template = sqlx::query_as("SELECT * FROM event_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(template)
    }

    async fn find_templates_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<EventTemplate>, CoreError> {
        let templates = sqlx::query_as(
            "SELECT * FROM event_templates WHERE organization_id = $1 ORDER BY start_at, id",
        )
        .bind(organization_id)
        .fetch_all(self.pool())
        .await?;
        Ok(templates)
    }
}

impl SqliteRepository {
    pub(crate) async fn insert_template_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO event_templates (id, organization_id, name, description, location, all_day,
                is_public, is_registerable, is_invite_only, start_at, end_at, creator_id, updater_id,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(template.id)
        .bind(template.organization_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.location)
        .bind(template.all_day)
        .bind(template.is_public)
        .bind(template.is_registerable)
        .bind(template.is_invite_only)
        .bind(template.start_at)
        .bind(template.end_at)
        .bind(template.creator_id)
        .bind(template.updater_id)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn find_template_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<EventTemplate, CoreError> {
        sqlx::query_as("SELECT * FROM event_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Template with id {} not found", id)))
    }

    /// Writes the descriptive (non-time) fields of `template`.
    pub(crate) async fn update_template_fields_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template: &EventTemplate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE event_templates
            SET name = $1, description = $2, location = $3, all_day = $4, is_public = $5,
                is_registerable = $6, is_invite_only = $7, updater_id = $8, updated_at = $9
            WHERE id = $10"#,
        )
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.location)
        .bind(template.all_day)
        .bind(template.is_public)
        .bind(template.is_registerable)
        .bind(template.is_invite_only)
        .bind(template.updater_id)
        .bind(template.updated_at)
        .bind(template.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
