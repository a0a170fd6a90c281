use crate::error::CoreError;
use crate::models::{EventException, EventTemplate, RecurringEventInstance, ResolvedInstance};
use crate::query::InstanceQuery;
use crate::repository::SqliteRepository;
use crate::resolver::resolve_all;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Ids per `IN (...)` list
const ID_CHUNK: usize = 500;

#[async_trait]
impl super::InstanceRepository for SqliteRepository {
    async fn find_instances(
        &self,
        query: &InstanceQuery,
    ) -> Result<Vec<ResolvedInstance>, CoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM recurring_event_instances WHERE organization_id = ");
        qb.push_bind(query.organization_id);
        qb.push(" AND actual_start_time >= ");
        qb.push_bind(query.from);
        qb.push(" AND actual_start_time < ");
        qb.push_bind(query.to);
        if !query.include_cancelled {
            qb.push(" AND is_cancelled = 0");
        }
        if !query.exclude_ids.is_empty() {
            qb.push(" AND id NOT IN (");
            let mut separated = qb.separated(", ");
            for id in &query.exclude_ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        qb.push(" ORDER BY actual_start_time, id");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let instances: Vec<RecurringEventInstance> =
            qb.build_query_as().fetch_all(self.pool()).await?;
        self.resolve_instances(instances).await
    }

    async fn find_instance(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ResolvedInstance>, CoreError> {
        let instance: Option<RecurringEventInstance> = sqlx::query_as(
            "SELECT * FROM recurring_event_instances WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(self.pool())
        .await?;

        match instance {
            Some(instance) => Ok(self.resolve_instances(vec![instance]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_instances_by_ids(
        &self,
        organization_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ResolvedInstance>, CoreError> {
        let mut instances = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT * FROM recurring_event_instances WHERE organization_id = ",
            );
            qb.push_bind(organization_id);
            qb.push(" AND id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            let rows: Vec<RecurringEventInstance> =
                qb.build_query_as().fetch_all(self.pool()).await?;
            instances.extend(rows);
        }
        instances.sort_by(|a, b| {
            a.actual_start_time
                .cmp(&b.actual_start_time)
                .then(a.id.cmp(&b.id))
        });
        self.resolve_instances(instances).await
    }

    async fn find_raw_instances_for_template(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<RecurringEventInstance>, CoreError> {
        let instances = sqlx::query_as(
            "SELECT * FROM recurring_event_instances WHERE base_template_id = $1 ORDER BY sequence_number",
        )
        .bind(template_id)
        .fetch_all(self.pool())
        .await?;
        Ok(instances)
    }
}

impl SqliteRepository {
    /// Loads the templates and exceptions of `instances` and resolves them in order.
    pub(crate) async fn resolve_instances(
        &self,
        instances: Vec<RecurringEventInstance>,
    ) -> Result<Vec<ResolvedInstance>, CoreError> {
        if instances.is_empty() {
            return Ok(Vec::new());
        }

        let template_ids: Vec<Uuid> = instances
            .iter()
            .map(|instance| instance.base_template_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let instance_ids: Vec<Uuid> = instances.iter().map(|instance| instance.id).collect();

        let mut templates = HashMap::new();
        for chunk in template_ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT * FROM event_templates WHERE id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            let rows: Vec<EventTemplate> = qb.build_query_as().fetch_all(self.pool()).await?;
            templates.extend(rows.into_iter().map(|template| (template.id, template)));
        }

        let mut exceptions = HashMap::new();
        for chunk in instance_ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT * FROM event_exceptions WHERE recurring_event_instance_id IN (",
            );
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            let rows: Vec<EventException> = qb.build_query_as().fetch_all(self.pool()).await?;
            exceptions.extend(
                rows.into_iter()
                    .map(|exception| (exception.recurring_event_instance_id, exception)),
            );
        }

        Ok(resolve_all(&instances, &templates, &exceptions))
    }
}
