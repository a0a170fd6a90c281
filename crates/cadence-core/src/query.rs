use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Range query over an organization's materialized instances.
///
/// An instance matches when its (post-exception) start falls in `[from, to)`.
/// Cancelled instances are left out unless `include_cancelled` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceQuery {
    pub organization_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub include_cancelled: bool,
    pub limit: Option<u32>,
    pub exclude_ids: Vec<Uuid>,
}

impl InstanceQuery {
    pub fn new(organization_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            organization_id,
            from,
            to,
            include_cancelled: false,
            limit: None,
            exclude_ids: Vec::new(),
        }
    }

    pub fn include_cancelled(mut self, include: bool) -> Self {
        self.include_cancelled = include;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }
}
