use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row layout of an entity in its table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Record<M> {
    pub attributes: M,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}
