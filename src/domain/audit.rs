use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation/update timestamps carried by every persisted entity.
///
/// Never set by callers: the store calls [`Auditable::touch`] right before
/// each insert or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuditFields {
    /// Stamp `created_at` once, refresh `updated_at` every time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }
}

pub trait Auditable {
    fn audit(&self) -> &AuditFields;
    fn audit_mut(&mut self) -> &mut AuditFields;

    fn touch(&mut self, now: DateTime<Utc>) {
        self.audit_mut().touch(now);
    }
}

/// Touch a whole batch with one shared timestamp.
pub fn touch_all<T: Auditable>(rows: &mut [T], now: DateTime<Utc>) {
    for row in rows.iter_mut() {
        row.touch(now);
    }
}
