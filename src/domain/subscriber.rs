//! Subscriber entity.
//!
//! One subscriber per `(app, appUserId)`, created lazily on first receipt
//! validation and never deleted by the reconciliation core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::{AppId, AppUserId, SubscriberId, Timestamp};

/// End user of an app, as known to the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub app_id: AppId,
    pub app_user_id: AppUserId,
    /// Free-form attributes supplied by the app.
    pub attributes: HashMap<String, String>,
    pub created_at: Timestamp,
}

impl Subscriber {
    /// Creates a new subscriber with no attributes.
    pub fn new(app_id: AppId, app_user_id: AppUserId) -> Self {
        Self {
            id: SubscriberId::new(),
            app_id,
            app_user_id,
            attributes: HashMap::new(),
            created_at: Timestamp::now(),
        }
    }
}
