//! AppRegistry port - read access to registered apps.

use async_trait::async_trait;

use crate::domain::catalog::App;
use crate::domain::foundation::{AppId, DomainError};

/// Port for looking up apps registered by the surrounding admin system.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    /// Find an app by its ID.
    ///
    /// Returns `None` if the app is not registered.
    async fn find_by_id(&self, id: &AppId) -> Result<Option<App>, DomainError>;
}
