use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DispatchResult, NotificationEnvelope};

/// Delivers a built envelope to the push provider
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, envelope: &NotificationEnvelope) -> Result<DispatchResult>;
}
