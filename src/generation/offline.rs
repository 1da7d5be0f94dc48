use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::client::{ModelClient, ModelRequest};
use super::error::GenerationError;

/// Stand-in used when no model credentials are configured. Always answers
/// with a single goblet squat prescription.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineModelClient;

#[async_trait]
impl ModelClient for OfflineModelClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<String, GenerationError> {
        debug!(schema = %request.schema_name, "invoke: offline stub plan");
        let plan = json!({
            "exercises": [{
                "type": "strength",
                "name": "Goblet Squat",
                "section": "working",
                "sets": 3,
                "reps": 10,
                "loadKg": 12,
                "rir": 2,
                "restSec": 90
            }],
            "reasons": "Offline development plan: no model credentials configured."
        });
        Ok(plan.to_string())
    }
}
