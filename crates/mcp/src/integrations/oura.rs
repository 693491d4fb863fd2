//! Oura v2 daily stress client.

use crate::error::ToolError;
use chrono::NaiveDate;
use mcpgate_core::Secret;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "OURA";

#[derive(Debug, Clone)]
pub struct OuraClient {
    client: reqwest::Client,
    base_url: String,
    token: Secret,
}

/// One day of the `daily_stress` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStress {
    pub day: String,
    #[serde(default)]
    pub stress_high: Option<i64>,
    #[serde(default)]
    pub recovery_high: Option<i64>,
    #[serde(default)]
    pub day_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl OuraClient {
    pub fn new(client: reqwest::Client, base_url: &str, token: Secret) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Daily stress and recovery between two dates, inclusive
    pub async fn read_stress_recovery(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStress>, ToolError> {
        let url = format!("{}/v2/usercollection/daily_stress", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose())
            .query(&[
                ("start_date", start.format("%Y-%m-%d").to_string()),
                ("end_date", end.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::upstream(SERVICE, response).await);
        }

        let collection: Collection<DailyStress> = response.json().await?;
        tracing::debug!(%start, %end, days = collection.data.len(), "Read Oura daily stress");
        Ok(collection.data)
    }
}
