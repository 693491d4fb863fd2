// Oura stress and recovery tool

use crate::error::ToolError;
use crate::integrations::OuraClient;
use crate::protocol::{ToolResult, ToolSchema};
use crate::schema::{InputSchema, PropertySchema};
use crate::tools::Tool;
use chrono::{Duration, NaiveDate, Utc};
use mcpgate_core::credentials::env;
use serde::{Deserialize, Serialize};

const DEFAULT_DAYS: u64 = 7;
const MAX_DAYS: u64 = 30;

pub struct OuraStressRecoveryTool {
    client: Option<OuraClient>,
    /// Fixed "today", for tests
    today: Option<NaiveDate>,
}

impl OuraStressRecoveryTool {
    pub fn new(client: Option<OuraClient>) -> Self {
        Self {
            client,
            today: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

#[derive(Debug, Deserialize)]
struct StressArgs {
    #[serde(default)]
    days: Option<u64>,
}

#[derive(Debug, Serialize)]
struct DaySummary {
    date: String,
    stress_high: Option<i64>,
    recovery_high: Option<i64>,
    day_summary: Option<String>,
}

#[derive(Debug, Serialize)]
struct StressReport {
    period: String,
    total_days: usize,
    data: Vec<DaySummary>,
}

#[async_trait::async_trait]
impl Tool for OuraStressRecoveryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_oura_stress_recovery".to_string(),
            description: "Get daily stress and recovery data from Oura for the last N days"
                .to_string(),
            input_schema: InputSchema::object().optional(
                "days",
                PropertySchema::integer("Number of days to look back (default 7, max 30)")
                    .with_minimum(1.0),
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: StressArgs = serde_json::from_value(arguments)?;
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ToolError::Configuration(env::OURA_API_TOKEN.to_string()))?;

        let days = args.days.unwrap_or(DEFAULT_DAYS);
        let window = days.min(MAX_DAYS);
        let end = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let start = end - Duration::days(window as i64);

        let entries = client.read_stress_recovery(start, end).await?;
        if entries.is_empty() {
            return Ok(ToolResult::text(format!(
                "No stress/recovery data found for the last {} days",
                window
            )));
        }

        let data: Vec<DaySummary> = entries
            .into_iter()
            .map(|entry| DaySummary {
                date: entry.day,
                stress_high: entry.stress_high,
                recovery_high: entry.recovery_high,
                day_summary: entry.day_summary,
            })
            .collect();

        Ok(ToolResult::json(&StressReport {
            period: format!("{} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
            total_days: data.len(),
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgate_core::Secret;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn tool(server: &MockServer) -> OuraStressRecoveryTool {
        OuraStressRecoveryTool::new(Some(OuraClient::new(
            reqwest::Client::new(),
            &server.uri(),
            Secret::new("oura_test"),
        )))
        .with_today(today())
    }

    async fn mount_window(server: &MockServer, start: &str) {
        Mock::given(method("GET"))
            .and(path("/v2/usercollection/daily_stress"))
            .and(query_param("start_date", start))
            .and(query_param("end_date", "2024-06-30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"day": "2024-06-29", "stress_high": 5400, "recovery_high": 7200, "day_summary": "restored"},
                    {"day": "2024-06-30", "stress_high": null, "recovery_high": 900, "day_summary": null}
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_days_clamped_to_thirty() {
        let server = MockServer::start().await;
        mount_window(&server, "2024-05-31").await;

        let tool = tool(&server);
        let clamped = tool.execute(json!({"days": 45})).await.unwrap();
        let thirty = tool.execute(json!({"days": 30})).await.unwrap();

        assert!(!clamped.is_error);
        assert_eq!(clamped, thirty);

        let body: Value = serde_json::from_str(&clamped.text_content()).unwrap();
        assert_eq!(body["period"], "2024-05-31 to 2024-06-30");
        assert_eq!(body["total_days"], 2);
        assert_eq!(body["data"][0]["date"], "2024-06-29");
        assert_eq!(body["data"][0]["day_summary"], "restored");
    }

    #[tokio::test]
    async fn test_default_window_is_seven_days() {
        let server = MockServer::start().await;
        mount_window(&server, "2024-06-23").await;

        let tool = tool(&server);
        let omitted = tool.execute(json!({})).await.unwrap();
        let seven = tool.execute(json!({"days": 7})).await.unwrap();

        assert!(!omitted.is_error);
        assert_eq!(omitted, seven);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/usercollection/daily_stress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let result = tool(&server).execute(json!({"days": 3})).await.unwrap();
        assert_eq!(
            result.text_content(),
            "No stress/recovery data found for the last 3 days"
        );
    }

    #[tokio::test]
    async fn test_empty_window_is_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/usercollection/daily_stress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let tool = tool(&server);
        let clamped = tool.execute(json!({"days": 45})).await.unwrap();
        let thirty = tool.execute(json!({"days": 30})).await.unwrap();

        assert_eq!(clamped, thirty);
        assert_eq!(
            clamped.text_content(),
            "No stress/recovery data found for the last 30 days"
        );
    }

    #[tokio::test]
    async fn test_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/usercollection/daily_stress"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = tool(&server).execute(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "OURA API Error (401): invalid token");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let err = OuraStressRecoveryTool::new(None)
            .execute(json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OURA_API_TOKEN"));
    }
}
