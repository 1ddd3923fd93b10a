use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use vitals_core::error::VitalsError;
use vitals_core::models::NewFoodItem;
use vitals_core::usda::{FoodRecord, SearchResponse, UsdaFood, record_to_food_item, summarize};

const API_BASE: &str = "https://api.nal.usda.gov/fdc/v1";
const SEARCH_PAGE_SIZE: &str = "25";

/// FoodData Central client. Every failure, including a missing API key,
/// surfaces as `VitalsError::Upstream`.
pub struct UsdaClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl UsdaClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, API_BASE)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "vitals/{} (health tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| VitalsError::upstream("USDA API key not configured").into())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let api_key = self.api_key()?;
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("api_key", api_key)])
            .query(query)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "USDA request failed");
                VitalsError::upstream("USDA request failed")
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, path, "USDA returned an error status");
            return Err(
                VitalsError::upstream(format!("USDA request failed ({})", status.as_u16())).into(),
            );
        }

        resp.json::<T>().await.map_err(|e| {
            warn!(error = %e, "USDA response could not be decoded");
            VitalsError::upstream("USDA response could not be decoded").into()
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<UsdaFood>> {
        let data: SearchResponse = self
            .get_json(
                "/foods/search",
                &[("query", query), ("pageSize", SEARCH_PAGE_SIZE)],
            )
            .await?;
        Ok(data.foods.iter().filter_map(summarize).collect())
    }

    pub async fn food(&self, fdc_id: i64) -> Result<FoodRecord> {
        self.get_json(&format!("/food/{fdc_id}"), &[]).await
    }

    /// Fetch a food and turn it into a per-100 g food item seed.
    pub async fn food_item(&self, fdc_id: i64) -> Result<NewFoodItem> {
        let record = self.food(fdc_id).await?;
        record_to_food_item(&record).ok_or_else(|| {
            VitalsError::upstream(format!("USDA food {fdc_id} has no description")).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_core::error::find_vitals_error;

    fn is_upstream(err: &anyhow::Error) -> bool {
        matches!(find_vitals_error(err), Some(VitalsError::Upstream(_)))
    }

    #[tokio::test]
    async fn test_missing_api_key_is_upstream() {
        let client = UsdaClient::new(None).unwrap();
        let err = client.search("apple").await.unwrap_err();
        assert!(is_upstream(&err));
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_upstream() {
        // Port 9 on loopback refuses connections
        let client =
            UsdaClient::with_base_url(Some("key".to_string()), "http://127.0.0.1:9/fdc/v1").unwrap();
        let err = client.food(171_705).await.unwrap_err();
        assert!(is_upstream(&err));
    }

    #[tokio::test]
    #[ignore = "requires network access and USDA_API_KEY"]
    async fn test_live_search() {
        let key = std::env::var("USDA_API_KEY").ok();
        let client = UsdaClient::new(key).unwrap();
        let foods = client.search("apple").await.unwrap();
        assert!(!foods.is_empty());
    }
}
