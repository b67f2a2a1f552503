use super::ports::NearbyClient;
use crate::discovery::{NearbyPage, NearbyQuery};
use crate::error::{CurbsideError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

/// Queries a remote `GET /listings/nearby`.
pub struct HttpDiscoveryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiscoveryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn nearby_url(&self) -> String {
        format!("{}/listings/nearby", self.base_url)
    }
}

#[async_trait]
impl NearbyClient for HttpDiscoveryClient {
    async fn nearby(&self, query: &NearbyQuery) -> Result<NearbyPage> {
        let mut params = vec![
            ("lat", query.center.latitude.to_string()),
            ("lon", query.center.longitude.to_string()),
            ("radius", query.radius_m.to_string()),
            ("page", query.page.to_string()),
            ("pageSize", query.page_size.to_string()),
        ];
        if let Some(category) = query.category {
            params.push(("category", category.as_str().to_string()));
        }

        let resp = self.client.get(self.nearby_url()).query(&params).send().await?;
        let status = resp.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }
        let page = resp.error_for_status()?.json::<NearbyPage>().await?;
        Ok(page)
    }
}

/// Map a 400/503 from the server to the matching error, whether or not the
/// body is our JSON error shape. A 400 must never come back retryable.
fn rejection(status: StatusCode, body: &[u8]) -> CurbsideError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message.unwrap_or(b.error))
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or(status.as_str()).to_string());
    if status == StatusCode::SERVICE_UNAVAILABLE {
        CurbsideError::Storage(message)
    } else {
        CurbsideError::Validation(message)
    }
}
