//! REST client for the authenticated org.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::ClientError;
use crate::query_validator;

/// REST API version all calls are pinned to.
pub const API_VERSION: &str = "v58.0";

/// Read-only client bound to one org instance and access token.
#[derive(Debug, Clone)]
pub struct SalesforceClient {
    http: reqwest::Client,
    instance_url: String,
    access_token: String,
}

impl SalesforceClient {
    pub fn new(instance_url: &str, access_token: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    /// Execute a SOQL query.
    ///
    /// The query is validated against the read-only rules first, and plain
    /// SELECTs without a LIMIT get `LIMIT 200` appended.
    pub async fn query(&self, soql: &str) -> Result<Value, ClientError> {
        query_validator::validate(soql)?;
        let soql = query_validator::apply_row_limit(soql);
        info!(%soql, "Executing SOQL query");

        let url = format!("{}/services/data/{API_VERSION}/query", self.instance_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("q", soql.as_str())])
            .send()
            .await?;
        self.read_response(response).await
    }

    /// Execute a SOSL search.
    pub async fn search(&self, sosl: &str) -> Result<Value, ClientError> {
        info!(%sosl, "Executing SOSL search");

        let url = format!("{}/services/data/{API_VERSION}/search/", self.instance_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("q", sosl)])
            .send()
            .await?;
        self.read_response(response).await
    }

    async fn read_response(&self, response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if body.contains("INVALID_SESSION_ID") {
            warn!("Org reported an invalid session");
            return Err(ClientError::SessionExpired);
        }
        error!(status = status.as_u16(), %body, "Request failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }
}
