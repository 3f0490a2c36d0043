use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use serde_json::Value;
use url::Url;

/// The user's profile as returned by the provider; shape is provider-defined.
pub type UserProfile = Value;

/// Where the session store gets a profile for a fresh access token
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile>;
}

/// Client for the provider's `/userInfo` endpoint
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl UserInfoClient {
    pub fn new(config: &AuthConfig, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            endpoint: config.userinfo_endpoint()?,
        })
    }
}

#[async_trait]
impl ProfileSource for UserInfoClient {
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(access_token)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| AuthError::Http(format!("userinfo request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Http(format!("userinfo returned {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Http(format!("invalid userinfo response: {}", e)))
    }
}
