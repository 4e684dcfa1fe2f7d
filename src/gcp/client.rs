//! GCP Client
//!
//! Combines credentials and the HTTP wrapper, and is the production
//! implementation of the collector's [`ResourceApi`].

use super::auth::{self, GcpCredentials};
use super::http::GcpHttpClient;
use crate::inventory::collector::ResourceApi;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Where access tokens come from
#[derive(Clone)]
enum TokenSource {
    Adc(GcpCredentials),
    Static(String),
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    tokens: TokenSource,
    http: GcpHttpClient,
}

impl GcpClient {
    /// Use `GOOGLE_OAUTH_ACCESS_TOKEN` when set, Application Default
    /// Credentials otherwise
    pub async fn new() -> Result<Self> {
        if let Some(token) = auth::static_token_from_env() {
            tracing::info!("Using access token from {}", auth::ACCESS_TOKEN_ENV);
            return Self::with_token(token);
        }

        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Ok(Self {
            tokens: TokenSource::Adc(credentials),
            http: GcpHttpClient::new()?,
        })
    }

    /// Client authenticating with a fixed bearer token
    pub fn with_token(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            tokens: TokenSource::Static(token.into()),
            http: GcpHttpClient::new()?,
        })
    }

    pub async fn get_token(&self) -> Result<String> {
        match &self.tokens {
            TokenSource::Adc(credentials) => credentials.get_token().await,
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }

    /// A fresh token when the error is an expired-token rejection
    async fn refreshed_after(&self, error: &anyhow::Error) -> Option<String> {
        let TokenSource::Adc(credentials) = &self.tokens else {
            return None;
        };
        if !format!("{:#}", error).contains("401") {
            return None;
        }
        credentials.refresh_token().await.ok()
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        match self.http.get(url, &token).await {
            Err(e) => match self.refreshed_after(&e).await {
                Some(token) => self.http.get(url, &token).await,
                None => Err(e),
            },
            ok => ok,
        }
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.get_token().await?;
        match self.http.post(url, &token, body).await {
            Err(e) => match self.refreshed_after(&e).await {
                Some(token) => self.http.post(url, &token, body).await,
                None => Err(e),
            },
            ok => ok,
        }
    }
}

#[async_trait]
impl ResourceApi for GcpClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.get(url).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        self.post(url, body).await
    }
}
