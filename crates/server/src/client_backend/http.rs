//! HTTP implementation of [`super::ClientBackend`]: calls the coordinator's
//! Request Router endpoints via `reqwest`.

use async_trait::async_trait;
use hishtory_data::{DeletionRequest, EncHistoryEntry, SubmitResponse};

use super::ClientBackend;
use crate::error::AppError;

pub struct HttpClientBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClientBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ClientBackend for HttpClientBackend {
    async fn register_device(&self, user_id: &str, device_id: &str) -> Result<(), AppError> {
        self.client
            .get(self.url("register"))
            .query(&[("user_id", user_id), ("device_id", device_id)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn bootstrap(&self, user_id: &str) -> Result<Vec<EncHistoryEntry>, AppError> {
        let entries = self
            .client
            .get(self.url("bootstrap"))
            .query(&[("user_id", user_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(entries)
    }

    async fn submit_entries(&self, entries: &[EncHistoryEntry], source_device_id: &str) -> Result<SubmitResponse, AppError> {
        let response = self
            .client
            .post(self.url("submit"))
            .query(&[("source_device_id", source_device_id)])
            .json(entries)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    async fn submit_dump(&self, entries: &[EncHistoryEntry], user_id: &str, requesting_device_id: &str, source_device_id: &str) -> Result<(), AppError> {
        self.client
            .post(self.url("submit-dump"))
            .query(&[("user_id", user_id), ("requesting_device_id", requesting_device_id), ("source_device_id", source_device_id)])
            .json(entries)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn query_entries(&self, user_id: &str, device_id: &str) -> Result<Vec<EncHistoryEntry>, AppError> {
        let entries = self
            .client
            .get(self.url("query"))
            .query(&[("user_id", user_id), ("device_id", device_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(entries)
    }

    async fn get_deletion_requests(&self, user_id: &str, device_id: &str) -> Result<Vec<DeletionRequest>, AppError> {
        let requests = self
            .client
            .get(self.url("get-deletion-requests"))
            .query(&[("user_id", user_id), ("device_id", device_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(requests)
    }

    async fn add_deletion_request(&self, request: DeletionRequest) -> Result<(), AppError> {
        self.client.post(self.url("add-deletion-request")).json(&request).send().await?.error_for_status()?;
        Ok(())
    }

    async fn uninstall(&self, user_id: &str, device_id: &str) -> Result<(), AppError> {
        self.client
            .post(self.url("uninstall"))
            .query(&[("user_id", user_id), ("device_id", device_id)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.client
            .get(format!("{}/healthcheck", self.base_url.trim_end_matches('/')))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
