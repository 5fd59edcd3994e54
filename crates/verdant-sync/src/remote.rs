// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use verdant_app::PlantRecord;

use crate::error::{Result, SyncError};

/// Remote copy of a user's collection, stamped with the server's idea of
/// when it last changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    pub collection: Vec<PlantRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

/// Seam between the reconciler and whatever backend holds the remote copy.
pub trait CollectionRemote {
    /// `Ok(None)` means no snapshot exists yet for this user.
    fn fetch(&self, user_id: &str) -> Result<Option<RemoteSnapshot>>;

    /// Replace the remote snapshot wholesale; returns the server-assigned
    /// timestamp.
    fn upload(&self, user_id: &str, collection: &[PlantRecord]) -> Result<OffsetDateTime>;
}

/// HTTP implementation against the cloud collection store.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(SyncError::Parse("sync.base_url must not be empty".to_owned()));
        }
        if url::Url::parse(&base_url).is_err() {
            return Err(SyncError::Parse(format!(
                "sync.base_url {base_url:?} is not a valid URL"
            )));
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SyncError::Network(error.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token: token.to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn garden_url(&self, user_id: &str) -> String {
        format!("{}/gardens/{user_id}", self.base_url)
    }
}

impl CollectionRemote for HttpRemote {
    fn fetch(&self, user_id: &str) -> Result<Option<RemoteSnapshot>> {
        let response = self
            .http
            .get(self.garden_url(user_id))
            .bearer_auth(&self.token)
            .send()
            .map_err(|error| {
                SyncError::Network(format!("cannot reach {}: {error}", self.base_url))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response
            .text()
            .map_err(|error| SyncError::Network(error.to_string()))?;
        let snapshot: RemoteSnapshot = serde_json::from_str(&body)
            .map_err(|error| SyncError::Parse(format!("decode remote snapshot: {error}")))?;
        Ok(Some(snapshot))
    }

    fn upload(&self, user_id: &str, collection: &[PlantRecord]) -> Result<OffsetDateTime> {
        let response = self
            .http
            .put(self.garden_url(user_id))
            .bearer_auth(&self.token)
            .json(&UploadRequest { collection })
            .send()
            .map_err(|error| {
                SyncError::Network(format!("cannot reach {}: {error}", self.base_url))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response
            .text()
            .map_err(|error| SyncError::Network(error.to_string()))?;
        let receipt: UploadResponse = serde_json::from_str(&body)
            .map_err(|error| SyncError::Parse(format!("decode upload receipt: {error}")))?;
        Ok(receipt.last_updated)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    collection: &'a [PlantRecord],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(with = "time::serde::rfc3339")]
    last_updated: OffsetDateTime,
}

fn status_error(status: StatusCode, body: &str) -> SyncError {
    let message = clean_error_message(status, body);
    match status.as_u16() {
        401 | 403 => SyncError::Auth(message),
        402 | 429 => SyncError::Quota(message),
        code => SyncError::Api {
            status: code,
            message,
        },
    }
}

fn clean_error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<Envelope>(body)
        && let Some(error) = parsed.error
        && !error.is_empty()
    {
        return error;
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return body.trim().to_owned();
    }

    format!("server returned {}", status.as_u16())
}
