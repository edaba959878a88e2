//! HTTP client for the remote note service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CreatedNote, NotePayload, RemoteNote, RemoteNoteService};
use crate::config::{normalize_base_url, ClientConfig};
use crate::error::{Error, Result};
use crate::models::NoteId;
use crate::util::compact_text;

const LIST_PATH: &str = "/api/v1/note/getnotes";
const CREATE_PATH: &str = "/api/v1/note/createnote";
const NOTE_PATH: &str = "/api/v1/note";

#[derive(Clone)]
pub struct HttpNoteService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNoteService {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref())?,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.api_base_url()?, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn note_url(&self, id: &NoteId) -> String {
        format!("{}{NOTE_PATH}/{}", self.base_url, id.as_str())
    }

    /// Send a request and unwrap the `{statusCode, data, message}` envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = request.header("Accept", "application/json").send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        let envelope = serde_json::from_str::<Envelope<T>>(&body)?;
        if let Some(code) = envelope.status_code {
            if !matches!(code, 200 | 201) {
                return Err(Error::Api {
                    status: code,
                    message: envelope
                        .message
                        .map_or_else(|| format!("status {code}"), |message| compact_text(&message)),
                });
            }
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl RemoteNoteService for HttpNoteService {
    async fn list(&self) -> Result<Vec<RemoteNote>> {
        tracing::debug!("GET {LIST_PATH}");
        let notes = self
            .send::<Vec<ServerNote>>(self.client.get(self.url(LIST_PATH)))
            .await?
            .unwrap_or_default();
        notes.into_iter().map(TryInto::try_into).collect()
    }

    async fn create(&self, payload: &NotePayload) -> Result<CreatedNote> {
        tracing::debug!("POST {CREATE_PATH}");
        let created = self
            .send::<ServerAck>(self.client.post(self.url(CREATE_PATH)).json(payload))
            .await?
            .ok_or_else(|| invalid_payload("create response did not include data"))?;

        let id = created
            .id
            .ok_or_else(|| invalid_payload("create response did not include _id"))?;
        Ok(CreatedNote {
            id: NoteId::server(id)?,
            updated_at: created.updated_at.unwrap_or_else(Utc::now),
        })
    }

    async fn update(&self, id: &NoteId, payload: &NotePayload) -> Result<DateTime<Utc>> {
        tracing::debug!("PUT {NOTE_PATH}/{id}");
        let updated = self
            .send::<ServerAck>(self.client.put(self.note_url(id)).json(payload))
            .await?;
        Ok(updated
            .and_then(|ack| ack.updated_at)
            .unwrap_or_else(Utc::now))
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        tracing::debug!("DELETE {NOTE_PATH}/{id}");
        self.send::<serde_json::Value>(self.client.delete(self.note_url(id)))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    status_code: Option<u16>,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerNote {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    synced: bool,
}

impl TryFrom<ServerNote> for RemoteNote {
    type Error = Error;

    fn try_from(value: ServerNote) -> Result<Self> {
        Ok(Self {
            id: NoteId::server(value.id)?,
            title: value.title,
            content: value.content,
            updated_at: value.updated_at.unwrap_or_else(Utc::now),
            synced: value.synced,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerAck {
    #[serde(rename = "_id", alias = "id")]
    id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn invalid_payload(message: &str) -> Error {
    Error::Api {
        status: StatusCode::OK.as_u16(),
        message: format!("invalid payload: {message}"),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
