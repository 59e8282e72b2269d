use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{BackendHealth, DiscoveryApi, SocialApi};
use crate::common::GeoPoint;
use crate::config::Config;
use crate::error::VibeError;
use crate::models::{ChatMessage, ConversationSummary, NearbyUser, NewMessage, Profile};

/// HTTP client for the hosted backend (PostgREST RPC, tables and storage).
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ConversationRow {
    id: String,
    #[serde(default)]
    messages: Vec<ConversationPreview>,
}

#[derive(Deserialize)]
struct ConversationPreview {
    content: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            access_token: config.access_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}", self.base_url, path)
    }

    // 所有请求都带上 apikey 和会话令牌（访客时使用 anon key）
    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        req.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    async fn check(response: Response) -> Result<Response, VibeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<PostgrestError>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or(body);
        tracing::debug!("Backend answered {}: {}", status, message);
        Err(VibeError::Backend(format!("{} {}", status.as_u16(), message)))
    }

    async fn rpc<T: DeserializeOwned>(&self, name: &str, args: Value) -> Result<T, VibeError> {
        let url = self.rest_url(&format!("rpc/{name}"));
        tracing::debug!("rpc {} {}", name, args);
        let response = self.authed(self.http.post(url)).json(&args).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// RPCs returning `void` answer with an empty body.
    async fn rpc_void(&self, name: &str, args: Value) -> Result<(), VibeError> {
        let url = self.rest_url(&format!("rpc/{name}"));
        tracing::debug!("rpc {} {}", name, args);
        let response = self.authed(self.http.post(url)).json(&args).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<(), VibeError> {
        let response = self
            .authed(self.http.post(self.rest_url(table)))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DiscoveryApi for SupabaseClient {
    async fn get_nearby_users(
        &self,
        point: GeoPoint,
        radius_meters: f64,
    ) -> Result<Vec<NearbyUser>, VibeError> {
        let rows: Option<Vec<NearbyUser>> = self
            .rpc(
                "get_nearby_users",
                json!({ "lat": point.lat, "lon": point.lon, "meters": radius_meters }),
            )
            .await
            .map_err(|e| VibeError::QueryFailed(e.reason()))?;
        Ok(rows.unwrap_or_default())
    }

    async fn update_my_location(&self, point: GeoPoint) -> Result<(), VibeError> {
        self.rpc_void(
            "update_my_location",
            json!({ "lat": point.lat, "lon": point.lon }),
        )
        .await
    }

    async fn touch_presence(&self, user_id: &str) -> Result<(), VibeError> {
        self.upsert("presence", json!({ "user_id": user_id, "status": "now" }))
            .await
    }

    async fn send_vibe(&self, target_id: &str) -> Result<(), VibeError> {
        self.rpc_void("send_vibe", json!({ "target_id": target_id }))
            .await
            .map_err(|e| VibeError::SignalSendFailed(e.reason()))
    }

    async fn get_conversation_with(&self, target_id: &str) -> Result<Option<String>, VibeError> {
        self.rpc("get_conversation_with", json!({ "target_id": target_id }))
            .await
            .map_err(|e| VibeError::ConversationResolutionFailed(e.reason()))
    }
}

#[async_trait]
impl SocialApi for SupabaseClient {
    async fn health(&self) -> BackendHealth {
        let result = async {
            let response = self
                .authed(self.http.get(self.rest_url("profiles")))
                .query(&[("select", "count"), ("limit", "1")])
                .send()
                .await?;
            Self::check(response).await?;
            Ok::<(), VibeError>(())
        }
        .await;

        match result {
            Ok(()) => BackendHealth {
                connected: true,
                error: None,
            },
            Err(e) => BackendHealth {
                connected: false,
                error: Some(e.reason()),
            },
        }
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<Profile>, VibeError> {
        let response = self
            .authed(self.http.get(self.rest_url("profiles")))
            .query(&[
                ("select", "user_id,name,status,avatar_url".to_string()),
                ("user_id", format!("eq.{user_id}")),
            ])
            .send()
            .await?;
        let rows: Vec<Profile> = Self::check(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), VibeError> {
        let row = serde_json::to_value(profile).map_err(|e| VibeError::Backend(e.to_string()))?;
        self.upsert("profiles", row).await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, VibeError> {
        let response = self
            .authed(self.http.get(self.rest_url("conversations")))
            .query(&[
                ("select", "id,messages(content,created_at)"),
                ("order", "created_at.desc"),
                ("messages.order", "created_at.desc"),
                ("messages.limit", "1"),
            ])
            .send()
            .await?;
        let rows: Vec<ConversationRow> = Self::check(response).await?.json().await?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationSummary {
                id: row.id,
                title: "Chat".to_string(),
                last_message: row.messages.into_iter().next().and_then(|m| m.content),
            })
            .collect())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, VibeError> {
        let response = self
            .authed(self.http.get(self.rest_url("messages")))
            .query(&[
                (
                    "select",
                    "id,sender_id,type,content,image_url,created_at".to_string(),
                ),
                ("conversation_id", format!("eq.{conversation_id}")),
                ("order", "created_at.asc".to_string()),
            ])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<(), VibeError> {
        let response = self
            .authed(self.http.post(self.rest_url("messages")))
            .header("Prefer", "return=minimal")
            .json(message)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, VibeError> {
        let response = self
            .authed(self.http.post(self.storage_url(&format!("{bucket}/{key}"))))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;

        Ok(self.storage_url(&format!("public/{bucket}/{key}")))
    }
}
