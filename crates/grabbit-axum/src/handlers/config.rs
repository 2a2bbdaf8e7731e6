//! Chat provider configuration endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use grabbit_core::{ChatConfig, ChatConfigView};

use crate::auth::AuthUser;
use crate::error::HttpError;
use crate::state::AppState;

/// `GET /api/config` - current provider config with the hash masked.
pub async fn get(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Json<ChatConfigView> {
    Json(state.chat_config().masked())
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    pub provider_app_id: i64,
    pub provider_app_hash: String,
    pub target_channel_id: i64,
}

/// `PUT /api/config` - persist provider config to the data root.
///
/// The chat intake reads it at startup; a restart attaches the session.
pub async fn put(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ChatConfigView>, HttpError> {
    if update.provider_app_id == 0
        || update.provider_app_hash.is_empty()
        || update.target_channel_id == 0
    {
        return Err(HttpError::BadRequest(
            "provider_app_id, provider_app_hash and target_channel_id are required".to_string(),
        ));
    }

    let config = ChatConfig {
        provider_app_id: update.provider_app_id,
        provider_app_hash: update.provider_app_hash,
        target_channel_id: update.target_channel_id,
    };
    config
        .save(&state.config.provider_config_path)
        .map_err(|e| HttpError::Internal(format!("could not persist config: {e}")))?;

    tracing::info!("chat provider config updated; restart to attach the session");
    Ok(Json(config.masked()))
}
