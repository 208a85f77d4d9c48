use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::error::ConnectError;
use crate::traits::ChatApi;

static CLIENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"var pfc_clientid\s*?= "(\w+)";"#).expect("client-id pattern is a valid regex")
});

static ROOM_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'join',\s*'ok',\s*Array\('([a-z0-9]+)").expect("room-id pattern is a valid regex")
});

/// Addressable connection state. Identifiers never change after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub(crate) endpoint: String,
    pub(crate) cookie: String,
    pub(crate) client_id: String,
    pub(crate) room_id: String,
}

impl Session {
    pub(crate) fn update_command(&self) -> String {
        format!("/update {} {}", self.client_id, self.room_id)
    }

    pub(crate) fn send_command(&self, text: &str) -> String {
        format!("/send {} {} {text}", self.client_id, self.room_id)
    }
}

pub(crate) fn extract_client_id(page: &str) -> Option<String> {
    CLIENT_ID_RE.captures(page).map(|c| c[1].to_string())
}

pub(crate) fn extract_room_id(body: &str) -> Option<String> {
    ROOM_ID_RE.captures(body).map(|c| c[1].to_string())
}

pub(crate) fn connect_command(client_id: &str, display_name: &str) -> String {
    format!("/connect {client_id} 0 \"{display_name}\"")
}

/// Handshake: page fetch, load call, connect call. Each step either yields the
/// next identifier or fails the whole handshake.
pub(crate) async fn connect(api: &dyn ChatApi, display_name: &str) -> Result<Session, ConnectError> {
    let endpoint = api.endpoint();
    let no_response = |step: &str, e: crate::error::AppError| {
        warn!(endpoint = %endpoint, step = step, "Handshake request failed: {e}");
        ConnectError::NoResponse(endpoint.clone())
    };

    let page = api
        .fetch_page()
        .await
        .map_err(|e| no_response("page", e))?;
    let cookie = page.session_cookie.ok_or(ConnectError::NoSession)?;
    let client_id = extract_client_id(&page.body).ok_or(ConnectError::NoClientId)?;

    api.load_chat(&cookie)
        .await
        .map_err(|e| no_response("loadChat", e))?;

    let body = api
        .handle_request(&cookie, &connect_command(&client_id, display_name))
        .await
        .map_err(|e| no_response("connect", e))?;
    let room_id = extract_room_id(&body).ok_or(ConnectError::NoRoomId)?;

    info!(
        client_id = %client_id,
        room_id = %room_id,
        name = %display_name,
        "Connected to chat"
    );
    Ok(Session {
        endpoint,
        cookie,
        client_id,
        room_id,
    })
}
