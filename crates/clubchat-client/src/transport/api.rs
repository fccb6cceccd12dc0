//! REST client for the chat endpoints.
//!
//! Every response body is wrapped as `{ "data": ... }`. Non-success statuses
//! are classified with [`ApiError::from_status`] before the body is read, so
//! a 401 is always reported as [`ApiError::Unauthorized`].

use std::time::Duration;

use clubchat_proto::{
    ApiEnvelope, ChatMessage, ClubId, CreateRoomRequest, RoomDirectory, RoomMember, Timestamp,
    UserId, UserIdLookup,
};
use serde::{Serialize, de::DeserializeOwned};

use super::{Endpoints, TransportError, bare_token};
use crate::{
    error::ApiError,
    event::{ApiRequest, ApiResponse, RoomTarget},
};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated HTTP client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    token: String,
}

impl ApiClient {
    /// Create a client sending `token` as bearer credentials.
    pub fn new(endpoints: Endpoints, token: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { http, endpoints, token: bare_token(token).to_string() })
    }

    /// Perform `request` and package the outcome for the session.
    pub async fn execute(&self, request: ApiRequest) -> ApiResponse {
        match request {
            ApiRequest::ResolveUserId { subject } => {
                ApiResponse::UserId(self.resolve_user_id(&subject).await)
            },
            ApiRequest::FetchMembers { target, purpose } => {
                let result = self.room_members(&target).await;
                ApiResponse::Members { purpose, result }
            },
            ApiRequest::Join { target } => ApiResponse::Joined(self.join(&target).await),
            ApiRequest::FetchHistory { target, from } => {
                let from = from.as_ref().map(Timestamp::as_str);
                ApiResponse::History(self.history(&target, from).await)
            },
            ApiRequest::ListRooms { club } => ApiResponse::Rooms(self.list_rooms(&club).await),
            ApiRequest::CreateRoom { club, request } => {
                let result = self.create_room(&club, &request).await;
                ApiResponse::RoomCreated { name: request.name, result }
            },
        }
    }

    /// `GET /api/users/sub/{subject}/user-id`
    pub async fn resolve_user_id(&self, subject: &str) -> Result<Option<UserId>, ApiError> {
        let url = self.endpoints.api_url(&["api", "users", "sub", subject, "user-id"]);
        let lookup = self.get::<UserIdLookup>(url, &[]).await?;
        Ok(lookup.and_then(UserIdLookup::into_user_id))
    }

    /// `GET /api/clubs/{club}/chat/rooms/{room}/users`
    pub async fn room_members(&self, target: &RoomTarget) -> Result<Vec<RoomMember>, ApiError> {
        let url = self.endpoints.api_url(&room_path(target, Some("users")));
        Ok(self.get::<Vec<RoomMember>>(url, &[]).await?.unwrap_or_default())
    }

    /// `POST /api/clubs/{club}/chat/rooms/{room}/join`
    pub async fn join(&self, target: &RoomTarget) -> Result<(), ApiError> {
        let url = self.endpoints.api_url(&room_path(target, Some("join")));
        self.post::<()>(url, None).await
    }

    /// `GET /api/clubs/{club}/chat/rooms/{room}[?from=]`
    pub async fn history(
        &self,
        target: &RoomTarget,
        from: Option<&str>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.endpoints.api_url(&room_path(target, None));
        let query: Vec<(&str, &str)> = from.map(|from| ("from", from)).into_iter().collect();
        Ok(self.get::<Vec<ChatMessage>>(url, &query).await?.unwrap_or_default())
    }

    /// `GET /api/clubs/{club}/chat/list`
    pub async fn list_rooms(&self, club: &ClubId) -> Result<RoomDirectory, ApiError> {
        let url = self.endpoints.api_url(&["api", "clubs", club.as_str(), "chat", "list"]);
        Ok(self.get::<RoomDirectory>(url, &[]).await?.unwrap_or_default())
    }

    /// `POST /api/clubs/{club}/chat/create`
    pub async fn create_room(
        &self,
        club: &ClubId,
        request: &CreateRoomRequest,
    ) -> Result<(), ApiError> {
        let url = self.endpoints.api_url(&["api", "clubs", club.as_str(), "chat", "create"]);
        self.post(url, Some(request)).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Result<url::Url, TransportError>,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError> {
        let url = url.map_err(|e| ApiError::Transport(e.to_string()))?;
        tracing::trace!(%url, "GET");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        read_data(response).await
    }

    async fn post<B: Serialize>(
        &self,
        url: Result<url::Url, TransportError>,
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        let url = url.map_err(|e| ApiError::Transport(e.to_string()))?;
        tracing::trace!(%url, "POST");
        let mut request = self.http.post(url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        // Success bodies of commands are not used.
        ApiError::from_status(response.status().as_u16()).map_or(Ok(()), Err)
    }
}

fn room_path<'a>(target: &'a RoomTarget, tail: Option<&'a str>) -> Vec<&'a str> {
    let mut path =
        vec!["api", "clubs", target.club.as_str(), "chat", "rooms", target.room.as_str()];
    path.extend(tail);
    path
}

async fn read_data<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, ApiError> {
    if let Some(error) = ApiError::from_status(response.status().as_u16()) {
        return Err(error);
    }
    let body = response.text().await.map_err(|e| ApiError::Transport(e.to_string()))?;
    parse_envelope(&body)
}

/// `data` of an enveloped body. Empty bodies carry no data.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<Option<T>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let envelope: ApiEnvelope<T> = serde_json::from_str(body)?;
    Ok(envelope.data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_data_is_unwrapped() {
        let members: Option<Vec<RoomMember>> = parse_envelope(
            r#"{"data":[{"userId":7,"nickname":"kim","clubRole":"OWNER","joinedAt":"2024-05-01T09:00:00"}]}"#,
        )
        .unwrap();
        let members = members.unwrap();
        assert_eq!(members[0].user_id, UserId::new("7"));
        assert!(members[0].is_admin());
    }

    #[test]
    fn empty_body_has_no_data() {
        assert_eq!(parse_envelope::<Vec<ChatMessage>>("").unwrap(), None);
        assert_eq!(parse_envelope::<Vec<ChatMessage>>(r#"{"data":null}"#).unwrap(), None);
    }

    #[test]
    fn history_page_survives_unreadable_timestamps() {
        let page: Option<Vec<ChatMessage>> = parse_envelope(
            r#"{"data":[
                {"messageId":1,"roomId":9,"message":"a","createdAt":[2024,5,1,9,30,0]},
                {"messageId":2,"roomId":9,"message":"b","createdAt":"not a date"},
                {"messageId":3,"roomId":9,"message":"c","createdAt":"2024-05-01 09:31:00"}
            ]}"#,
        )
        .unwrap();
        let page = page.unwrap();

        assert_eq!(page.len(), 3);
        assert!(page[0].created_at.is_some());
        assert!(page[1].created_at.is_none());
        assert!(page[2].created_at.is_some());
    }

    #[test]
    fn single_member_envelope() {
        let member: Option<RoomMember> =
            parse_envelope(r#"{"data":{"userId":7,"clubRole":"MEMBER"}}"#).unwrap();
        assert_eq!(member.unwrap().user_id, UserId::new("7"));
        assert_eq!(parse_envelope::<RoomMember>("{}").unwrap(), None);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = parse_envelope::<Vec<ChatMessage>>("<html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn room_paths() {
        let target = RoomTarget::new("3", "9");
        assert_eq!(room_path(&target, Some("join")), [
            "api", "clubs", "3", "chat", "rooms", "9", "join"
        ]);
        assert_eq!(room_path(&target, None).len(), 6);
    }
}
