//! [`RemoteBackend`] over a PostgREST endpoint (Supabase REST API).
//!
//! Requests go to `{url}/rest/v1/{table}` with the project's anon key in the
//! `apikey` header and the user's access token as the bearer. Row-level
//! security on the server enforces the `user_id` scoping as well; the explicit
//! `user_id=eq.` filters keep the queries correct without it.

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::remote::{PlaylistRow, ProgressRow, RemoteBackend, VideoRow};
use crate::error::{RemoteError, RemoteResult};
use crate::session::User;

const PLAYLISTS: &str = "playlists";
const VIDEOS: &str = "videos";
const PROGRESS: &str = "video_progress";

const PLAYLISTS_CONFLICT: &str = "user_id,id";
const VIDEOS_CONFLICT: &str = "user_id,playlist_id,id";
const PROGRESS_CONFLICT: &str = "user_id,video_id,playlist_id";

pub struct PostgrestBackend {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl PostgrestBackend {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> RemoteResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::rejected(format!(
                "remote URL must start with http:// or https://: {}",
                base_url
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("audiobook-player/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.to_string(),
        })
    }

    fn request(&self, method: Method, table: &str, user: &User) -> RequestBuilder {
        let token = user.access_token.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
    }

    async fn send(request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            format!("{}: {}", status, body.trim()),
        ))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        user: &User,
        table: &str,
        filters: &[(&str, String)],
    ) -> RemoteResult<Vec<T>> {
        let request = self
            .request(Method::GET, table, user)
            .query(&[("select", "*")])
            .query(filters);
        let response = Self::send(request).await?;
        let rows = response.json().await?;
        Ok(rows)
    }

    async fn upsert<T: Serialize + Sync>(
        &self,
        user: &User,
        table: &str,
        on_conflict: &str,
        rows: &[T],
    ) -> RemoteResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .request(Method::POST, table, user)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        Self::send(request).await?;
        Ok(())
    }

    async fn delete(&self, user: &User, table: &str, filters: &[(&str, String)]) -> RemoteResult<()> {
        let request = self
            .request(Method::DELETE, table, user)
            .query(filters)
            .header("Prefer", "return=minimal");
        Self::send(request).await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// `in.("a","b")` with embedded quotes escaped.
fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl RemoteBackend for PostgrestBackend {
    fn backend_name(&self) -> &str {
        "postgrest"
    }

    async fn select_playlists(&self, user: &User) -> RemoteResult<Vec<PlaylistRow>> {
        self.select(
            user,
            PLAYLISTS,
            &[("user_id", eq(&user.id)), ("order", "date_added.desc".to_string())],
        )
        .await
    }

    async fn select_playlist(&self, user: &User, id: &str) -> RemoteResult<Option<PlaylistRow>> {
        let rows: Vec<PlaylistRow> = self
            .select(
                user,
                PLAYLISTS,
                &[("id", eq(id)), ("user_id", eq(&user.id)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_playlists(&self, user: &User, rows: &[PlaylistRow]) -> RemoteResult<()> {
        self.upsert(user, PLAYLISTS, PLAYLISTS_CONFLICT, rows).await
    }

    async fn update_video_count(&self, user: &User, playlist_id: &str, count: i64) -> RemoteResult<()> {
        let request = self
            .request(Method::PATCH, PLAYLISTS, user)
            .query(&[("id", eq(playlist_id)), ("user_id", eq(&user.id))])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "video_count": count }));
        Self::send(request).await?;
        Ok(())
    }

    async fn delete_playlist(&self, user: &User, id: &str) -> RemoteResult<()> {
        self.delete(user, PLAYLISTS, &[("id", eq(id)), ("user_id", eq(&user.id))])
            .await
    }

    async fn select_videos(&self, user: &User, playlist_id: &str) -> RemoteResult<Vec<VideoRow>> {
        self.select(
            user,
            VIDEOS,
            &[("playlist_id", eq(playlist_id)), ("user_id", eq(&user.id))],
        )
        .await
    }

    async fn upsert_videos(&self, user: &User, rows: &[VideoRow]) -> RemoteResult<()> {
        self.upsert(user, VIDEOS, VIDEOS_CONFLICT, rows).await
    }

    async fn delete_videos(
        &self,
        user: &User,
        playlist_id: &str,
        video_id: Option<&str>,
    ) -> RemoteResult<()> {
        let mut filters = vec![("playlist_id", eq(playlist_id)), ("user_id", eq(&user.id))];
        if let Some(video_id) = video_id {
            filters.push(("id", eq(video_id)));
        }
        self.delete(user, VIDEOS, &filters).await
    }

    async fn select_progress(&self, user: &User) -> RemoteResult<Vec<ProgressRow>> {
        self.select(user, PROGRESS, &[("user_id", eq(&user.id))]).await
    }

    async fn upsert_progress(&self, user: &User, rows: &[ProgressRow]) -> RemoteResult<()> {
        self.upsert(user, PROGRESS, PROGRESS_CONFLICT, rows).await
    }

    async fn delete_progress(&self, user: &User, video_ids: &[String]) -> RemoteResult<()> {
        if video_ids.is_empty() {
            return Ok(());
        }
        self.delete(
            user,
            PROGRESS,
            &[("video_id", in_list(video_ids)), ("user_id", eq(&user.id))],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user() -> User {
        User::new("u1", "u1@example.com").with_access_token("user-token")
    }

    fn backend(server: &MockServer) -> PostgrestBackend {
        PostgrestBackend::new(&server.uri(), "anon-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_in_list_quotes_values() {
        let ids = vec!["v1".to_string(), "a\"b".to_string()];
        assert_eq!(in_list(&ids), r#"in.("v1","a\"b")"#);
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = PostgrestBackend::new("ftp://example.com", "k", Duration::from_secs(1))
            .err()
            .unwrap();
        assert_eq!(err.kind, RemoteErrorKind::Rejected);
    }

    mod reads {
        use super::*;

        #[tokio::test]
        async fn test_select_playlists_sends_auth_and_order() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/playlists"))
                .and(query_param("user_id", "eq.u1"))
                .and(query_param("order", "date_added.desc"))
                .and(header("apikey", "anon-key"))
                .and(header("authorization", "Bearer user-token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                    "id": "p1",
                    "user_id": "u1",
                    "title": "Book",
                    "description": null,
                    "thumbnail": "t.jpg",
                    "video_count": 2,
                    "url": "https://youtube.com/playlist?list=p1",
                    "date_added": "2024-05-01T10:00:00+00:00"
                }])))
                .expect(1)
                .mount(&server)
                .await;

            let rows = backend(&server).select_playlists(&user()).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].id, "p1");
            assert_eq!(rows[0].video_count, 2);
            assert!(rows[0].description.is_none());
        }

        #[tokio::test]
        async fn test_anon_key_used_without_token() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/video_progress"))
                .and(header("authorization", "Bearer anon-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .expect(1)
                .mount(&server)
                .await;

            let anonymous = User::new("u1", "u1@example.com");
            let rows = backend(&server).select_progress(&anonymous).await.unwrap();
            assert!(rows.is_empty());
        }

        #[tokio::test]
        async fn test_malformed_body_is_decode_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/videos"))
                .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
                .mount(&server)
                .await;

            let err = backend(&server).select_videos(&user(), "p1").await.unwrap_err();
            assert_eq!(err.kind, RemoteErrorKind::Decode);
        }
    }

    mod writes {
        use super::*;

        #[tokio::test]
        async fn test_upsert_progress_uses_conflict_key() {
            let server = MockServer::start().await;
            let last_played = Utc::now();
            let row = ProgressRow {
                user_id: "u1".into(),
                video_id: "v1".into(),
                playlist_id: Some("p1".into()),
                progress_time: 54.0,
                duration: 60.0,
                watched: true,
                last_played,
            };

            Mock::given(method("POST"))
                .and(path("/rest/v1/video_progress"))
                .and(query_param("on_conflict", "user_id,video_id,playlist_id"))
                .and(header_exists("prefer"))
                .and(body_json(json!([row])))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;

            backend(&server).upsert_progress(&user(), &[row]).await.unwrap();
        }

        #[tokio::test]
        async fn test_upsert_playlists_scoped_to_owner() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/rest/v1/playlists"))
                .and(query_param("on_conflict", "user_id,id"))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;

            let row = PlaylistRow {
                id: "p1".into(),
                user_id: "u1".into(),
                title: "Book".into(),
                description: None,
                thumbnail: None,
                video_count: 0,
                url: None,
                date_added: Utc::now(),
            };
            backend(&server).upsert_playlists(&user(), &[row]).await.unwrap();
        }

        #[tokio::test]
        async fn test_empty_upsert_skips_request() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(201))
                .expect(0)
                .mount(&server)
                .await;

            backend(&server).upsert_videos(&user(), &[]).await.unwrap();
        }

        #[tokio::test]
        async fn test_delete_progress_in_filter() {
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .and(path("/rest/v1/video_progress"))
                .and(query_param("video_id", r#"in.("v1","v2")"#))
                .and(query_param("user_id", "eq.u1"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            backend(&server)
                .delete_progress(&user(), &["v1".to_string(), "v2".to_string()])
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_update_video_count_patches_column() {
            let server = MockServer::start().await;
            Mock::given(method("PATCH"))
                .and(path("/rest/v1/playlists"))
                .and(query_param("id", "eq.p1"))
                .and(body_json(json!({ "video_count": 3 })))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            backend(&server).update_video_count(&user(), "p1", 3).await.unwrap();
        }
    }

    mod errors {
        use super::*;

        async fn status_kind(status: u16) -> RemoteErrorKind {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status).set_body_string("{\"message\":\"nope\"}"))
                .mount(&server)
                .await;
            backend(&server).select_progress(&user()).await.unwrap_err().kind
        }

        #[tokio::test]
        async fn test_status_mapping() {
            assert_eq!(status_kind(401).await, RemoteErrorKind::Unauthorized);
            assert_eq!(status_kind(403).await, RemoteErrorKind::Unauthorized);
            assert_eq!(status_kind(404).await, RemoteErrorKind::NotFound);
            assert_eq!(status_kind(409).await, RemoteErrorKind::Rejected);
            assert_eq!(status_kind(503).await, RemoteErrorKind::Unavailable);
        }

        #[tokio::test]
        async fn test_unreachable_is_network_error() {
            let backend =
                PostgrestBackend::new("http://127.0.0.1:1", "anon-key", Duration::from_secs(2)).unwrap();
            let err = backend.select_playlists(&user()).await.unwrap_err();
            assert_eq!(err.kind, RemoteErrorKind::Network);
        }
    }
}
