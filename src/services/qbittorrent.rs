use super::{ApplyResults, DownloadQueue, ServiceError};
use crate::model::{QueueAction, QueueMarkers, QueuedDownload};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a qBittorrent instance.
pub struct QbitSettings {
    /// Base URL of the Web UI, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    /// Category and tag applied to every added torrent.
    pub markers: QueueMarkers,
}

impl std::fmt::Debug for QbitSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbitSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("markers", &self.markers)
            .finish()
    }
}

/// Cached Web API session (the `SID` cookie).
///
/// Empty until the first call needs it. Logins are serialized by the lock so
/// concurrent callers share one session.
#[derive(Default)]
struct Session {
    sid: Mutex<Option<String>>,
}

impl Session {
    async fn get_or_login(&self, client: &QbitClient) -> Result<String, ServiceError> {
        let mut guard = self.sid.lock().await;
        if let Some(sid) = guard.as_ref() {
            return Ok(sid.clone());
        }
        let sid = client.login().await?;
        *guard = Some(sid.clone());
        Ok(sid)
    }

    /// Drop `stale` unless another caller already replaced it.
    async fn invalidate(&self, stale: &str) {
        let mut guard = self.sid.lock().await;
        if guard.as_deref() == Some(stale) {
            *guard = None;
        }
    }
}

/// qBittorrent Web API v2 client.
pub struct QbitClient {
    client: reqwest::Client,
    settings: QbitSettings,
    session: Session,
}

impl QbitClient {
    pub fn new(client: reqwest::Client, settings: QbitSettings) -> Self {
        Self {
            client,
            settings,
            session: Session::default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v2/{}",
            self.settings.base_url.trim_end_matches('/'),
            path
        )
    }

    async fn login(&self) -> Result<String, ServiceError> {
        let response = send(
            self.client
                .post(self.endpoint("auth/login"))
                .header(header::REFERER, &self.settings.base_url)
                .form(&[
                    ("username", self.settings.username.as_str()),
                    ("password", self.settings.password.expose_secret()),
                ]),
        )
        .await?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "qBittorrent login rejected");
            return Err(ServiceError::Auth(format!(
                "login returned status {}",
                response.status().as_u16()
            )));
        }

        let sid = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(parse_sid_cookie);

        match sid {
            Some(sid) => {
                tracing::debug!("qBittorrent session established");
                Ok(sid)
            }
            None => {
                tracing::error!("qBittorrent login did not return a session cookie");
                Err(ServiceError::Auth("no SID received".to_string()))
            }
        }
    }

    /// Send an authenticated request built by `build`.
    ///
    /// A 403 means the session expired: log in again and retry once.
    async fn send_authed<F>(&self, build: F) -> Result<Response, ServiceError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let sid = self.session.get_or_login(self).await?;
        let response = send(build(&sid)).await?;

        if response.status() != StatusCode::FORBIDDEN {
            return check_status(response);
        }

        tracing::debug!("qBittorrent session rejected, logging in again");
        self.session.invalidate(&sid).await;
        let sid = self.session.get_or_login(self).await?;
        let response = send(build(&sid)).await?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(ServiceError::Auth("session rejected after re-login".into()));
        }
        check_status(response)
    }

    async fn apply_one(&self, id: &str, action: QueueAction) -> Result<(), ServiceError> {
        let url = match action {
            QueueAction::Start => self.endpoint("torrents/start"),
            QueueAction::Delete { .. } => self.endpoint("torrents/delete"),
        };
        let delete_files = match action {
            QueueAction::Delete { delete_files } => Some(delete_files.to_string()),
            QueueAction::Start => None,
        };

        self.send_authed(|sid| {
            let mut fields = vec![("hashes", id.to_string())];
            if let Some(flag) = &delete_files {
                fields.push(("deleteFiles", flag.clone()));
            }
            self.client
                .post(&url)
                .header(header::COOKIE, format!("SID={}", sid))
                .form(&fields)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DownloadQueue for QbitClient {
    async fn add(&self, file: &Path) -> Result<(), ServiceError> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.torrent".to_string());
        let url = self.endpoint("torrents/add");
        let markers = &self.settings.markers;

        let response = self
            .send_authed(|sid| {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str("application/x-bittorrent")
                    .unwrap_or_else(|_| Part::bytes(bytes.clone()));
                // `stopped` is the qBittorrent 5 name, `paused` the 4.x one
                let form = Form::new()
                    .part("torrents", part)
                    .text("stopped", "true")
                    .text("paused", "true")
                    .text("category", markers.category.clone())
                    .text("tags", markers.tag.clone());
                self.client
                    .post(&url)
                    .header(header::COOKIE, format!("SID={}", sid))
                    .multipart(form)
            })
            .await?;

        // qBittorrent answers 200 "Fails." when it rejects the torrent file
        let body = response.text().await.unwrap_or_default();
        if body.trim().eq_ignore_ascii_case("fails.") {
            return Err(ServiceError::Decode("torrent rejected by qBittorrent".into()));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: Option<&QueueMarkers>,
    ) -> Result<Vec<QueuedDownload>, ServiceError> {
        let url = self.endpoint("torrents/info");
        let response = self
            .send_authed(|sid| {
                let mut request = self
                    .client
                    .get(&url)
                    .header(header::COOKIE, format!("SID={}", sid));
                if let Some(markers) = filter {
                    request = request.query(&[
                        ("category", markers.category.as_str()),
                        ("tag", markers.tag.as_str()),
                    ]);
                }
                request
            })
            .await?;

        response
            .json::<Vec<QueuedDownload>>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn apply(&self, ids: &[String], action: QueueAction) -> ApplyResults {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.apply_one(id, action).await;
            results.push((id.clone(), result));
        }
        results
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Response, ServiceError> {
    tokio::time::timeout(REQUEST_TIMEOUT, request.send())
        .await
        .map_err(|_| ServiceError::Timeout)?
        .map_err(ServiceError::Network)
}

fn check_status(response: Response) -> Result<Response, ServiceError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ServiceError::HttpStatus(response.status().as_u16()))
    }
}

/// Extract the value of `SID=...` from one `Set-Cookie` header.
fn parse_sid_cookie(cookie: &str) -> Option<String> {
    let value = cookie.strip_prefix("SID=")?;
    let value = value.split(';').next().unwrap_or("").trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DownloadState;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TORRENTS_JSON: &str = r#"[
        {"hash": "h1", "name": "www.1TamilMV.pink - Foo (2020) 1080p.mkv", "size": 2147483648,
         "progress": 0, "state": "stoppedDL", "tags": "tamilmv", "category": "radarr"},
        {"hash": "h2", "name": "Bar (2021)", "size": 1073741824,
         "progress": 0.5, "state": "downloading", "tags": "tamilmv", "category": "radarr"}
    ]"#;

    fn client_for(server: &MockServer) -> QbitClient {
        QbitClient::new(
            reqwest::Client::new(),
            QbitSettings {
                base_url: server.uri(),
                username: "admin".into(),
                password: SecretString::from("secret".to_string()),
                markers: QueueMarkers {
                    tag: "tamilmv".into(),
                    category: "radarr".into(),
                },
            },
        )
    }

    fn login_ok(sid: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("set-cookie", format!("SID={}; HttpOnly; path=/", sid).as_str())
            .set_body_string("Ok.")
    }

    #[test]
    fn test_parse_sid_cookie() {
        assert_eq!(
            parse_sid_cookie("SID=abc123; HttpOnly; path=/"),
            Some("abc123".to_string())
        );
        assert_eq!(parse_sid_cookie("SID=; path=/"), None);
        assert_eq!(parse_sid_cookie("other=1"), None);
    }

    #[tokio::test]
    async fn test_list_logs_in_once_and_reuses_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .and(body_string_contains("username=admin"))
            .respond_with(login_ok("s1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .and(header_eq("cookie", "SID=s1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TORRENTS_JSON))
            .expect(2)
            .mount(&server)
            .await;

        let qbit = client_for(&server);
        let first = qbit.list(None).await.unwrap();
        let second = qbit.list(None).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[0].state, DownloadState::StoppedDownload);
        assert_eq!(first[1].progress, 0.5);
    }

    #[tokio::test]
    async fn test_list_passes_marker_filter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(login_ok("s1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .and(query_param("category", "radarr"))
            .and(query_param("tag", "tamilmv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let qbit = client_for(&server);
        let markers = QueueMarkers {
            tag: "tamilmv".into(),
            category: "radarr".into(),
        };
        assert!(qbit.list(Some(&markers)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_reacquired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(login_ok("old"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(login_ok("new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .and(header_eq("cookie", "SID=old"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .and(header_eq("cookie", "SID=new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TORRENTS_JSON))
            .expect(1)
            .mount(&server)
            .await;

        let qbit = client_for(&server);
        let torrents = qbit.list(None).await.unwrap();
        assert_eq!(torrents.len(), 2);
    }

    #[tokio::test]
    async fn test_login_without_cookie_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let qbit = client_for(&server);
        let result = qbit.list(None).await;
        assert!(matches!(result, Err(ServiceError::Auth(_))));
    }

    #[tokio::test]
    async fn test_apply_reports_each_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(login_ok("s1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/delete"))
            .and(body_string_contains("hashes=good"))
            .and(body_string_contains("deleteFiles=true"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/delete"))
            .and(body_string_contains("hashes=bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let qbit = client_for(&server);
        let ids = vec!["good".to_string(), "bad".to_string()];
        let results = qbit
            .apply(&ids, QueueAction::Delete { delete_files: true })
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "good");
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, "bad");
        assert!(matches!(results[1].1, Err(ServiceError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_add_uploads_file_with_markers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(login_ok("s1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .and(body_string_contains("d8:announce"))
            .and(body_string_contains("tamilmv"))
            .and(body_string_contains("radarr"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.torrent");
        std::fs::write(&file, "d8:announce3:urle").unwrap();

        let qbit = client_for(&server);
        qbit.add(&file).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_rejected_torrent_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(login_ok("s1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.torrent");
        std::fs::write(&file, "garbage").unwrap();

        let qbit = client_for(&server);
        assert!(qbit.add(&file).await.is_err());
    }
}
