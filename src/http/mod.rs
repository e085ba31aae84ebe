//! The one request pipeline every backend call goes through.
//!
//! `ApiClient` sets the standard headers, attaches the bearer token while it
//! is still valid, and answers a 401 with a single token refresh and replay.
//! When the refresh fails the session is cleared and the client is sent back
//! to the root page.

pub mod transport;

pub use transport::{Body, HttpRequest, HttpResponse, Method, MultipartForm, Transport, UreqTransport};

use crate::activity::ActivityLog;
use crate::auth::LOGIN_PATH;
use crate::guard::{Navigator, Route};
use crate::session::SessionContext;
use crate::token;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::rc::Rc;

pub const REFRESH_PATH: &str = "/auth/refresh-token";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed"))]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("session expired, please sign in again")]
    SessionExpired,
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message supplied by the backend, if any
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    fn from_response(response: &HttpResponse) -> Self {
        ApiError::Status {
            status: response.status,
            message: response.message(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<RefreshData>,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// A logical request. `retried` is set once the request has been replayed
/// after a refresh, so it is never refreshed twice.
struct PendingRequest {
    method: Method,
    path: String,
    body: Body,
    retried: bool,
    bearer: Option<String>,
}

pub struct ApiClient {
    base_url: String,
    transport: Box<dyn Transport>,
    session: Rc<SessionContext>,
    navigator: Rc<dyn Navigator>,
    activity: ActivityLog,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        transport: Box<dyn Transport>,
        session: Rc<SessionContext>,
        navigator: Rc<dyn Navigator>,
        activity: ActivityLog,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            session,
            navigator,
            activity,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn prepare(&self, pending: &PendingRequest) -> HttpRequest {
        let mut request = HttpRequest {
            method: pending.method,
            url: self.url(&pending.path),
            headers: Vec::new(),
            body: pending.body.clone(),
        };

        match &pending.body {
            Body::Multipart(form) => request.set_header("Content-Type", &form.content_type()),
            Body::Json(_) => request.set_header("Content-Type", "application/json"),
            Body::Empty => {}
        }
        request.set_header("Accept", "application/json");

        // Expired tokens are left off entirely rather than sent stale
        let bearer = pending
            .bearer
            .clone()
            .or_else(|| self.session.token().filter(|t| !token::is_expired(t)));
        if let Some(t) = bearer {
            request.set_header("Authorization", &format!("Bearer {}", t));
        }

        request
    }

    /// Send a request, refreshing and replaying once on 401.
    pub fn execute(&self, method: Method, path: &str, body: Body) -> Result<HttpResponse, ApiError> {
        let mut pending = PendingRequest {
            method,
            path: path.to_string(),
            body,
            retried: false,
            bearer: None,
        };

        loop {
            let request = self.prepare(&pending);
            log::debug!("{} {}", request.method.as_str(), request.url);
            let response = self.transport.send(&request)?;
            log::debug!("{} {} -> {}", request.method.as_str(), request.url, response.status);

            if response.status == 401 && !pending.retried {
                pending.retried = true;
                if let Some(new_token) = self.recover_session(&pending.path)? {
                    pending.bearer = Some(new_token);
                    continue;
                }
            }

            if response.is_success() {
                return Ok(response);
            }
            return Err(ApiError::from_response(&response));
        }
    }

    /// Refresh after a 401. `Ok(None)` is a rejected login, which reaches the
    /// caller as is. Without a token to refresh the session is expired.
    fn recover_session(&self, path: &str) -> Result<Option<String>, ApiError> {
        let Some(current) = self.session.token() else {
            if path == LOGIN_PATH {
                return Ok(None);
            }
            log::warn!("401 on {} with no access token", path);
            return Err(self.expire_session("no access token available"));
        };

        let failure = match self.exchange_token(&current) {
            Ok(Some(new_token)) => match self.session.replace_token(&new_token) {
                Ok(()) => {
                    self.activity.refresh(true);
                    return Ok(Some(new_token));
                }
                Err(e) => format!("{:#}", e),
            },
            Ok(None) => "refresh rejected".to_string(),
            Err(e) => e.to_string(),
        };

        log::warn!("token refresh failed: {}", failure);
        self.activity.refresh(false);
        Err(self.expire_session(&failure))
    }

    fn expire_session(&self, reason: &str) -> ApiError {
        self.session.clear();
        self.activity.session_cleared(reason);
        self.navigator.navigate(Route::Root);
        ApiError::SessionExpired
    }

    /// Trade `current` for a new access token, bypassing the header and retry
    /// handling above. `Ok(None)` is a refusal reported by the backend.
    pub fn exchange_token(&self, current: &str) -> Result<Option<String>, ApiError> {
        let mut request = HttpRequest {
            method: Method::Post,
            url: self.url(REFRESH_PATH),
            headers: Vec::new(),
            body: Body::Json(json!({ "refreshToken": current })),
        };
        request.set_header("Content-Type", "application/json");
        request.set_header("Accept", "application/json");

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        let body: RefreshResponse = response.json()?;
        match (body.success, body.data) {
            (true, Some(data)) if !data.access_token.is_empty() => Ok(Some(data.access_token)),
            _ => Ok(None),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::Get, path, Body::Empty)?.json()
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.execute(Method::Post, path, json_body(body)?)?.json()
    }

    pub fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.execute(Method::Patch, path, json_body(body)?)?.json()
    }

    pub fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::Delete, path, Body::Empty)?;
        Ok(())
    }

    #[allow(dead_code)]
    pub fn post_form<T: DeserializeOwned>(&self, path: &str, form: MultipartForm) -> Result<T, ApiError> {
        self.execute(Method::Post, path, Body::Multipart(form))?.json()
    }
}

fn json_body<B: Serialize>(body: &B) -> Result<Body, ApiError> {
    serde_json::to_value(body)
        .map(Body::Json)
        .map_err(|e| ApiError::Decode(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::session::{CookieStore, MemoryCookieStore, Role, USER_COOKIE};
    use serde_json::Value;

    #[test]
    fn test_headers_with_valid_token() {
        let f = fixture();
        let token = token_expiring_in(Role::Admin, 1, 3600);
        sign_in(&f.session, Role::Admin, &token);
        f.transport.reply(Method::Post, "/students", 201, json!({"message": "ok"}));

        let _: Value = f.client.post("/students", &json!({"name": "Ali"})).unwrap();

        let req = f.transport.last();
        assert_eq!(req.url, "http://school.test/students");
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Authorization"), Some(format!("Bearer {}", token).as_str()));
    }

    #[test]
    fn test_expired_token_omits_authorization() {
        let f = fixture();
        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, -60));
        f.transport.reply(Method::Get, "/courses", 200, json!([]));

        let _: Vec<Value> = f.client.get("/courses").unwrap();

        let req = f.transport.last();
        assert!(req.header("Authorization").is_none());
        assert!(req.header("Content-Type").is_none());
    }

    #[test]
    fn test_multipart_content_type() {
        let f = fixture();
        f.transport.reply(Method::Post, "/students", 201, json!({}));
        let form = MultipartForm::new().text("name", "Ali");
        let expected = form.content_type();

        let _: Value = f.client.post_form("/students", form).unwrap();

        let req = f.transport.last();
        assert_eq!(req.header("Content-Type"), Some(expected.as_str()));
        assert!(req.header("Content-Type").unwrap().starts_with("multipart/form-data"));
    }

    #[test]
    fn test_401_refreshes_once_and_replays() {
        let f = fixture();
        let old = token_expiring_in(Role::Teacher, 2, 3600);
        let new = token_expiring_in(Role::Teacher, 2, 7200);
        sign_in(&f.session, Role::Teacher, &old);

        f.transport
            .reply(Method::Get, "/courses", 401, json!({"message": "expired"}))
            .reply(Method::Post, REFRESH_PATH, 200, json!({"success": true, "data": {"accessToken": new}}))
            .reply(Method::Get, "/courses", 200, json!([{"id": 1}]));

        let courses: Vec<Value> = f.client.get("/courses").unwrap();
        assert_eq!(courses.len(), 1);

        assert_eq!(f.transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(f.transport.count(Method::Get, "/courses"), 2);

        let refresh = f.transport.requests.borrow()[1].clone();
        assert!(refresh.header("Authorization").is_none());
        match refresh.body {
            Body::Json(v) => assert_eq!(v["refreshToken"], json!(old)),
            other => panic!("unexpected body {:?}", other),
        }

        let replay = f.transport.last();
        assert_eq!(replay.header("Authorization"), Some(format!("Bearer {}", new).as_str()));
        assert_eq!(f.session.token(), Some(new));
    }

    #[test]
    fn test_second_401_does_not_refresh_again() {
        let f = fixture();
        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, 3600));
        let new = token_expiring_in(Role::Admin, 1, 7200);

        f.transport
            .reply(Method::Get, "/students", 401, json!({}))
            .reply(Method::Post, REFRESH_PATH, 200, json!({"success": true, "data": {"accessToken": new}}))
            .reply(Method::Get, "/students", 401, json!({"message": "still no"}));

        let err = f.client.get::<Value>("/students").unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.backend_message(), Some("still no"));
        assert_eq!(f.transport.count(Method::Post, REFRESH_PATH), 1);
        assert_eq!(f.transport.count(Method::Get, "/students"), 2);
        // Session survives: the refresh itself succeeded
        assert!(f.session.is_authenticated());
        assert!(f.router.take_navigations().is_empty());
    }

    #[test]
    fn test_refresh_failure_clears_session_and_goes_home() {
        let f = fixture();
        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, 3600));
        f.router.navigate(Route::Admin(crate::guard::AdminPage::Courses));
        f.router.take_navigations();

        f.transport
            .reply(Method::Get, "/courses", 401, json!({}))
            .reply(Method::Post, REFRESH_PATH, 403, json!({"message": "bad refresh"}));

        let err = f.client.get::<Value>("/courses").unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired));
        assert!(!f.session.is_authenticated());
        assert!(f.session.token().is_none());
        assert_eq!(f.router.take_navigations(), vec![Route::Root]);
        assert_eq!(f.transport.count(Method::Get, "/courses"), 1);
    }

    #[test]
    fn test_refresh_rejected_by_backend() {
        let f = fixture();
        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, 3600));
        f.transport
            .reply(Method::Get, "/courses", 401, json!({}))
            .reply(Method::Post, REFRESH_PATH, 200, json!({"success": false}));

        let err = f.client.get::<Value>("/courses").unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired));
        assert!(f.session.current_user().is_none());
    }

    #[test]
    fn test_login_401_is_returned() {
        let f = fixture();
        f.transport
            .reply(Method::Post, LOGIN_PATH, 401, json!({"message": "Invalid credentials"}));

        let err = f
            .client
            .post::<_, Value>(LOGIN_PATH, &json!({"email": "a@b.c", "password": "x"}))
            .unwrap_err();
        assert_eq!(err.backend_message(), Some("Invalid credentials"));
        assert_eq!(f.transport.count(Method::Post, REFRESH_PATH), 0);
        assert!(f.router.take_navigations().is_empty());
    }

    #[test]
    fn test_401_without_token_clears_leftover_user() {
        let store = MemoryCookieStore::new();
        let user = json!({"id": "1", "email": "a@b.c", "role": "admin", "name": "a"});
        store
            .set(USER_COOKIE, &user.to_string(), chrono::Utc::now() + chrono::Duration::days(1))
            .unwrap();
        let f = fixture_with(SessionContext::new(Box::new(store), 7));
        assert!(f.session.is_admin());
        f.transport.reply(Method::Get, "/courses", 401, json!({}));

        let err = f.client.get::<Value>("/courses").unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired));
        assert!(f.session.current_user().is_none());
        assert!(!f.session.is_admin());
        assert_eq!(f.router.take_navigations(), vec![Route::Root]);
        assert_eq!(f.transport.count(Method::Post, REFRESH_PATH), 0);
        assert_eq!(f.transport.count(Method::Get, "/courses"), 1);
    }

    #[test]
    fn test_other_errors_not_retried() {
        let f = fixture();
        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, 3600));
        f.transport.reply(Method::Delete, "/students/9", 500, json!({"message": "boom"}));
        f.transport.fail(Method::Get, "/students", "connection refused");

        let err = f.client.delete("/students/9").unwrap_err();
        assert_eq!(err.status(), Some(500));
        let err = f.client.get::<Value>("/students").unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(f.transport.requests.borrow().len(), 2);
    }
}
