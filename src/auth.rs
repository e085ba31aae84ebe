//! Sign-in, sign-out and token refresh.

use crate::activity::ActivityLog;
use crate::guard::{Navigator, Route};
use crate::http::{ApiClient, ApiError};
use crate::session::{Role, UserIdentity};
use crate::token;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

pub const LOGIN_PATH: &str = "/auth/login";

const GENERIC_LOGIN_ERROR: &str = "Login failed";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Rejected(String),
    /// Reported as a plain login failure; the cause is logged
    #[error("{}", GENERIC_LOGIN_ERROR)]
    InvalidToken,
    #[error("this account is a {actual} account, not a {expected} account")]
    WrongRole { expected: Role, actual: Role },
    #[error("failed to store session: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Mirror of the login form's `required` and `type="email"` checks
    pub fn validate(&self) -> Result<(), AuthError> {
        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(AuthError::Invalid(format!(
                "'{}' is not a valid email address",
                self.email
            )));
        }
        if self.password.is_empty() {
            return Err(AuthError::Invalid("password is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken", default)]
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    pub user: UserIdentity,
}

pub struct AuthService {
    api: Rc<ApiClient>,
    navigator: Rc<dyn Navigator>,
    activity: ActivityLog,
}

impl AuthService {
    pub fn new(api: Rc<ApiClient>, navigator: Rc<dyn Navigator>, activity: ActivityLog) -> Self {
        Self {
            api,
            navigator,
            activity,
        }
    }

    /// Sign in and persist the session. The backend returns only a token, so
    /// the identity is rebuilt from its claims and the submitted email.
    pub fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, AuthError> {
        credentials.validate()?;

        let result = self.try_login(credentials);
        let role = result
            .as_ref()
            .map(|o| o.user.role.as_str())
            .unwrap_or("");
        self.activity
            .login(&credentials.email, role, result.is_ok());
        result
    }

    fn try_login(&self, credentials: &Credentials) -> Result<LoginOutcome, AuthError> {
        let response: LoginResponse = self
            .api
            .post(LOGIN_PATH, credentials)
            .map_err(login_error)?;

        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidToken)?;

        let claims = token::decode(&access_token).map_err(|e| {
            log::warn!("login token could not be decoded: {}", e);
            AuthError::InvalidToken
        })?;
        let (Some(id), Some(role)) = (claims.subject(), claims.role()) else {
            log::warn!("login token lacks a usable id or role claim");
            return Err(AuthError::InvalidToken);
        };

        let email = credentials.email.trim().to_string();
        let user = UserIdentity {
            id,
            name: UserIdentity::display_name_for(&email),
            email,
            role,
        };

        self.api
            .session()
            .store_login(&access_token, &user)
            .map_err(|e| AuthError::Storage(format!("{:#}", e)))?;
        log::info!("signed in as {} ({})", user.email, user.role);

        Ok(LoginOutcome { access_token, user })
    }

    /// Sign in from a role's login page. A session of the other role is
    /// dropped again immediately.
    pub fn login_as(&self, role: Role, credentials: &Credentials) -> Result<LoginOutcome, AuthError> {
        let outcome = self.login(credentials)?;
        if !self.has_role(role) {
            self.api.session().clear();
            return Err(AuthError::WrongRole {
                expected: role,
                actual: outcome.user.role,
            });
        }
        self.navigator.navigate(Route::dashboard_for(role));
        Ok(outcome)
    }

    /// Drop the session and return to the root page. Never fails.
    pub fn logout(&self) {
        self.api.session().clear();
        self.activity.logout();
        self.navigator.navigate(Route::Root);
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.api.session().current_user()
    }

    pub fn token(&self) -> Option<String> {
        self.api.session().token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.session().is_authenticated()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.api.session().has_role(role)
    }

    pub fn is_admin(&self) -> bool {
        self.api.session().is_admin()
    }

    pub fn is_teacher(&self) -> bool {
        self.api.session().is_teacher()
    }

    /// Exchange the stored token for a new one. A backend refusal returns
    /// `false` and keeps the session; any request failure logs out.
    pub fn refresh_token(&self) -> bool {
        let Some(current) = self.token() else {
            return false;
        };

        match self.api.exchange_token(&current) {
            Ok(Some(new_token)) => match self.api.session().replace_token(&new_token) {
                Ok(()) => {
                    self.activity.refresh(true);
                    true
                }
                Err(e) => {
                    log::warn!("failed to store refreshed token: {:#}", e);
                    self.activity.refresh(false);
                    false
                }
            },
            Ok(None) => {
                self.activity.refresh(false);
                false
            }
            Err(e) => {
                log::warn!("token refresh failed: {}", e);
                self.activity.refresh(false);
                self.logout();
                false
            }
        }
    }
}

fn login_error(err: ApiError) -> AuthError {
    log::debug!("login request failed: {}", err);
    let message = err
        .backend_message()
        .unwrap_or(GENERIC_LOGIN_ERROR)
        .to_string();
    AuthError::Rejected(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::*;
    use crate::http::{Method, REFRESH_PATH};
    use serde_json::json;

    fn service(f: &Fixture) -> AuthService {
        // A second client over the same transport/session keeps the fixture usable
        let api = Rc::new(ApiClient::new(
            BASE,
            Box::new(f.transport.clone()),
            f.session.clone(),
            f.router.clone(),
            ActivityLog::disabled(),
        ));
        AuthService::new(api, f.router.clone(), ActivityLog::disabled())
    }

    fn creds(email: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: "admin123".to_string(),
        }
    }

    #[test]
    fn test_login_admin() {
        let f = fixture();
        let auth = service(&f);
        let token = token_expiring_in(Role::Admin, 7, 3600);
        f.transport
            .reply(Method::Post, LOGIN_PATH, 200, json!({"accessToken": token}));

        let outcome = auth.login(&creds("admin@school.com")).unwrap();
        assert_eq!(outcome.access_token, token);
        assert_eq!(
            outcome.user,
            UserIdentity {
                id: "7".to_string(),
                email: "admin@school.com".to_string(),
                role: Role::Admin,
                name: "admin".to_string(),
            }
        );
        assert!(auth.is_authenticated());
        assert!(auth.is_admin());
        assert!(!auth.is_teacher());
        assert_eq!(auth.token(), Some(token));

        match f.transport.last().body {
            crate::http::Body::Json(v) => {
                assert_eq!(v, json!({"email": "admin@school.com", "password": "admin123"}))
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_login_backend_message() {
        let f = fixture();
        let auth = service(&f);
        f.transport
            .reply(Method::Post, LOGIN_PATH, 400, json!({"message": "Wrong password"}));
        let err = auth.login(&creds("admin@school.com")).unwrap_err();
        assert_eq!(err.to_string(), "Wrong password");
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_login_generic_message() {
        let f = fixture();
        let auth = service(&f);
        f.transport.fail(Method::Post, LOGIN_PATH, "dns failure");
        let err = auth.login(&creds("admin@school.com")).unwrap_err();
        assert_eq!(err.to_string(), GENERIC_LOGIN_ERROR);
    }

    #[test]
    fn test_login_undecodable_token() {
        let f = fixture();
        let auth = service(&f);
        f.transport
            .reply(Method::Post, LOGIN_PATH, 200, json!({"accessToken": "not-a-token"}));
        let err = auth.login(&creds("admin@school.com")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        assert_eq!(err.to_string(), GENERIC_LOGIN_ERROR);
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn test_login_validation_skips_network() {
        let f = fixture();
        let auth = service(&f);
        assert!(matches!(auth.login(&creds("nope")), Err(AuthError::Invalid(_))));
        let mut c = creds("a@b.co");
        c.password.clear();
        assert!(matches!(auth.login(&c), Err(AuthError::Invalid(_))));
        assert!(f.transport.requests.borrow().is_empty());
    }

    #[test]
    fn test_login_as_wrong_role() {
        let f = fixture();
        let auth = service(&f);
        f.transport.reply(
            Method::Post,
            LOGIN_PATH,
            200,
            json!({"accessToken": token_expiring_in(Role::Teacher, 3, 3600)}),
        );
        let err = auth
            .login_as(Role::Admin, &creds("teacher@school.com"))
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::WrongRole {
                expected: Role::Admin,
                actual: Role::Teacher
            }
        ));
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_login_as_navigates_to_dashboard() {
        let f = fixture();
        let auth = service(&f);
        f.transport.reply(
            Method::Post,
            LOGIN_PATH,
            200,
            json!({"accessToken": token_expiring_in(Role::Teacher, 3, 3600)}),
        );
        auth.login_as(Role::Teacher, &creds("teacher@school.com"))
            .unwrap();
        assert_eq!(f.router.current(), Route::dashboard_for(Role::Teacher));
        assert!(auth.has_role(Role::Teacher));
    }

    #[test]
    fn test_logout_always_clears() {
        let f = fixture();
        let auth = service(&f);
        auth.logout();
        assert!(auth.current_user().is_none());

        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, 60));
        auth.logout();
        assert!(auth.current_user().is_none());
        assert!(auth.token().is_none());
        assert_eq!(f.router.take_navigations(), vec![Route::Root, Route::Root]);
    }

    #[test]
    fn test_refresh_token() {
        let f = fixture();
        let auth = service(&f);
        assert!(!auth.refresh_token());

        sign_in(&f.session, Role::Admin, &token_expiring_in(Role::Admin, 1, 60));
        f.transport
            .reply(Method::Post, REFRESH_PATH, 200, json!({"success": true, "data": {"accessToken": "n.e.w"}}))
            .reply(Method::Post, REFRESH_PATH, 200, json!({"success": false}))
            .reply(Method::Post, REFRESH_PATH, 500, json!({}));

        assert!(auth.refresh_token());
        assert_eq!(auth.token().as_deref(), Some("n.e.w"));

        assert!(!auth.refresh_token());
        assert!(auth.is_authenticated());

        assert!(!auth.refresh_token());
        assert!(!auth.is_authenticated());
        assert_eq!(f.router.current(), Route::Root);
    }
}
