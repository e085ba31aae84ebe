//! Client-side session state.
//!
//! The session lives in two cookies, `accessToken` and `user`, kept in a
//! [`CookieStore`]. All reads and writes go through one [`SessionContext`],
//! which is shared by the HTTP client, the auth service and the route guard.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const USER_COOKIE: &str = "user";

/// Access class of a signed-in user. The two roles do not nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity reconstructed at login from the token claims and the login form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub name: String,
}

impl UserIdentity {
    /// The backend returns no display name, so the email's local part is used.
    pub fn display_name_for(email: &str) -> String {
        email.split('@').next().unwrap_or_default().to_string()
    }
}

/// What the persisted cookies amount to right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Anonymous,
    Admin(UserIdentity),
    Teacher(UserIdentity),
}

impl Session {
    fn from_identity(identity: UserIdentity) -> Self {
        match identity.role {
            Role::Admin => Session::Admin(identity),
            Role::Teacher => Session::Teacher(identity),
        }
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        match self {
            Session::Anonymous => None,
            Session::Admin(user) | Session::Teacher(user) => Some(user),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Session::Anonymous => None,
            Session::Admin(_) => Some(Role::Admin),
            Session::Teacher(_) => Some(Role::Teacher),
        }
    }
}

/// Name/value storage with per-entry expiry, the way a browser cookie jar works.
pub trait CookieStore {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct Cookie {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Cookie {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Cookie jar persisted as a JSON object on disk.
pub struct FileCookieStore {
    path: PathBuf,
}

impl FileCookieStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, Cookie>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cookie jar {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let jar = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt cookie jar {}", self.path.display()))?;
        Ok(jar)
    }

    fn save(&self, jar: &HashMap<String, Cookie>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash never leaves half a jar behind
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(jar)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write cookie jar {}", self.path.display()))?;
        Ok(())
    }
}

impl CookieStore for FileCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        let jar = match self.load() {
            Ok(jar) => jar,
            Err(e) => {
                log::warn!("{:#}", e);
                return None;
            }
        };
        jar.get(name)
            .filter(|c| c.is_live(Utc::now()))
            .map(|c| c.value.clone())
    }

    fn set(&self, name: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        // A corrupt jar is replaced rather than blocking a fresh login
        let mut jar = self.load().unwrap_or_default();
        let now = Utc::now();
        jar.retain(|_, c| c.is_live(now));
        jar.insert(
            name.to_string(),
            Cookie {
                value: value.to_string(),
                expires_at,
            },
        );
        self.save(&jar)
    }

    fn remove(&self, name: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        // An unreadable jar is dropped entirely
        let mut jar = self.load().unwrap_or_default();
        jar.remove(name);
        if jar.is_empty() {
            std::fs::remove_file(&self.path)?;
            Ok(())
        } else {
            self.save(&jar)
        }
    }
}

/// In-process cookie jar.
#[derive(Default)]
pub struct MemoryCookieStore {
    cookies: RefCell<HashMap<String, Cookie>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .borrow()
            .get(name)
            .filter(|c| c.is_live(Utc::now()))
            .map(|c| c.value.clone())
    }

    fn set(&self, name: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.cookies.borrow_mut().insert(
            name.to_string(),
            Cookie {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.cookies.borrow_mut().remove(name);
        Ok(())
    }
}

pub type Listener = Box<dyn Fn(&Session)>;

/// The single owner of session reads and writes.
pub struct SessionContext {
    store: Box<dyn CookieStore>,
    expiry: Duration,
    listeners: RefCell<Vec<Listener>>,
}

impl SessionContext {
    pub fn new(store: Box<dyn CookieStore>, expiry_days: u32) -> Self {
        Self {
            store,
            expiry: Duration::days(i64::from(expiry_days)),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// In-memory context with the default 7-day expiry
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCookieStore::new()), 7)
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_COOKIE).filter(|t| !t.is_empty())
    }

    /// The persisted identity, or `None` when it is missing or unreadable.
    pub fn current_user(&self) -> Option<UserIdentity> {
        let raw = self.store.get(USER_COOKIE)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                log::debug!("ignoring unreadable user cookie: {}", e);
                None
            }
        }
    }

    /// Presence check only: a stored but expired token still counts.
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some() && self.current_user().is_some()
    }

    /// Session as seen by routing. Requires both cookies, like
    /// [`is_authenticated`](Self::is_authenticated).
    pub fn session(&self) -> Session {
        if self.token().is_none() {
            return Session::Anonymous;
        }
        match self.current_user() {
            Some(user) => Session::from_identity(user),
            None => Session::Anonymous,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.current_user().is_some_and(|u| u.role == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_teacher(&self) -> bool {
        self.has_role(Role::Teacher)
    }

    fn expires_at(&self) -> Result<DateTime<Utc>> {
        Utc::now()
            .checked_add_signed(self.expiry)
            .with_context(|| format!("cookie expiry of {} days is out of range", self.expiry.num_days()))
    }

    /// Persist a fresh login. Either both cookies are written or neither is.
    pub fn store_login(&self, token: &str, user: &UserIdentity) -> Result<()> {
        let expires_at = self.expires_at()?;
        let user_json = serde_json::to_string(user)?;
        self.store.set(ACCESS_TOKEN_COOKIE, token, expires_at)?;
        if let Err(e) = self.store.set(USER_COOKIE, &user_json, expires_at) {
            if let Err(undo) = self.store.remove(ACCESS_TOKEN_COOKIE) {
                log::warn!("failed to roll back {} cookie: {:#}", ACCESS_TOKEN_COOKIE, undo);
            }
            return Err(e);
        }
        self.notify();
        Ok(())
    }

    /// Swap the access token after a refresh. The identity is left as is.
    pub fn replace_token(&self, token: &str) -> Result<()> {
        self.store
            .set(ACCESS_TOKEN_COOKIE, token, self.expires_at()?)?;
        self.notify();
        Ok(())
    }

    /// Drop both cookies. Storage errors are logged, never returned.
    pub fn clear(&self) {
        for name in [ACCESS_TOKEN_COOKIE, USER_COOKIE] {
            if let Err(e) = self.store.remove(name) {
                log::warn!("failed to remove {} cookie: {:#}", name, e);
            }
        }
        self.notify();
    }

    /// Register a callback run after every session write.
    pub fn subscribe(&self, listener: Listener) {
        self.listeners.borrow_mut().push(listener);
    }

    fn notify(&self) {
        let session = self.session();
        for listener in self.listeners.borrow().iter() {
            listener(&session);
        }
    }
}
