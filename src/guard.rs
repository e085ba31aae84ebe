//! Routes, navigation and the role guard in front of protected pages.
//!
//! Guarding is advisory: it keeps protected pages from rendering for the wrong
//! session, but the backend still authorizes every request on its own.

use crate::activity::ActivityLog;
use crate::session::{Role, Session, SessionContext, UserIdentity};
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminPage {
    Dashboard,
    Courses,
    Teachers,
    Students,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherPage {
    Dashboard,
    Courses,
    Sessions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Root,
    AdminLogin,
    TeacherLogin,
    Admin(AdminPage),
    Teacher(TeacherPage),
}

impl Route {
    /// Parse a URL path such as `/admin/courses`.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        let route = match path {
            "" | "/" => Route::Root,
            "/admin/login" => Route::AdminLogin,
            "/teacher/login" => Route::TeacherLogin,
            "/admin" | "/admin/dashboard" => Route::Admin(AdminPage::Dashboard),
            "/admin/courses" => Route::Admin(AdminPage::Courses),
            "/admin/teachers" => Route::Admin(AdminPage::Teachers),
            "/admin/students" => Route::Admin(AdminPage::Students),
            "/teacher" | "/teacher/dashboard" => Route::Teacher(TeacherPage::Dashboard),
            "/teacher/courses" => Route::Teacher(TeacherPage::Courses),
            "/teacher/sessions" => Route::Teacher(TeacherPage::Sessions),
            _ => return None,
        };
        Some(route)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Root => "/",
            Route::AdminLogin => "/admin/login",
            Route::TeacherLogin => "/teacher/login",
            Route::Admin(AdminPage::Dashboard) => "/admin/dashboard",
            Route::Admin(AdminPage::Courses) => "/admin/courses",
            Route::Admin(AdminPage::Teachers) => "/admin/teachers",
            Route::Admin(AdminPage::Students) => "/admin/students",
            Route::Teacher(TeacherPage::Dashboard) => "/teacher/dashboard",
            Route::Teacher(TeacherPage::Courses) => "/teacher/courses",
            Route::Teacher(TeacherPage::Sessions) => "/teacher/sessions",
        }
    }

    pub fn login_for(role: Role) -> Self {
        match role {
            Role::Admin => Route::AdminLogin,
            Role::Teacher => Route::TeacherLogin,
        }
    }

    pub fn dashboard_for(role: Role) -> Self {
        match role {
            Role::Admin => Route::Admin(AdminPage::Dashboard),
            Role::Teacher => Route::Teacher(TeacherPage::Dashboard),
        }
    }

    /// Every route, in menu order
    pub fn all() -> [Route; 10] {
        [
            Route::Root,
            Route::AdminLogin,
            Route::TeacherLogin,
            Route::Admin(AdminPage::Dashboard),
            Route::Admin(AdminPage::Courses),
            Route::Admin(AdminPage::Teachers),
            Route::Admin(AdminPage::Students),
            Route::Teacher(TeacherPage::Dashboard),
            Route::Teacher(TeacherPage::Courses),
            Route::Teacher(TeacherPage::Sessions),
        ]
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Moves the client to another route.
pub trait Navigator {
    fn navigate(&self, route: Route);
}

/// Navigator that tracks the current route and every navigation since the
/// last [`take_navigations`](Router::take_navigations).
pub struct Router {
    current: RefCell<Route>,
    navigations: RefCell<Vec<Route>>,
    activity: ActivityLog,
}

impl Router {
    pub fn new(start: Route, activity: ActivityLog) -> Self {
        Self {
            current: RefCell::new(start),
            navigations: RefCell::new(Vec::new()),
            activity,
        }
    }

    pub fn current(&self) -> Route {
        *self.current.borrow()
    }

    pub fn take_navigations(&self) -> Vec<Route> {
        std::mem::take(&mut *self.navigations.borrow_mut())
    }

    /// Go to a route the user asked for. Unlike [`Navigator::navigate`] this
    /// is not recorded as a redirect.
    pub fn visit(&self, route: Route) {
        log::debug!("visiting {}", route);
        self.current.replace(route);
    }
}

impl Navigator for Router {
    fn navigate(&self, route: Route) {
        let from = self.current.replace(route);
        log::info!("navigating {} -> {}", from, route);
        self.activity.redirect(from.path(), route.path());
        self.navigations.borrow_mut().push(route);
    }
}

/// Outcome of mounting a protected page. Resolution happens before anything
/// renders, so there is no observable loading phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Authorized(UserIdentity),
    Redirecting(Route),
}

impl GuardState {
    /// Resolve a page against the session. The redirect target is
    /// the login page of the role the page requires, whatever role the
    /// session holds.
    pub fn resolve(required: Role, session: &Session) -> GuardState {
        let denied = GuardState::Redirecting(Route::login_for(required));
        match (required, session) {
            (_, Session::Anonymous) => denied,
            (Role::Admin, Session::Admin(user)) => GuardState::Authorized(user.clone()),
            (Role::Teacher, Session::Teacher(user)) => GuardState::Authorized(user.clone()),
            (Role::Admin, Session::Teacher(_)) | (Role::Teacher, Session::Admin(_)) => denied,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub label: &'static str,
    pub route: Route,
}

const ADMIN_MENU: &[MenuItem] = &[
    MenuItem {
        label: "Dashboard",
        route: Route::Admin(AdminPage::Dashboard),
    },
    MenuItem {
        label: "Courses",
        route: Route::Admin(AdminPage::Courses),
    },
    MenuItem {
        label: "Teachers",
        route: Route::Admin(AdminPage::Teachers),
    },
    MenuItem {
        label: "Students",
        route: Route::Admin(AdminPage::Students),
    },
];

const TEACHER_MENU: &[MenuItem] = &[
    MenuItem {
        label: "Dashboard",
        route: Route::Teacher(TeacherPage::Dashboard),
    },
    MenuItem {
        label: "My courses",
        route: Route::Teacher(TeacherPage::Courses),
    },
    MenuItem {
        label: "Sessions",
        route: Route::Teacher(TeacherPage::Sessions),
    },
];

pub fn menu_for(role: Role) -> &'static [MenuItem] {
    match role {
        Role::Admin => ADMIN_MENU,
        Role::Teacher => TEACHER_MENU,
    }
}

pub fn panel_title(role: Role) -> &'static str {
    match role {
        Role::Admin => "Admin Panel",
        Role::Teacher => "Teacher Panel",
    }
}

/// Layout shared by every protected page: guard, then menu, then body.
pub struct ProtectedLayout<'a> {
    session: &'a SessionContext,
    navigator: &'a dyn Navigator,
}

impl<'a> ProtectedLayout<'a> {
    pub fn new(session: &'a SessionContext, navigator: &'a dyn Navigator) -> Self {
        Self { session, navigator }
    }

    /// Mount a page requiring `required`. Returns the rendered page, or `None`
    /// after starting a redirect. `body` runs only for an authorized session.
    pub fn mount<F>(&self, required: Role, body: F) -> Option<String>
    where
        F: FnOnce(&UserIdentity) -> String,
    {
        let state = GuardState::resolve(required, &self.session.session());
        log::debug!("mounting {} page: {:?}", required, state);
        match state {
            GuardState::Authorized(user) => {
                let mut out = render_menu(required, &user);
                out.push_str(&body(&user));
                Some(out)
            }
            GuardState::Redirecting(route) => {
                self.navigator.navigate(route);
                None
            }
        }
    }
}

fn render_menu(role: Role, user: &UserIdentity) -> String {
    let mut out = format!("== {} ==\n{}\n", panel_title(role), user.email);
    for item in menu_for(role) {
        out.push_str(&format!("  {:<12} {}\n", item.label, item.route.path()));
    }
    out.push_str(&format!("  {:<12} {}\n", "Log out", "logout"));
    out.push_str(&"-".repeat(40));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> UserIdentity {
        UserIdentity {
            id: "5".to_string(),
            email: format!("{}@school.com", role),
            role,
            name: role.to_string(),
        }
    }

    fn router() -> Router {
        Router::new(Route::Root, ActivityLog::disabled())
    }

    #[test]
    fn test_route_round_trip() {
        for route in Route::all() {
            assert_eq!(Route::parse(route.path()), Some(route));
        }
        assert_eq!(Route::parse("/admin/courses/"), Some(Route::Admin(AdminPage::Courses)));
        assert_eq!(Route::parse("/admin"), Some(Route::Admin(AdminPage::Dashboard)));
        assert_eq!(Route::parse("/admin/payments"), None);
    }

    #[test]
    fn test_resolve() {
        let admin = Session::Admin(user(Role::Admin));
        let teacher = Session::Teacher(user(Role::Teacher));

        assert_eq!(
            GuardState::resolve(Role::Admin, &admin),
            GuardState::Authorized(user(Role::Admin))
        );
        assert_eq!(
            GuardState::resolve(Role::Admin, &Session::Anonymous),
            GuardState::Redirecting(Route::AdminLogin)
        );
        // Keyed by the page's role, not the session's
        assert_eq!(
            GuardState::resolve(Role::Admin, &teacher),
            GuardState::Redirecting(Route::AdminLogin)
        );
        assert_eq!(
            GuardState::resolve(Role::Teacher, &admin),
            GuardState::Redirecting(Route::TeacherLogin)
        );
    }

    #[test]
    fn test_mount_without_session_redirects() {
        let session = SessionContext::in_memory();
        let nav = router();
        let mut rendered = false;
        let out = ProtectedLayout::new(&session, &nav).mount(Role::Admin, |_| {
            rendered = true;
            "secret".to_string()
        });
        assert!(out.is_none());
        assert!(!rendered);
        assert_eq!(nav.current(), Route::AdminLogin);
        assert_eq!(nav.take_navigations(), vec![Route::AdminLogin]);
    }

    #[test]
    fn test_mount_wrong_role_redirects_to_page_login() {
        let session = SessionContext::in_memory();
        session.store_login("a.b.c", &user(Role::Teacher)).unwrap();
        let nav = router();
        let out = ProtectedLayout::new(&session, &nav).mount(Role::Admin, |_| "x".to_string());
        assert!(out.is_none());
        assert_eq!(nav.take_navigations(), vec![Route::AdminLogin]);
    }

    #[test]
    fn test_mount_authorized_renders_menu_and_body() {
        let session = SessionContext::in_memory();
        session.store_login("a.b.c", &user(Role::Teacher)).unwrap();
        let nav = router();
        let out = ProtectedLayout::new(&session, &nav)
            .mount(Role::Teacher, |u| format!("hello {}\n", u.name))
            .unwrap();
        assert!(out.starts_with("== Teacher Panel ==\nteacher@school.com\n"));
        assert!(out.contains("/teacher/sessions"));
        assert!(!out.contains("/admin/"));
        assert!(out.ends_with("hello teacher\n"));
        assert!(nav.take_navigations().is_empty());
    }
}
