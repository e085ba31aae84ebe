//! Text renderings of every route.
//!
//! Protected pages mount through [`ProtectedLayout`]; a failed fetch shows up
//! as an `Error: ...` line in place of the data it was meant to produce.

use crate::guard::{AdminPage, Navigator, ProtectedLayout, Route, TeacherPage};
use crate::http::ApiClient;
use crate::services::models::{Course, CourseStatus, Lesson};
use crate::services::{CourseService, ServiceError, StudentService, TeacherService};
use crate::session::{Role, SessionContext, UserIdentity};
use std::fmt::Write as _;
use std::rc::Rc;

pub struct Pages {
    session: Rc<SessionContext>,
    navigator: Rc<dyn Navigator>,
    courses: CourseService,
    students: StudentService,
    teachers: TeacherService,
}

impl Pages {
    pub fn new(api: Rc<ApiClient>, session: Rc<SessionContext>, navigator: Rc<dyn Navigator>) -> Self {
        Self {
            session,
            navigator,
            courses: CourseService::new(api.clone()),
            students: StudentService::new(api.clone()),
            teachers: TeacherService::new(api),
        }
    }

    /// Render `route`. `None` means the guard redirected instead.
    pub fn render(&self, route: Route) -> Option<String> {
        let layout = ProtectedLayout::new(&self.session, self.navigator.as_ref());
        match route {
            Route::Root => Some(self.root()),
            Route::AdminLogin => Some(self.login(Role::Admin)),
            Route::TeacherLogin => Some(self.login(Role::Teacher)),
            Route::Admin(page) => layout.mount(Role::Admin, |_| match page {
                AdminPage::Dashboard => self.admin_dashboard(),
                AdminPage::Courses => self.admin_courses(),
                AdminPage::Teachers => self.admin_teachers(),
                AdminPage::Students => self.admin_students(),
            }),
            Route::Teacher(page) => layout.mount(Role::Teacher, |user| match page {
                TeacherPage::Dashboard => self.teacher_dashboard(user),
                TeacherPage::Courses => self.teacher_courses(user),
                TeacherPage::Sessions => self.teacher_sessions(user),
            }),
        }
    }

    fn root(&self) -> String {
        let mut out = String::from("School management\n\n");
        for role in [Role::Admin, Role::Teacher] {
            let _ = writeln!(
                out,
                "  {:<16} {}",
                format!("{} login", capitalize(role.as_str())),
                Route::login_for(role)
            );
        }
        if let Some(user) = self.session.current_user() {
            let _ = writeln!(
                out,
                "\nSigned in as {} ({}), dashboard at {}",
                user.email,
                user.role,
                Route::dashboard_for(user.role)
            );
        }
        out
    }

    fn login(&self, role: Role) -> String {
        let mut out = format!("{} login\n\n", capitalize(role.as_str()));
        let _ = writeln!(out, "  login --role {} --email <email> --password <password>", role);
        if self.session.has_role(role) {
            let _ = writeln!(out, "\nAlready signed in, continue at {}", Route::dashboard_for(role));
        }
        out
    }

    fn admin_dashboard(&self) -> String {
        let mut out = String::from("Dashboard\n\n");
        let courses = self.courses.list();
        match &courses {
            Ok(list) => {
                let active = list.iter().filter(|c| c.status == CourseStatus::Active).count();
                let _ = writeln!(out, "  Courses          {}", list.len());
                let _ = writeln!(out, "  Active courses   {}", active);
            }
            Err(e) => error_line(&mut out, e),
        }
        match self.students.list() {
            Ok(list) => {
                let _ = writeln!(out, "  Students         {}", list.len());
            }
            Err(e) => error_line(&mut out, &e),
        }
        match self.teachers.list() {
            Ok(list) => {
                let _ = writeln!(out, "  Teachers         {}", list.len());
            }
            Err(e) => error_line(&mut out, &e),
        }

        if let Ok(list) = courses {
            let active: Vec<Course> = list
                .into_iter()
                .filter(|c| c.status == CourseStatus::Active)
                .collect();
            out.push_str("\nActive courses\n");
            course_table(&mut out, &active);
        }
        out
    }

    fn admin_courses(&self) -> String {
        let mut out = String::from("Courses\n\n");
        match self.courses.list() {
            Ok(list) => course_table(&mut out, &list),
            Err(e) => error_line(&mut out, &e),
        }
        out
    }

    fn admin_teachers(&self) -> String {
        let mut out = String::from("Teachers\n\n");
        match self.teachers.list() {
            Ok(list) if list.is_empty() => out.push_str("  No teachers yet\n"),
            Ok(list) => {
                let _ = writeln!(out, "  {:<6} {:<24} {}", "ID", "NAME", "EMAIL");
                for t in &list {
                    let _ = writeln!(out, "  {:<6} {:<24} {}", t.id, t.name(), t.email());
                }
            }
            Err(e) => error_line(&mut out, &e),
        }
        out
    }

    fn admin_students(&self) -> String {
        let mut out = String::from("Students\n\n");
        match self.students.list() {
            Ok(list) if list.is_empty() => out.push_str("  No students yet\n"),
            Ok(list) => {
                let _ = writeln!(out, "  {:<6} {:<24} {:<28} {:<14} {}", "ID", "NAME", "EMAIL", "PHONE", "NEW");
                for s in &list {
                    let _ = writeln!(
                        out,
                        "  {:<6} {:<24} {:<28} {:<14} {}",
                        s.id,
                        s.name,
                        s.email,
                        s.phone,
                        if s.is_new { "yes" } else { "no" }
                    );
                }
            }
            Err(e) => error_line(&mut out, &e),
        }
        out
    }

    fn teacher_dashboard(&self, user: &UserIdentity) -> String {
        let mut out = format!("Welcome, {}\n\n", user.name);
        let courses = match self.courses.for_teacher_user(&user.id) {
            Ok(list) => list,
            Err(e) => {
                error_line(&mut out, &e);
                return out;
            }
        };

        let count = |status: CourseStatus| courses.iter().filter(|c| c.status == status).count();
        let _ = writeln!(out, "  Active courses      {}", count(CourseStatus::Active));
        let _ = writeln!(out, "  Completed courses   {}", count(CourseStatus::Completed));

        let mut total = 0;
        let mut completed = 0;
        for course in &courses {
            match self.courses.stats(&course.id) {
                Ok(stats) => {
                    total += stats.total_lessons;
                    completed += stats.completed_lessons;
                }
                Err(e) => error_line(&mut out, &e),
            }
        }
        let _ = writeln!(out, "  Total lessons       {}", total);
        let _ = writeln!(out, "  Completed lessons   {}", completed);
        out
    }

    fn teacher_courses(&self, user: &UserIdentity) -> String {
        let mut out = String::from("My courses\n\n");
        match self.courses.for_teacher_user(&user.id) {
            Ok(list) => course_table(&mut out, &list),
            Err(e) => error_line(&mut out, &e),
        }
        out
    }

    fn teacher_sessions(&self, user: &UserIdentity) -> String {
        let mut out = String::from("Sessions\n");
        let courses = match self.courses.for_teacher_user(&user.id) {
            Ok(list) => list,
            Err(e) => {
                error_line(&mut out, &e);
                return out;
            }
        };
        if courses.is_empty() {
            out.push_str("\n  No courses assigned\n");
        }
        for course in &courses {
            let _ = writeln!(out, "\n{} ({})", course.title, course.course_no);
            match self.courses.lessons(&course.id) {
                Ok(lessons) => lesson_table(&mut out, &lessons),
                Err(e) => error_line(&mut out, &e),
            }
        }
        out
    }
}

fn error_line(out: &mut String, err: &ServiceError) {
    let _ = writeln!(out, "Error: {}", err);
}

fn course_table(out: &mut String, courses: &[Course]) {
    if courses.is_empty() {
        out.push_str("  No courses\n");
        return;
    }
    let _ = writeln!(
        out,
        "  {:<6} {:<24} {:<10} {:<20} {:<8} {:<10} {}",
        "ID", "TITLE", "NO", "TEACHER", "LESSONS", "STATUS", "CREATED"
    );
    for c in courses {
        let _ = writeln!(
            out,
            "  {:<6} {:<24} {:<10} {:<20} {:<8} {:<10} {}",
            c.id,
            c.title,
            c.course_no,
            c.teacher_name.as_deref().unwrap_or("-"),
            c.total_lessons,
            c.status.as_str(),
            c.created_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
}

fn lesson_table(out: &mut String, lessons: &[Lesson]) {
    if lessons.is_empty() {
        out.push_str("  No sessions planned\n");
        return;
    }
    for l in lessons {
        let mark = if l.is_completed { "x" } else { " " };
        let _ = writeln!(
            out,
            "  [{}] #{:<3} {:<6} {:<12} {:<10} {}",
            mark,
            l.lesson_number,
            l.id,
            l.date.as_deref().unwrap_or("-"),
            l.status.as_str(),
            l.topic
        );
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
