use crate::activity::ActivityLog;
use crate::auth::{AuthService, Credentials};
use crate::config::Config;
use crate::guard::{Route, Router};
use crate::http::{ApiClient, Transport, UreqTransport};
use crate::pages::Pages;
use crate::services::courses::{CourseUpdate, NewCourse};
use crate::services::lessons::{LessonUpdate, NewLesson};
use crate::services::models::{CourseStatus, LessonStatus};
use crate::services::students::{NewStudent, StudentUpdate};
use crate::services::teachers::{NewTeacher, TeacherUpdate};
use crate::services::{CourseService, LessonService, StudentService, TeacherService};
use crate::session::{CookieStore, FileCookieStore, MemoryCookieStore, Role, SessionContext};
use crate::token;
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::rc::Rc;

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in from the admin or teacher login page
    Login {
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SCHOOLDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Exchange the stored token for a fresh one
    Refresh,
    /// Render a page, e.g. /admin/courses
    Open { route: String },
    #[command(subcommand)]
    Courses(CourseCommand),
    #[command(subcommand)]
    Students(StudentCommand),
    #[command(subcommand)]
    Teachers(TeacherCommand),
    /// Lesson sessions of a course
    #[command(subcommand)]
    Sessions(SessionCommand),
    /// Interactive shell (the default)
    Shell,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CourseCommand {
    /// List courses, optionally filtered
    List {
        #[arg(long, value_parser = parse_course_status)]
        status: Option<CourseStatus>,
        #[arg(long, help = "Teacher id")]
        teacher: Option<String>,
    },
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        course_no: String,
        #[arg(long)]
        teacher_id: u64,
        #[arg(long)]
        total_sessions: u32,
    },
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        course_no: Option<String>,
        #[arg(long)]
        teacher_id: Option<u64>,
        #[arg(long)]
        total_sessions: Option<u32>,
        #[arg(long, value_parser = parse_course_status)]
        status: Option<CourseStatus>,
    },
    Delete {
        id: String,
    },
    Enroll {
        id: String,
        #[arg(long)]
        student_id: u64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum StudentCommand {
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        new: bool,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TeacherCommand {
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    Create {
        #[arg(long)]
        course_id: u64,
        #[arg(long)]
        number: u32,
        #[arg(long)]
        date: String,
        #[arg(long)]
        topic: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    Update {
        id: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, value_parser = parse_lesson_status)]
        status: Option<LessonStatus>,
    },
    Complete {
        id: String,
    },
    Cancel {
        id: String,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::from_str(s).ok_or_else(|| format!("unknown role '{}', expected admin or teacher", s))
}

fn parse_course_status(s: &str) -> Result<CourseStatus, String> {
    CourseStatus::from_str(s)
        .ok_or_else(|| format!("unknown status '{}', expected active, completed or cancelled", s))
}

fn parse_lesson_status(s: &str) -> Result<LessonStatus, String> {
    LessonStatus::from_str(s)
        .ok_or_else(|| format!("unknown status '{}', expected planned, completed or cancelled", s))
}

/// A shell line parsed with the same subcommands as the binary.
#[derive(Parser, Debug)]
#[command(name = "schooldesk", no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

pub struct Context {
    pub config: Config,
    pub session: Rc<SessionContext>,
    pub router: Rc<Router>,
    pub auth: AuthService,
    pub pages: Pages,
    pub courses: CourseService,
    pub students: StudentService,
    pub teachers: TeacherService,
    pub lessons: LessonService,
    pub activity: ActivityLog,
}

impl Context {
    /// `ephemeral` keeps the session in memory instead of the cookie jar.
    pub fn new(config: Config, activity: ActivityLog, ephemeral: bool) -> Self {
        let transport = UreqTransport::new(config.timeout_ms());
        let store: Box<dyn CookieStore> = if ephemeral {
            Box::new(MemoryCookieStore::new())
        } else {
            let jar = FileCookieStore::new(&config.cookie_file());
            log::debug!("cookie jar: {}", jar.path().display());
            Box::new(jar)
        };
        let session = SessionContext::new(store, config.expiry_days());
        Self::from_parts(config, Box::new(transport), session, activity)
    }

    pub fn from_parts(
        config: Config,
        transport: Box<dyn Transport>,
        session: SessionContext,
        activity: ActivityLog,
    ) -> Self {
        let session = Rc::new(session);
        session.subscribe(Box::new(|s| log::debug!("session changed: {:?}", s.role())));

        let router = Rc::new(Router::new(Route::Root, activity.clone()));
        let api = Rc::new(ApiClient::new(
            config.base_url(),
            transport,
            session.clone(),
            router.clone(),
            activity.clone(),
        ));

        Self {
            auth: AuthService::new(api.clone(), router.clone(), activity.clone()),
            pages: Pages::new(api.clone(), session.clone(), router.clone()),
            courses: CourseService::new(api.clone()),
            students: StudentService::new(api.clone()),
            teachers: TeacherService::new(api.clone()),
            lessons: LessonService::new(api),
            config,
            session,
            router,
            activity,
        }
    }
}

pub fn run_once(ctx: &Context, command: &Commands) -> Result<()> {
    let result = execute(ctx, command);
    for route in ctx.router.take_navigations() {
        log::info!("redirected to {}", route);
    }
    result
}

/// Run one command. Failures, including a guard redirect on `open`, come
/// back as errors so the process exits non-zero.
pub fn execute(ctx: &Context, command: &Commands) -> Result<()> {
    match command {
        Commands::Login {
            role,
            email,
            password,
        } => {
            let creds = Credentials {
                email: email.clone(),
                password: password.clone(),
            };
            let outcome = ctx.auth.login_as(*role, &creds)?;
            println!("Signed in as {} ({})", outcome.user.email, outcome.user.role);
        }
        Commands::Logout => {
            ctx.auth.logout();
            println!("Signed out");
        }
        Commands::Whoami => whoami(ctx)?,
        Commands::Refresh => {
            if !ctx.auth.is_authenticated() {
                bail!("not signed in");
            }
            if !ctx.auth.refresh_token() {
                bail!("token refresh failed");
            }
            println!("Token refreshed");
        }
        Commands::Open { route } => {
            let route =
                Route::parse(route).ok_or_else(|| anyhow!("unknown page '{}'", route))?;
            open(ctx, route)?;
        }
        Commands::Courses(cmd) => courses(ctx, cmd)?,
        Commands::Students(cmd) => students(ctx, cmd)?,
        Commands::Teachers(cmd) => teachers(ctx, cmd)?,
        Commands::Sessions(cmd) => sessions(ctx, cmd)?,
        Commands::Shell => bail!("already in the shell"),
    }
    Ok(())
}

fn whoami(ctx: &Context) -> Result<()> {
    let session = ctx.session.session();
    let Some(user) = session.identity() else {
        bail!("not signed in");
    };
    println!("{} <{}>", user.name, user.email);
    println!("  role: {}", user.role);
    println!("  id:   {}", user.id);
    let home = if ctx.auth.is_admin() {
        Route::dashboard_for(Role::Admin)
    } else if ctx.auth.is_teacher() {
        Route::dashboard_for(Role::Teacher)
    } else {
        Route::Root
    };
    println!("  home: {}", home);
    if let Some(exp) = ctx.auth.token().as_deref().and_then(token::expiration_time) {
        let when = chrono::DateTime::from_timestamp(exp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| exp.to_string());
        let state = if ctx.auth.token().as_deref().is_some_and(token::is_expired) {
            "expired"
        } else {
            "valid"
        };
        println!("  token {} until {}", state, when);
    }
    Ok(())
}

/// Render `route`. A guard redirect is an error, after which the router
/// sits on the login page.
fn open(ctx: &Context, route: Route) -> Result<()> {
    ctx.router.visit(route);
    match ctx.pages.render(route) {
        Some(page) => {
            print!("{}", page);
            Ok(())
        }
        None => bail!(
            "{} needs a signed-in session, redirected to {}",
            route,
            ctx.router.current()
        ),
    }
}

fn ack_or(message: Option<String>, fallback: &str) -> String {
    message.unwrap_or_else(|| fallback.to_string())
}

fn courses(ctx: &Context, cmd: &CourseCommand) -> Result<()> {
    match cmd {
        CourseCommand::List { status, teacher } => {
            let mut list = match teacher {
                Some(teacher_id) => ctx.courses.by_teacher(teacher_id)?,
                None => match status {
                    Some(status) => ctx.courses.by_status(*status)?,
                    None => ctx.courses.list()?,
                },
            };
            if let (Some(status), Some(_)) = (status, teacher) {
                list.retain(|c| c.status == *status);
            }
            for c in &list {
                println!(
                    "{:<6} {:<24} {:<10} {}",
                    c.id,
                    c.title,
                    c.course_no,
                    c.status.as_str()
                );
            }
        }
        CourseCommand::Show { id } => {
            let course = ctx.courses.get(id)?;
            let stats = ctx.courses.stats(id)?;
            let c = &course.course;
            println!("{} ({}), {}", c.title, c.course_no, c.status.as_str());
            if let Some(name) = &c.teacher_name {
                println!("  teacher: {}", name);
            }
            println!(
                "  lessons: {}/{} completed",
                stats.completed_lessons, stats.total_lessons
            );
            for l in &course.lessons {
                println!(
                    "  #{} {} {} {}",
                    l.lesson_number,
                    l.date.as_deref().unwrap_or("-"),
                    l.status.as_str(),
                    l.topic
                );
            }
        }
        CourseCommand::Create {
            title,
            course_no,
            teacher_id,
            total_sessions,
        } => {
            let ack = ctx.courses.create(&NewCourse {
                title: title.clone(),
                course_no: course_no.clone(),
                teacher_id: *teacher_id,
                total_sessions: *total_sessions,
            })?;
            println!("{}", ack_or(ack.message, "Course created"));
        }
        CourseCommand::Update {
            id,
            title,
            course_no,
            teacher_id,
            total_sessions,
            status,
        } => {
            let update = CourseUpdate {
                title: title.clone(),
                course_no: course_no.clone(),
                teacher_id: *teacher_id,
                total_sessions: *total_sessions,
                status: *status,
            };
            if update.is_empty() {
                bail!("nothing to update");
            }
            let ack = ctx.courses.update(id, &update)?;
            println!("{}", ack_or(ack.message, "Course updated"));
        }
        CourseCommand::Delete { id } => {
            ctx.courses.delete(id)?;
            println!("Course {} deleted", id);
        }
        CourseCommand::Enroll { id, student_id } => {
            let ack = ctx.courses.enroll(id, *student_id)?;
            println!("{}", ack_or(ack.message, "Student enrolled"));
        }
    }
    Ok(())
}

fn students(ctx: &Context, cmd: &StudentCommand) -> Result<()> {
    match cmd {
        StudentCommand::Show { id } => {
            let student = ctx.students.get(id)?;
            let stats = ctx.students.stats(id)?;
            println!("{} <{}> {}", student.name, student.email, student.phone);
            println!(
                "  courses: {} ({} active, {} completed)",
                stats.total_courses, stats.active_courses, stats.completed_courses
            );
        }
        StudentCommand::Create {
            name,
            phone,
            email,
            new,
        } => {
            let created = ctx.students.create(&NewStudent {
                name: name.clone(),
                phone: phone.clone(),
                email: email.clone(),
                is_new: *new,
            })?;
            match created.student {
                Some(s) => println!("Student {} created ({})", s.id, s.name),
                None => println!("{}", ack_or(created.message, "Student created")),
            }
        }
        StudentCommand::Update {
            id,
            name,
            phone,
            email,
        } => {
            let student = ctx.students.update(
                id,
                &StudentUpdate {
                    name: name.clone(),
                    phone: phone.clone(),
                    email: email.clone(),
                },
            )?;
            println!("Student {} updated", student.id);
        }
        StudentCommand::Delete { id } => {
            ctx.students.delete(id)?;
            println!("Student {} deleted", id);
        }
    }
    Ok(())
}

fn teachers(ctx: &Context, cmd: &TeacherCommand) -> Result<()> {
    match cmd {
        TeacherCommand::Show { id } => {
            let teacher = match ctx.teachers.get(id) {
                Ok(teacher) => teacher,
                Err(e) if e.is_not_found() => bail!("no teacher with id {}", id),
                Err(e) => return Err(e.into()),
            };
            println!("{} <{}>", teacher.name(), teacher.email());
            let courses = ctx.courses.by_teacher(id)?;
            for c in &courses {
                println!("  {} {} ({})", c.id, c.title, c.status.as_str());
            }
        }
        TeacherCommand::Create {
            name,
            email,
            password,
        } => {
            let created = ctx.teachers.create(&NewTeacher {
                name: name.clone(),
                email: email.clone(),
                password: password.clone(),
            })?;
            match created.teacher {
                Some(t) => println!("Teacher {} created", t.id),
                None => println!("{}", ack_or(created.message, "Teacher created")),
            }
        }
        TeacherCommand::Update { id, name, email } => {
            let teacher = ctx.teachers.update(
                id,
                &TeacherUpdate {
                    name: name.clone(),
                    email: email.clone(),
                },
            )?;
            println!("Teacher {} updated", teacher.id);
        }
        TeacherCommand::Delete { id } => {
            ctx.teachers.delete(id)?;
            println!("Teacher {} deleted", id);
        }
    }
    Ok(())
}

fn sessions(ctx: &Context, cmd: &SessionCommand) -> Result<()> {
    match cmd {
        SessionCommand::Create {
            course_id,
            number,
            date,
            topic,
            notes,
        } => {
            let lesson = ctx.lessons.create(&NewLesson {
                course_id: *course_id,
                session_number: *number,
                date: date.clone(),
                topic: topic.clone(),
                notes: notes.clone(),
            })?;
            println!("Session {} created (#{})", lesson.id, lesson.lesson_number);
        }
        SessionCommand::Update {
            id,
            date,
            topic,
            notes,
            status,
        } => {
            let lesson = ctx.lessons.update(
                id,
                &LessonUpdate {
                    date: date.clone(),
                    topic: topic.clone(),
                    notes: notes.clone(),
                    status: *status,
                },
            )?;
            println!("Session {} is {}", lesson.id, lesson.status.as_str());
        }
        SessionCommand::Complete { id } => {
            ctx.lessons.complete(id)?;
            println!("Session {} completed", id);
        }
        SessionCommand::Cancel { id } => {
            ctx.lessons.cancel(id)?;
            println!("Session {} cancelled", id);
        }
    }
    Ok(())
}

/// Print the current page, following a guard redirect once.
fn show_current(ctx: &Context) {
    let route = ctx.router.current();
    if let Some(page) = ctx.pages.render(route) {
        print!("{}", page);
        return;
    }
    let target = ctx.router.current();
    println!("Redirected to {}", target);
    if let Some(page) = ctx.pages.render(target) {
        print!("{}", page);
    }
}

fn print_help() {
    println!("Pages:");
    for route in Route::all() {
        println!("  {}", route);
    }
    println!("Commands:");
    println!("  login --role admin|teacher --email <email> --password <password>");
    println!("  logout | whoami | refresh");
    println!("  courses list|show|create|update|delete|enroll ...");
    println!("  students show|create|update|delete ...");
    println!("  teachers show|create|update|delete ...");
    println!("  sessions create|update|complete|cancel ...");
    println!("  help | exit");
    println!("Append --help to any command for its options.");
}

/// Handle one shell line. Returns `true` when the shell should exit.
fn handle_line(ctx: &Context, line: &str) -> bool {
    match line {
        "exit" | "quit" => return true,
        "help" | "?" => {
            print_help();
            return false;
        }
        _ => {}
    }

    if line.starts_with('/') {
        match Route::parse(line) {
            Some(route) => {
                ctx.router.visit(route);
                show_current(ctx);
            }
            None => println!("Unknown page: {}", line),
        }
        return false;
    }

    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("Error: {}", e);
            return false;
        }
    };
    match ShellLine::try_parse_from(words) {
        Ok(parsed) => {
            if let Err(e) = execute(ctx, &parsed.command) {
                eprintln!("Error: {:#}", e);
            }
            if !ctx.router.take_navigations().is_empty() {
                show_current(ctx);
            }
        }
        Err(e) => {
            let _ = e.print();
        }
    }
    false
}

fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|h| h.join(".schooldesk").join("history"))
}

pub fn run_repl(ctx: &Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    println!(
        "schooldesk ({}) - type help for commands, exit to quit",
        ctx.config.base_url()
    );
    if let Some(user) = ctx.auth.current_user() {
        println!("Signed in as {} ({})", user.email, user.role);
    }
    if let Some(path) = ctx.activity.path() {
        log::info!("activity log: {}", path.display());
    }
    show_current(ctx);

    loop {
        let prompt = format!("{}> ", ctx.router.current());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                if handle_line(ctx, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = rl.save_history(path) {
            log::debug!("could not save history: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::AdminPage;
    use crate::http::testing::token_expiring_in;
    use crate::http::transport::mock::ScriptedTransport;
    use crate::http::Method;
    use serde_json::json;

    fn context() -> (Context, Rc<ScriptedTransport>) {
        let transport = Rc::new(ScriptedTransport::new());
        let ctx = Context::from_parts(
            Config::default(),
            Box::new(transport.clone()),
            SessionContext::in_memory(),
            ActivityLog::disabled(),
        );
        (ctx, transport)
    }

    fn parse(line: &str) -> Commands {
        ShellLine::try_parse_from(shell_words::split(line).unwrap())
            .unwrap()
            .command
    }

    #[test]
    fn test_shell_line_parsing() {
        match parse("courses create --title 'Piano basics' --course-no P1 --teacher-id 2 --total-sessions 10") {
            Commands::Courses(CourseCommand::Create {
                title,
                teacher_id,
                ..
            }) => {
                assert_eq!(title, "Piano basics");
                assert_eq!(teacher_id, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse("sessions update 4 --status canceled") {
            Commands::Sessions(SessionCommand::Update { status, .. }) => {
                assert_eq!(status, Some(LessonStatus::Cancelled));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ShellLine::try_parse_from(["login", "--role", "student", "--email", "a@b.c", "--password", "x"]).is_err());
    }

    #[test]
    fn test_open_protected_page_anonymous_fails() {
        let (ctx, _) = context();
        let err = run_once(
            &ctx,
            &Commands::Open {
                route: "/admin/courses".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("redirected to /admin/login"));
        assert_eq!(ctx.router.current(), Route::AdminLogin);
    }

    #[test]
    fn test_open_unknown_page() {
        let (ctx, _) = context();
        let err = execute(
            &ctx,
            &Commands::Open {
                route: "/admin/payments".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown page"));
    }

    #[test]
    fn test_login_then_whoami() {
        let (ctx, transport) = context();
        transport.reply(
            Method::Post,
            "/auth/login",
            200,
            json!({"accessToken": token_expiring_in(Role::Admin, 4, 3600)}),
        );

        execute(
            &ctx,
            &Commands::Login {
                role: Role::Admin,
                email: "head@school.com".to_string(),
                password: "secret".to_string(),
            },
        )
        .unwrap();
        assert_eq!(ctx.router.current(), Route::Admin(AdminPage::Dashboard));
        assert!(execute(&ctx, &Commands::Whoami).is_ok());

        execute(&ctx, &Commands::Logout).unwrap();
        assert!(execute(&ctx, &Commands::Whoami).is_err());
        assert_eq!(ctx.router.current(), Route::Root);
    }

    #[test]
    fn test_login_wrong_role_fails() {
        let (ctx, transport) = context();
        transport.reply(
            Method::Post,
            "/auth/login",
            200,
            json!({"accessToken": token_expiring_in(Role::Teacher, 4, 3600)}),
        );
        let result = execute(
            &ctx,
            &Commands::Login {
                role: Role::Admin,
                email: "t@school.com".to_string(),
                password: "secret".to_string(),
            },
        );
        assert!(result.is_err());
        assert!(!ctx.session.is_authenticated());
    }

    #[test]
    fn test_empty_course_update_rejected() {
        let (ctx, transport) = context();
        let cmd = parse("courses update 3");
        assert!(execute(&ctx, &cmd).is_err());
        assert!(transport.requests.borrow().is_empty());
    }

    #[test]
    fn test_shell_path_navigates_and_exit() {
        let (ctx, _) = context();
        assert!(!handle_line(&ctx, "/teacher/login"));
        assert_eq!(ctx.router.current(), Route::TeacherLogin);
        assert!(!handle_line(&ctx, "/teacher/courses"));
        // Guard sends the anonymous shell to the teacher login page
        assert_eq!(ctx.router.current(), Route::TeacherLogin);
        assert!(handle_line(&ctx, "exit"));
    }
}
