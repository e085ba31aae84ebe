//! Backend payloads and the shapes pages work with.
//!
//! Backend records keep the API's field names (`course_no`, `Teacher`,
//! `Sessions`, ...). Pages use the mapped types, which carry string ids and
//! parsed timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Active,
    Completed,
    Cancelled,
}

impl CourseStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Planned,
    Completed,
    Cancelled,
}

impl LessonStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "planned" => Some(Self::Planned),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeacherRecord {
    pub id: u64,
    #[serde(rename = "userId", default)]
    pub user_id: Option<u64>,
    #[serde(rename = "User", default)]
    pub user: Option<UserRecord>,
}

impl TeacherRecord {
    pub fn name(&self) -> &str {
        self.user.as_ref().map(|u| u.name.as_str()).unwrap_or("")
    }

    pub fn email(&self) -> &str {
        self.user.as_ref().map(|u| u.email.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub id: u64,
    pub session_number: u32,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: LessonStatus,
    pub course_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseRecord {
    pub id: u64,
    pub title: String,
    pub course_no: String,
    pub teacher_id: u64,
    pub total_sessions: u32,
    pub status: CourseStatus,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "Teacher", default)]
    pub teacher: Option<TeacherRecord>,
    #[serde(rename = "Sessions", default)]
    pub sessions: Vec<SessionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "isNew", default)]
    pub is_new: bool,
}

/// Course as shown on list pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub course_no: String,
    pub teacher_id: String,
    /// User id behind the teacher, used to match the signed-in teacher
    pub teacher_user_id: Option<String>,
    pub total_lessons: u32,
    pub status: CourseStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub teacher_name: Option<String>,
    pub teacher_email: Option<String>,
}

impl From<&CourseRecord> for Course {
    fn from(record: &CourseRecord) -> Self {
        let teacher = record.teacher.as_ref();
        let user = teacher.and_then(|t| t.user.as_ref());
        Course {
            id: record.id.to_string(),
            title: record.title.clone(),
            course_no: record.course_no.clone(),
            teacher_id: record.teacher_id.to_string(),
            teacher_user_id: teacher
                .and_then(|t| t.user_id.or_else(|| t.user.as_ref().map(|u| u.id)))
                .map(|id| id.to_string()),
            total_lessons: record.total_sessions,
            status: record.status,
            created_at: record.created_at.as_deref().and_then(parse_timestamp),
            teacher_name: user.map(|u| u.name.clone()),
            teacher_email: user.map(|u| u.email.clone()),
        }
    }
}

/// A lesson session of a course.
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: String,
    pub course_id: String,
    pub lesson_number: u32,
    pub date: Option<String>,
    pub topic: String,
    pub notes: String,
    pub status: LessonStatus,
    pub is_completed: bool,
}

impl From<&SessionRecord> for Lesson {
    fn from(record: &SessionRecord) -> Self {
        Lesson {
            id: record.id.to_string(),
            course_id: record.course_id.to_string(),
            lesson_number: record.session_number,
            date: record.date.clone(),
            topic: record.topic.clone().unwrap_or_default(),
            notes: record.notes.clone().unwrap_or_default(),
            status: record.status,
            is_completed: record.status == LessonStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseWithLessons {
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `{ "message": ... }` acknowledgement returned by most mutations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}
