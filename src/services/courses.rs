use super::models::{Ack, Course, CourseRecord, CourseStatus, CourseWithLessons, Lesson};
use super::{failed, ServiceError};
use crate::http::ApiClient;
use serde::Serialize;
use serde_json::json;
use std::rc::Rc;

#[derive(Debug, Clone, Serialize)]
pub struct NewCourse {
    pub title: String,
    pub course_no: String,
    pub teacher_id: u64,
    pub total_sessions: u32,
}

/// Partial course update; unset fields are left out of the request
#[derive(Debug, Clone, Default, Serialize)]
pub struct CourseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sessions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CourseStatus>,
}

impl CourseUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.course_no.is_none()
            && self.teacher_id.is_none()
            && self.total_sessions.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourseStats {
    pub total_lessons: u32,
    pub completed_lessons: usize,
}

pub struct CourseService {
    api: Rc<ApiClient>,
}

impl CourseService {
    pub fn new(api: Rc<ApiClient>) -> Self {
        Self { api }
    }

    /// All courses with their teacher
    pub fn list(&self) -> Result<Vec<Course>, ServiceError> {
        let records: Vec<CourseRecord> = self
            .api
            .get("/courses")
            .map_err(failed("Could not load courses"))?;
        Ok(records.iter().map(Course::from).collect())
    }

    pub fn get(&self, id: &str) -> Result<CourseWithLessons, ServiceError> {
        let record: CourseRecord = self
            .api
            .get(&format!("/courses/{}", id))
            .map_err(failed("Could not load course"))?;
        Ok(CourseWithLessons {
            course: Course::from(&record),
            lessons: record.sessions.iter().map(Lesson::from).collect(),
        })
    }

    pub fn create(&self, course: &NewCourse) -> Result<Ack, ServiceError> {
        let ack: Option<Ack> = self
            .api
            .post("/admin/courses", course)
            .map_err(failed("Could not create course"))?;
        Ok(ack.unwrap_or_default())
    }

    pub fn update(&self, id: &str, update: &CourseUpdate) -> Result<Ack, ServiceError> {
        let ack: Option<Ack> = self
            .api
            .patch(&format!("/admin/courses/{}", id), update)
            .map_err(failed("Could not update course"))?;
        Ok(ack.unwrap_or_default())
    }

    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.api
            .delete(&format!("/admin/courses/{}", id))
            .map_err(failed("Could not delete course"))
    }

    pub fn enroll(&self, course_id: &str, student_id: u64) -> Result<Ack, ServiceError> {
        let ack: Option<Ack> = self
            .api
            .post(
                &format!("/courses/{}/enroll", course_id),
                &json!({ "studentId": student_id }),
            )
            .map_err(failed("Could not enroll student"))?;
        Ok(ack.unwrap_or_default())
    }

    /// Courses whose `teacher_id` is `teacher_id`
    pub fn by_teacher(&self, teacher_id: &str) -> Result<Vec<Course>, ServiceError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.teacher_id == teacher_id)
            .collect())
    }

    /// Courses taught by the teacher account with this user id
    pub fn for_teacher_user(&self, user_id: &str) -> Result<Vec<Course>, ServiceError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.teacher_user_id.as_deref() == Some(user_id))
            .collect())
    }

    pub fn by_status(&self, status: CourseStatus) -> Result<Vec<Course>, ServiceError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.status == status)
            .collect())
    }

    pub fn lessons(&self, course_id: &str) -> Result<Vec<Lesson>, ServiceError> {
        Ok(self.get(course_id)?.lessons)
    }

    pub fn stats(&self, course_id: &str) -> Result<CourseStats, ServiceError> {
        let course = self.get(course_id)?;
        Ok(CourseStats {
            total_lessons: course.course.total_lessons,
            completed_lessons: course.lessons.iter().filter(|l| l.is_completed).count(),
        })
    }
}
