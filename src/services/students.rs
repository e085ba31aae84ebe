use super::models::{Course, CourseRecord, CourseStatus, StudentRecord};
use super::{failed, ServiceError};
use crate::http::ApiClient;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, Serialize)]
pub struct NewStudent {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub is_new: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedStudent {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub student: Option<StudentRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StudentStats {
    pub total_courses: usize,
    pub active_courses: usize,
    pub completed_courses: usize,
}

pub struct StudentService {
    api: Rc<ApiClient>,
}

impl StudentService {
    pub fn new(api: Rc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn list(&self) -> Result<Vec<StudentRecord>, ServiceError> {
        self.api
            .get("/students")
            .map_err(failed("Could not load students"))
    }

    pub fn get(&self, id: &str) -> Result<StudentRecord, ServiceError> {
        self.api
            .get(&format!("/students/{}", id))
            .map_err(failed("Could not load student"))
    }

    /// Courses the student is enrolled in. The endpoint carries no teacher
    /// details, so those fields stay empty.
    pub fn courses(&self, student_id: &str) -> Result<Vec<Course>, ServiceError> {
        let records: Vec<CourseRecord> = self
            .api
            .get(&format!("/students/{}/courses", student_id))
            .map_err(failed("Could not load the student's courses"))?;
        Ok(records.iter().map(Course::from).collect())
    }

    pub fn create(&self, student: &NewStudent) -> Result<CreatedStudent, ServiceError> {
        self.api
            .post("/students", student)
            .map_err(failed("Could not create student"))
    }

    pub fn update(&self, id: &str, update: &StudentUpdate) -> Result<StudentRecord, ServiceError> {
        self.api
            .patch(&format!("/students/{}", id), update)
            .map_err(failed("Could not update student"))
    }

    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.api
            .delete(&format!("/students/{}", id))
            .map_err(failed("Could not delete student"))
    }

    pub fn stats(&self, student_id: &str) -> Result<StudentStats, ServiceError> {
        let courses = self.courses(student_id)?;
        let count = |status: CourseStatus| courses.iter().filter(|c| c.status == status).count();
        Ok(StudentStats {
            total_courses: courses.len(),
            active_courses: count(CourseStatus::Active),
            completed_courses: count(CourseStatus::Completed),
        })
    }
}
