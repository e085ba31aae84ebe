use super::models::{CourseRecord, TeacherRecord};
use super::{failed, ServiceError};
use crate::http::ApiClient;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone, Serialize)]
pub struct NewTeacher {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeacherUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTeacher {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub teacher: Option<TeacherRecord>,
}

pub struct TeacherService {
    api: Rc<ApiClient>,
}

impl TeacherService {
    pub fn new(api: Rc<ApiClient>) -> Self {
        Self { api }
    }

    /// All teachers. Backends without `/admin/teachers` answer 404; the list
    /// is then assembled from the teachers attached to courses.
    pub fn list(&self) -> Result<Vec<TeacherRecord>, ServiceError> {
        match self.api.get("/admin/teachers") {
            Ok(teachers) => Ok(teachers),
            Err(e) if e.status() == Some(404) => {
                log::info!("teacher endpoint missing, deriving teachers from courses");
                self.from_courses()
            }
            Err(e) => Err(ServiceError::from_api(e, "Could not load teachers")),
        }
    }

    fn from_courses(&self) -> Result<Vec<TeacherRecord>, ServiceError> {
        let courses: Vec<CourseRecord> = self
            .api
            .get("/courses")
            .map_err(failed("Could not load the teacher list"))?;

        let mut seen = HashSet::new();
        Ok(courses
            .into_iter()
            .filter_map(|c| c.teacher)
            .filter(|t| seen.insert(t.id))
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<TeacherRecord, ServiceError> {
        match self.api.get(&format!("/admin/teachers/{}", id)) {
            Ok(teacher) => Ok(teacher),
            Err(e) if e.status() == Some(404) => self
                .list()?
                .into_iter()
                .find(|t| t.id.to_string() == id)
                .ok_or_else(|| ServiceError::from_api(e, "Could not load teacher")),
            Err(e) => Err(ServiceError::from_api(e, "Could not load teacher")),
        }
    }

    pub fn create(&self, teacher: &NewTeacher) -> Result<CreatedTeacher, ServiceError> {
        self.api
            .post("/admin/teachers", teacher)
            .map_err(failed("Could not create teacher"))
    }

    pub fn update(&self, id: &str, update: &TeacherUpdate) -> Result<TeacherRecord, ServiceError> {
        self.api
            .patch(&format!("/admin/teachers/{}", id), update)
            .map_err(failed("Could not update teacher"))
    }

    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.api
            .delete(&format!("/admin/teachers/{}", id))
            .map_err(failed("Could not delete teacher"))
    }
}
