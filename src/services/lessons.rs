//! Lesson sessions of a course (`/sessions` on the backend).

use super::models::{Lesson, LessonStatus, SessionRecord};
use super::{failed, ServiceError};
use crate::http::ApiClient;
use serde::Serialize;
use serde_json::json;
use std::rc::Rc;

#[derive(Debug, Clone, Serialize)]
pub struct NewLesson {
    pub course_id: u64,
    pub session_number: u32,
    pub date: String,
    pub topic: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LessonUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LessonStatus>,
}

pub struct LessonService {
    api: Rc<ApiClient>,
}

impl LessonService {
    pub fn new(api: Rc<ApiClient>) -> Self {
        Self { api }
    }

    fn set_status(&self, id: &str, status: LessonStatus, fallback: &'static str) -> Result<(), ServiceError> {
        let _: serde_json::Value = self
            .api
            .patch(&format!("/sessions/{}", id), &json!({ "status": status }))
            .map_err(failed(fallback))?;
        Ok(())
    }

    pub fn complete(&self, id: &str) -> Result<(), ServiceError> {
        self.set_status(id, LessonStatus::Completed, "Could not complete session")
    }

    pub fn cancel(&self, id: &str) -> Result<(), ServiceError> {
        self.set_status(id, LessonStatus::Cancelled, "Could not cancel session")
    }

    pub fn create(&self, lesson: &NewLesson) -> Result<Lesson, ServiceError> {
        let record: SessionRecord = self
            .api
            .post("/sessions", lesson)
            .map_err(failed("Could not create session"))?;
        Ok(Lesson::from(&record))
    }

    pub fn update(&self, id: &str, update: &LessonUpdate) -> Result<Lesson, ServiceError> {
        let record: SessionRecord = self
            .api
            .patch(&format!("/sessions/{}", id), update)
            .map_err(failed("Could not update session"))?;
        Ok(Lesson::from(&record))
    }
}
