//! Domain services: one per backend resource, each a thin layer over
//! [`ApiClient`](crate::http::ApiClient) that maps payloads and errors.

pub mod courses;
pub mod lessons;
pub mod models;
pub mod students;
pub mod teachers;

pub use courses::CourseService;
pub use lessons::LessonService;
pub use students::StudentService;
pub use teachers::TeacherService;

use crate::http::ApiError;

/// A failed service call, worded for display.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
    pub status: Option<u16>,
}

impl ServiceError {
    /// Wrap `err`, preferring the backend's own message over `fallback`.
    pub fn from_api(err: ApiError, fallback: &str) -> Self {
        log::warn!("{}: {}", fallback, err);
        let message = match &err {
            ApiError::SessionExpired => err.to_string(),
            _ => err.backend_message().unwrap_or(fallback).to_string(),
        };
        Self {
            message,
            status: err.status(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// `map_err` adapter: `.map_err(failed("Could not load courses"))`
pub(crate) fn failed(fallback: &'static str) -> impl Fn(ApiError) -> ServiceError {
    move |err| ServiceError::from_api(err, fallback)
}
