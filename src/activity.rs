use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

struct Sink {
    path: PathBuf,
    file: File,
}

/// Append-only JSONL log of session events. Cloning shares the same file.
#[derive(Clone)]
pub struct ActivityLog {
    run_id: String,
    sink: Option<Rc<RefCell<Sink>>>,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    pub fn open(path: &Path, run_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            run_id: run_id.to_string(),
            sink: Some(Rc::new(RefCell::new(Sink {
                path: path.to_path_buf(),
                file,
            }))),
        })
    }

    pub fn disabled() -> Self {
        Self {
            run_id: String::new(),
            sink: None,
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.sink.as_ref().map(|s| s.borrow().path.clone())
    }

    fn write(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        let mut sink = sink.borrow_mut();
        writeln!(sink.file, "{}", line)?;
        sink.file.flush()?;
        Ok(())
    }

    /// Activity logging never interrupts the caller.
    pub fn log(&self, event_type: &str, data: serde_json::Value) {
        if let Err(e) = self.write(event_type, data) {
            log::warn!("activity log write failed: {:#}", e);
        }
    }

    pub fn login(&self, email: &str, role: &str, ok: bool) {
        self.log(
            "login",
            serde_json::json!({ "email": email, "role": role, "ok": ok }),
        )
    }

    pub fn logout(&self) {
        self.log("logout", serde_json::json!({}))
    }

    pub fn refresh(&self, ok: bool) {
        self.log("refresh", serde_json::json!({ "ok": ok }))
    }

    /// Session dropped after a failed refresh
    pub fn session_cleared(&self, reason: &str) {
        self.log("session_cleared", serde_json::json!({ "reason": reason }))
    }

    pub fn redirect(&self, from: &str, to: &str) {
        self.log("redirect", serde_json::json!({ "from": from, "to": to }))
    }
}
