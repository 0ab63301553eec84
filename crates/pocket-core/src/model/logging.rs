//! Model request/response logging
//!
//! Set the `POCKET_LLM_LOG` environment variable to append one JSON line per
//! model call to that file.
//!
//! Example: `POCKET_LLM_LOG=/tmp/pocket-llm.log pocket`

use serde_json::json;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::history::HistoryEntry;

/// Environment variable naming the log file
pub const LOG_FILE_ENV: &str = "POCKET_LLM_LOG";

/// What to include in the log entry
#[derive(Default)]
pub struct LogConfig<'a> {
    pub model: &'a str,
    pub provider: Option<&'a str>,
    pub system_instruction: Option<&'a str>,
    pub history: &'a [HistoryEntry],
    pub response: Option<&'a str>,
    pub error: Option<&'a str>,
}

/// Log a model interaction if `POCKET_LLM_LOG` is set
pub fn log_model_interaction(config: LogConfig<'_>) {
    if let Ok(path) = std::env::var(LOG_FILE_ENV) {
        append_entry(Path::new(&path), &config);
    }
}

fn append_entry(path: &Path, config: &LogConfig<'_>) {
    let entry = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "model": config.model,
        "provider": config.provider,
        "request": {
            "system_instruction": config.system_instruction,
            "history": config.history,
            "entry_count": config.history.len(),
        },
        "response": config.response,
        "error": config.error,
    });

    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", entry) {
                warn!("Failed to write to model log file: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to open model log file {}: {}", path.display(), e);
        }
    }

    debug!("Logged model interaction to {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[test]
    fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm.log");
        let history = vec![HistoryEntry {
            role: Role::User,
            content: r#"{"type":"user","user":"hi"}"#.to_string(),
        }];

        for reply in ["first", "second"] {
            append_entry(
                &path,
                &LogConfig {
                    model: "test-model",
                    history: &history,
                    response: Some(reply),
                    ..Default::default()
                },
            );
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["model"], "test-model");
        assert_eq!(lines[0]["request"]["history"][0]["role"], "user");
        assert_eq!(lines[1]["response"], "second");
    }
}
