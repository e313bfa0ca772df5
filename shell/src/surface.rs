use async_trait::async_trait;
use chrono::{Local, TimeZone};
use records::{AnswerRecord, Notice, ViewUpdate};
use traits::ViewSurface;

/// Prints view updates to stdout, prefixed with the surface's name.
pub struct TerminalSurface {
    label: &'static str,
}

impl TerminalSurface {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

#[async_trait]
impl ViewSurface for TerminalSurface {
    async fn render(&self, update: ViewUpdate) {
        println!("{}", describe(self.label, &update));
    }
}

pub fn describe(label: &str, update: &ViewUpdate) -> String {
    match update {
        ViewUpdate::Placeholder => format!("[{label}] (no result)"),
        ViewUpdate::Record(record) => format!("[{label}]\n{}", format_record(record)),
        ViewUpdate::Notice(Notice::Loading) => format!("[{label}] loading..."),
        ViewUpdate::Notice(Notice::Extracting) => format!("[{label}] extracting text..."),
        ViewUpdate::Notice(Notice::Requesting) => format!("[{label}] waiting for the answer service..."),
        ViewUpdate::Notice(Notice::Cancelled) => format!("[{label}] request cancelled"),
        ViewUpdate::Notice(Notice::Failed(message)) => format!("[{label}] error: {message}"),
    }
}

fn format_record(record: &AnswerRecord) -> String {
    let when = Local
        .timestamp_millis_opt(record.timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    format!("Q: {}\nA: {}\n({when})", record.question, record.answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_notices() {
        assert_eq!(describe("panel", &ViewUpdate::Placeholder), "[panel] (no result)");
        assert_eq!(
            describe("window", &ViewUpdate::Notice(Notice::Failed("boom".into()))),
            "[window] error: boom"
        );
    }

    #[test]
    fn test_describe_record() {
        let text = describe(
            "panel",
            &ViewUpdate::Record(AnswerRecord {
                question: "What is this?".into(),
                answer: "A Latin placeholder.".into(),
                timestamp: 0,
            }),
        );
        assert!(text.starts_with("[panel]\nQ: What is this?\nA: A Latin placeholder.\n("));
    }
}
