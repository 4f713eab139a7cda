//! Conversation export
//!
//! Renders a stored conversation as JSON, plain text, or Markdown for
//! download from the web API or the history CLI.

use crate::error::{Result, TalariaError};
use crate::storage::{ConversationRecord, Role};

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full record as pretty-printed JSON
    Json,
    /// Readable plain text transcript
    Txt,
    /// Markdown transcript
    Markdown,
}

impl ExportFormat {
    /// Parses a format name (`json`, `txt`, `md`/`markdown`)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(TalariaError::Config(format!("Unknown export format: {}", other)).into()),
        }
    }

    /// File extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
            ExportFormat::Markdown => "md",
        }
    }

    /// MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Txt => "text/plain",
            ExportFormat::Markdown => "text/markdown",
        }
    }
}

/// Renders a conversation in the requested format
pub fn render(record: &ConversationRecord, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(record).map_err(|e| TalariaError::Serialization(e).into())
        }
        ExportFormat::Txt => Ok(render_txt(record)),
        ExportFormat::Markdown => Ok(render_markdown(record)),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

fn render_txt(record: &ConversationRecord) -> String {
    let summary = &record.summary;
    let mut text = format!("Conversation: {}\n", summary.title);
    text.push_str(&format!("Created: {}\n", summary.created_at.to_rfc3339()));
    text.push_str(&format!("Model: {}\n", summary.model));
    text.push_str(&format!(
        "Context Window: {} tokens\n",
        summary.context_window
    ));
    text.push_str(&format!("Total Messages: {}\n", record.messages.len()));
    text.push_str(&format!("Total Tokens: {}\n", summary.token_count));
    text.push_str(&"=".repeat(50));
    text.push_str("\n\n");

    for msg in &record.messages {
        let timestamp = msg.timestamp.format("%Y-%m-%d %H:%M:%S");
        text.push_str(&format!("[{}] {}:\n", timestamp, role_label(msg.role)));
        text.push_str(&msg.content);
        text.push('\n');
        text.push_str(&"-".repeat(30));
        text.push('\n');
    }

    text
}

fn render_markdown(record: &ConversationRecord) -> String {
    let summary = &record.summary;
    let mut md = format!("# {}\n\n", summary.title);
    md.push_str(&format!("**Created:** {}\n", summary.created_at.to_rfc3339()));
    md.push_str(&format!("**Model:** {}\n", summary.model));
    md.push_str(&format!(
        "**Context Window:** {} tokens\n",
        summary.context_window
    ));
    md.push_str(&format!("**Total Messages:** {}\n", record.messages.len()));
    md.push_str(&format!("**Total Tokens:** {}\n\n", summary.token_count));
    md.push_str("---\n\n");

    for msg in &record.messages {
        let timestamp = msg.timestamp.format("%Y-%m-%d %H:%M:%S");
        md.push_str(&format!("### **{}** ({})\n\n", role_label(msg.role), timestamp));
        md.push_str(&msg.content);
        md.push_str("\n\n---\n\n");
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConversationSummary, Message};
    use chrono::Utc;

    fn sample_record() -> ConversationRecord {
        ConversationRecord {
            summary: ConversationSummary {
                id: "20240101_120000_000".to_string(),
                title: "Sample".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                model: "deepseek-chat".to_string(),
                context_window: 128_000,
                message_count: 2,
                token_count: 7,
            },
            messages: vec![
                Message::new(Role::User, "What is ownership?", 4),
                Message::new(Role::Assistant, "A move semantics model.", 3),
            ],
        }
    }

    #[test]
    fn test_parse_format_names() {
        assert_eq!(ExportFormat::parse("json").unwrap(), ExportFormat::Json);
        assert_eq!(ExportFormat::parse("TXT").unwrap(), ExportFormat::Txt);
        assert_eq!(ExportFormat::parse("md").unwrap(), ExportFormat::Markdown);
        assert_eq!(
            ExportFormat::parse("markdown").unwrap(),
            ExportFormat::Markdown
        );
        assert!(ExportFormat::parse("pdf").is_err());
    }

    #[test]
    fn test_json_export_round_trips() {
        let record = sample_record();
        let json = render(&record, ExportFormat::Json).unwrap();
        let back: ConversationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.id, record.summary.id);
        assert_eq!(back.messages.len(), 2);
    }

    #[test]
    fn test_txt_export_contains_metadata_and_messages() {
        let text = render(&sample_record(), ExportFormat::Txt).unwrap();
        assert!(text.contains("Conversation: Sample"));
        assert!(text.contains("Model: deepseek-chat"));
        assert!(text.contains("User:"));
        assert!(text.contains("What is ownership?"));
        assert!(text.contains("Assistant:"));
    }

    #[test]
    fn test_markdown_export_has_heading_and_sections() {
        let md = render(&sample_record(), ExportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Sample"));
        assert!(md.contains("**Model:** deepseek-chat"));
        assert!(md.contains("### **User**"));
        assert!(md.contains("### **Assistant**"));
    }

    #[test]
    fn test_extension_and_mime() {
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::Markdown.mime_type(), "text/markdown");
        assert_eq!(ExportFormat::Txt.mime_type(), "text/plain");
    }
}
