//! System prompt loading
//!
//! The system prompt frames every upstream request. It is read from a
//! configurable file so operators can swap personas without rebuilding;
//! when the file is missing or empty, a built-in default is used.

use std::path::Path;

/// Fallback used when no prompt file is present
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with a large context window. \
You can handle long conversations and large projects. \
Provide detailed, comprehensive responses.";

/// Loads the system prompt from the given file
///
/// Returns the trimmed file contents, or the built-in default when the
/// file is absent, unreadable, or blank.
///
/// # Examples
///
/// ```
/// use talaria::prompts::load_system_prompt;
///
/// let prompt = load_system_prompt("/nonexistent/prompt.txt");
/// assert!(!prompt.is_empty());
/// ```
pub fn load_system_prompt(path: impl AsRef<Path>) -> String {
    match std::fs::read_to_string(path.as_ref()) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                tracing::debug!(
                    "Prompt file {} is empty, using built-in default",
                    path.as_ref().display()
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}
