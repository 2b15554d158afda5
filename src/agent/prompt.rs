//! Prompt assembly for the agent loop.
//!
//! Builds the system prompt (base instructions plus optional auxiliary
//! context) and performs the one-shot expansion of `@path` file and
//! directory references in the user's message into literal content.

use std::path::Path;

use tracing::debug;

/// Default system prompt for the ClawCore agent.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an interactive CLI coding agent.

You have access to tools to inspect and modify the workspace. Use them when needed.

Be concise but thorough. Focus on completing the user's request."#;

/// Builder for the system prompt of a loop run.
///
/// # Example
///
/// ```
/// use clawcore::agent::PromptBuilder;
///
/// let builder = PromptBuilder::new()
///     .with_aux_context("Repository: clawcore, branch: main");
/// let system = builder.system_text();
/// assert!(system.contains("coding agent"));
/// assert!(system.contains("Repository: clawcore"));
/// ```
pub struct PromptBuilder {
    /// The base system prompt
    system_prompt: String,
    /// Optional auxiliary context appended to the system prompt
    aux_context: Option<String>,
}

impl PromptBuilder {
    /// Create a builder with the default system prompt.
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            aux_context: None,
        }
    }

    /// Replace the base system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Append auxiliary context (project facts, environment notes).
    pub fn with_aux_context(mut self, context: &str) -> Self {
        self.aux_context = Some(context.to_string());
        self
    }

    /// Render the full system prompt.
    pub fn system_text(&self) -> String {
        match &self.aux_context {
            Some(aux) => format!("{}\n\n## Context\n\n{}", self.system_prompt, aux),
            None => self.system_prompt.clone(),
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Characters that may appear in an `@path` reference.
fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '~' | '-')
}

/// Expand `@path` references in user text into literal content.
///
/// A reference is `@` followed by a path. Files expand to their content in
/// a fenced block; directories expand to a sorted entry listing. Unreadable
/// paths are left untouched so the model sees what the user typed. The
/// substitution is deterministic and the loop runs it exactly once per
/// invocation, on the latest user message.
///
/// # Example
/// ```
/// use clawcore::agent::expand_file_references;
///
/// // No references: text passes through unchanged.
/// assert_eq!(expand_file_references("just text"), "just text");
/// ```
pub fn expand_file_references(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '@' {
            out.push(c);
            continue;
        }
        // An '@' mid-word (e.g. an email address) is not a reference.
        let preceded_by_word = i > 0
            && text[..i]
                .chars()
                .next_back()
                .is_some_and(|p| p.is_alphanumeric());
        if preceded_by_word {
            out.push(c);
            continue;
        }

        let mut raw = String::new();
        while let Some(&(_, pc)) = chars.peek() {
            if is_path_char(pc) {
                raw.push(pc);
                chars.next();
            } else {
                break;
            }
        }
        // Trailing punctuation like "@src/main.rs." should not be part of
        // the path.
        let mut path = raw.as_str();
        while path.ends_with('.') {
            path = &path[..path.len() - 1];
        }

        if path.is_empty() {
            out.push('@');
            out.push_str(&raw);
            continue;
        }

        match render_reference(path) {
            Some(rendered) => out.push_str(&rendered),
            None => {
                debug!(path = %path, "File reference not expandable, leaving as-is");
                out.push('@');
                out.push_str(path);
            }
        }
        // Re-append any punctuation trimmed off the path.
        out.push_str(&raw[path.len()..]);
    }

    out
}

/// Render one reference, or `None` when the path cannot be read.
fn render_reference(path: &str) -> Option<String> {
    let expanded_home;
    let p: &Path = if let Some(rest) = path.strip_prefix("~/") {
        expanded_home = dirs::home_dir()?.join(rest);
        &expanded_home
    } else {
        Path::new(path)
    };

    let meta = std::fs::metadata(p).ok()?;
    if meta.is_dir() {
        let mut entries: Vec<String> = std::fs::read_dir(p)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if e.path().is_dir() {
                    format!("{}/", name)
                } else {
                    name
                }
            })
            .collect();
        entries.sort();
        Some(format!(
            "Directory listing of {}:\n{}\n",
            path,
            entries.join("\n")
        ))
    } else {
        let content = std::fs::read_to_string(p).ok()?;
        Some(format!("Contents of {}:\n```\n{}\n```\n", path, content))
    }
}
