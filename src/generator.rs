//! Pattern text generator
//!
//! Turns a free-text request ("slow dubby hats with delay") into one fragment
//! by running a user-configured command (typically an LLM CLI) with the prompt
//! as its last argument. Whatever the command prints is cleaned of markdown
//! fences before it is handed back.

use crate::config::GeneratorConfig;
use crate::error::{SessionError, SessionResult};
use tokio::process::Command;
use tracing::{debug, info};

/// Extract the fragment from generator output
///
/// Takes the first fenced code block if there is one, otherwise the whole
/// text; surrounding single backticks are removed. `None` when nothing is left.
pub fn clean_generated_fragment(output: &str) -> Option<String> {
    let text = output.trim();

    let body = match text.find("```") {
        Some(start) => {
            let after = &text[start + 3..];
            // Skip a language tag on the opening fence line
            let content = match after.find('\n') {
                Some(newline) => &after[newline + 1..],
                None => after,
            };
            match content.find("```") {
                Some(end) => &content[..end],
                None => content,
            }
        }
        None => text,
    };

    let cleaned = body.trim().trim_matches('`').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Runs the configured generator command
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    command: String,
    args: Vec<String>,
}

impl PatternGenerator {
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            args,
        }
    }

    /// Build from config; fails when no command is configured
    pub fn from_config(config: &GeneratorConfig) -> SessionResult<Self> {
        let command = config.command.as_deref().ok_or_else(|| {
            SessionError::Generator("no generator command configured ([generator] command)".to_string())
        })?;
        Ok(Self::new(command, config.args.clone()))
    }

    /// Generate one fragment for `prompt`
    pub async fn generate(&self, prompt: &str) -> SessionResult<String> {
        if prompt.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "generator prompt must not be empty".to_string(),
            ));
        }

        debug!("Running generator {} {:?}", self.command, self.args);
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(prompt)
            .output()
            .await
            .map_err(|e| SessionError::Generator(format!("cannot run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Generator(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let fragment = clean_generated_fragment(&stdout).ok_or_else(|| {
            SessionError::Generator(format!("{} produced no pattern", self.command))
        })?;
        info!("Generated {} byte fragment", fragment.len());
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_fenced_block() {
        let output = "Here you go:\n```javascript\ns(\"bd*4\").gain(0.8)\n```\nEnjoy!";
        assert_eq!(
            clean_generated_fragment(output).as_deref(),
            Some("s(\"bd*4\").gain(0.8)")
        );
    }

    #[test]
    fn test_clean_inline_backticks() {
        assert_eq!(
            clean_generated_fragment("  `s(\"hh*8\")`\n").as_deref(),
            Some("s(\"hh*8\")")
        );
        assert_eq!(
            clean_generated_fragment("note(\"c e g\")").as_deref(),
            Some("note(\"c e g\")")
        );
    }

    #[test]
    fn test_clean_empty_output() {
        assert_eq!(clean_generated_fragment("```\n```"), None);
        assert_eq!(clean_generated_fragment("   "), None);
    }

    #[test]
    fn test_missing_command_in_config() {
        assert!(PatternGenerator::from_config(&GeneratorConfig::default()).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_with_echo() {
        let generator = PatternGenerator::new("echo", vec![]);
        let fragment = generator.generate("s(\"cp ~ cp ~\")").await.unwrap();
        assert_eq!(fragment, "s(\"cp ~ cp ~\")");

        assert!(generator.generate("  ").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_failing_command() {
        let generator = PatternGenerator::new("false", vec![]);
        assert!(matches!(
            generator.generate("anything").await,
            Err(SessionError::Generator(_))
        ));
    }
}
