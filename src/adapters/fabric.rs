//! Fabric generator using subprocess mode.
//!
//! Spawns the `fabric` CLI, writes the prompt to stdin and collects stdout.
//! Fabric has no separate system prompt channel, so the system prompt is
//! sent ahead of the user prompt.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::Generator;

/// Fabric generator using subprocess mode
pub struct FabricGenerator {
    /// Path to the fabric binary (default: "fabric")
    binary_path: String,

    /// Optional pattern passed with `-p`
    pattern: Option<String>,

    /// Per-call timeout
    timeout: Duration,
}

impl Default for FabricGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FabricGenerator {
    /// Create a Fabric generator with the default binary
    ///
    /// Looks for fabric-ai first (Homebrew install), falls back to fabric
    pub fn new() -> Self {
        let binary_path = if std::process::Command::new("fabric-ai")
            .arg("--help")
            .output()
            .is_ok()
        {
            "fabric-ai".to_string()
        } else {
            "fabric".to_string()
        };

        Self {
            binary_path,
            pattern: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create a Fabric generator with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            pattern: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn compose_input(system_prompt: &str, user_prompt: &str) -> String {
        if system_prompt.trim().is_empty() {
            user_prompt.to_string()
        } else {
            format!("{}\n\n{}", system_prompt.trim(), user_prompt)
        }
    }
}

#[async_trait]
impl Generator for FabricGenerator {
    fn name(&self) -> &str {
        "fabric"
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut command = Command::new(&self.binary_path);
        if let Some(pattern) = &self.pattern {
            command.args(["-p", pattern]);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to spawn '{}'; is Fabric installed and on PATH?",
                    self.binary_path
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(Self::compose_input(system_prompt, user_prompt).as_bytes())
                .await
                .context("Failed to write to fabric stdin")?;
            // Drop stdin to signal EOF
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("Fabric timed out after {:?}", self.timeout))?
            .context("Failed to wait for fabric process")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!("Fabric failed with exit code {}: {}", exit_code, stderr.trim());
        }

        let stdout = String::from_utf8(output.stdout).context("Fabric output is not valid UTF-8")?;
        if stdout.trim().is_empty() {
            anyhow::bail!("Fabric returned no output");
        }

        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_binary_path() {
        let generator = FabricGenerator::with_binary_path("/custom/path/fabric").with_pattern("summarize");
        assert_eq!(generator.binary_path, "/custom/path/fabric");
        assert_eq!(generator.pattern.as_deref(), Some("summarize"));
        assert_eq!(generator.name(), "fabric");
    }

    #[test]
    fn test_compose_input() {
        assert_eq!(FabricGenerator::compose_input("", "hi"), "hi");
        assert_eq!(FabricGenerator::compose_input(" Be brief. ", "hi"), "Be brief.\n\nhi");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let generator = FabricGenerator::with_binary_path("/nonexistent/fabric-binary");
        let err = generator.generate("", "hello").await.unwrap_err();
        assert!(err.to_string().contains("is Fabric installed"));
    }
}
