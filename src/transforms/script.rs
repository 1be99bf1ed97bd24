//! Script transpilation through an external tool
//!
//! The tool reads the script on stdin and writes the result to stdout
//! (`esbuild` does this when given no entry point). `{file}` in any argument
//! is replaced with the source path.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use super::types::{Asset, Transform, TransformError};

/// Placeholder replaced with the source file path in tool arguments
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Transform step piping the asset through an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTool {
    program: String,
    args: Vec<String>,
}

impl ScriptTool {
    /// Build the step from a command line; `None` when the command is empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self { program: program.clone(), args: args.to_vec() })
    }

    /// Append extra arguments (minify or source-map flags).
    pub fn with_args(mut self, extra: &[String]) -> Self {
        self.args.extend(extra.iter().cloned());
        self
    }

    /// The program that will be spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for a given source file.
    pub fn args_for(&self, source: &Path) -> Vec<String> {
        let file = source.display().to_string();
        self.args.iter().map(|a| a.replace(FILE_PLACEHOLDER, &file)).collect()
    }

    fn tool_error(&self, message: impl std::fmt::Display) -> TransformError {
        TransformError::Tool { tool: self.program.clone(), message: message.to_string() }
    }
}

impl Transform for ScriptTool {
    fn name(&self) -> &str {
        "script-tool"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let mut child = Command::new(&self.program)
            .args(self.args_for(&asset.source))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.tool_error(format!("failed to start: {}", e)))?;

        // Feed stdin from a separate thread so a tool that streams output
        // before reading all input cannot deadlock against us.
        let mut stdin = child.stdin.take().ok_or_else(|| self.tool_error("stdin unavailable"))?;
        let input = std::mem::take(&mut asset.contents);
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output =
            child.wait_with_output().map_err(|e| self.tool_error(format!("failed to run: {}", e)))?;
        let written = writer.join();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.tool_error(format!("{} {}", output.status, stderr.trim())));
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.tool_error(format!("failed to write input: {}", e))),
            Err(_) => return Err(self.tool_error("input writer panicked")),
        }

        asset.contents = output.stdout;
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_command_yields_no_step() {
        assert!(ScriptTool::from_command(&[]).is_none());
    }

    #[test]
    fn test_file_placeholder_substituted() {
        let tool = ScriptTool::from_command(&cmd(&["esbuild", "--sourcefile={file}"]))
            .unwrap()
            .with_args(&cmd(&["--sourcemap=inline"]));
        assert_eq!(tool.program(), "esbuild");
        assert_eq!(
            tool.args_for(Path::new("/p/src/scripts/main.js")),
            vec!["--sourcefile=/p/src/scripts/main.js", "--sourcemap=inline"]
        );
    }

    #[test]
    fn test_missing_program_is_a_tool_error() {
        let tool =
            ScriptTool::from_command(&cmd(&["sitepack-definitely-not-installed"])).unwrap();
        let asset = Asset::new("/src/a.js", "a.js", b"let a;".to_vec());
        let err = tool.apply(asset).unwrap_err();
        assert!(matches!(err, TransformError::Tool { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipes_content_through_tool() {
        let tool = ScriptTool::from_command(&cmd(&["cat"])).unwrap();
        let asset = Asset::new("/src/a.js", "a.js", b"const x = 1;".to_vec());
        let out = tool.apply(asset).unwrap();
        assert_eq!(out.contents, b"const x = 1;");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let tool = ScriptTool::from_command(&cmd(&["sh", "-c", "echo bad syntax >&2; exit 3"])).unwrap();
        let asset = Asset::new("/src/a.js", "a.js", b"x".to_vec());
        let err = tool.apply(asset).unwrap_err().to_string();
        assert!(err.contains("bad syntax"));
    }
}
