use std::path::Path;

use async_trait::async_trait;
use eyre::WrapErr;

use super::BarcodeDecoder;

/// Runs an external reader with the image path as its last argument.
///
/// Trimmed stdout is the payload; empty output means nothing was found and a
/// non-zero exit status is a decode failure.
#[derive(Debug)]
pub(crate) struct CommandDecoder {
    program: String,
    args: Vec<String>,
}

impl CommandDecoder {
    pub(crate) fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

#[async_trait]
impl BarcodeDecoder for CommandDecoder {
    fn name(&self) -> &'static str {
        "command"
    }

    #[tracing::instrument(skip_all, fields(program = %self.program))]
    async fn decode(&self, image: &Path) -> eyre::Result<Option<String>> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .kill_on_drop(true)
            .output()
            .await
            .wrap_err_with(|| format!("could not run {}", self.program))?;

        eyre::ensure!(
            output.status.success(),
            "{} exited with {}: {}",
            self.program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        let stdout = String::from_utf8(output.stdout)?;
        let payload = stdout.trim_end_matches(['\r', '\n']);

        if payload.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(payload.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandDecoder {
        // The image path becomes `$0` of the script.
        CommandDecoder::new("sh".into(), vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn stdout_is_the_payload() {
        let image = tempfile::NamedTempFile::new().unwrap();

        let payload = shell("echo HELLO").decode(image.path()).await.unwrap();

        assert_eq!(payload.as_deref(), Some("HELLO"));
    }

    #[tokio::test]
    async fn receives_image_path() {
        let image = tempfile::NamedTempFile::new().unwrap();

        let payload = shell("echo \"$0\"").decode(image.path()).await.unwrap();

        assert_eq!(payload.as_deref(), image.path().to_str());
    }

    #[tokio::test]
    async fn empty_output_is_no_payload() {
        let image = tempfile::NamedTempFile::new().unwrap();

        assert_eq!(shell("true").decode(image.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let image = tempfile::NamedTempFile::new().unwrap();

        let err = shell("echo broken >&2; exit 3")
            .decode(image.path())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("broken"), "{err}");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let decoder = CommandDecoder::new("/nonexistent/reader".into(), vec![]);

        assert!(decoder.decode(image.path()).await.is_err());
    }
}
