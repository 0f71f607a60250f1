use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;

use super::{parse_output, VectorizeError, Vectorizer};
use crate::vector::FaceVector;

/// Runs an external program per image, typically `docker run` of an
/// algorithm image. Arguments may contain `{path}` (image path on the host)
/// and `{name}` (its file name); without either placeholder the path is
/// appended as the last argument.
pub struct CommandVectorizer {
    program: String,
    args: Vec<String>,
    /// (prefix inside this container, same directory on the docker host)
    path_rewrite: Option<(String, String)>,
}

impl CommandVectorizer {
    /// Build from a whitespace-separated command line.
    pub fn new(command_line: &str) -> Result<Self, VectorizeError> {
        let mut parts = command_line.split_whitespace().map(|s| s.to_string());
        let program = parts
            .next()
            .ok_or_else(|| VectorizeError::Backend("vectorizer command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            path_rewrite: None,
        })
    }

    /// Rewrite paths under `mounted_dir` to `host_dir` before handing them to
    /// the command. Needed when this service runs in a container and spawns
    /// sibling containers: volume mounts must name the host's path.
    pub fn with_path_rewrite(mut self, mounted_dir: &str, host_dir: &str) -> Self {
        self.path_rewrite = Some((mounted_dir.to_string(), host_dir.to_string()));
        self
    }

    fn host_path(&self, path: &str) -> String {
        match self.path_rewrite {
            Some((ref mounted, ref host)) if path.starts_with(mounted.as_str()) => {
                format!("{host}{}", &path[mounted.len()..])
            }
            _ => path.to_string(),
        }
    }

    fn build_args(&self, path: &str) -> Vec<String> {
        let host_path = self.host_path(path);
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let templated = self
            .args
            .iter()
            .any(|a| a.contains("{path}") || a.contains("{name}"));

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{path}", &host_path).replace("{name}", &name))
            .collect();
        if !templated {
            args.push(host_path);
        }
        args
    }
}

#[async_trait]
impl Vectorizer for CommandVectorizer {
    async fn vectorize(&self, path: &str) -> Result<Vec<FaceVector>, VectorizeError> {
        let args = self.build_args(path);
        tracing::debug!(program = %self.program, args = ?args, "Running vectorizer");

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VectorizeError::Backend(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_appended_without_placeholders() {
        let v = CommandVectorizer::new("python3 vectorize.py").unwrap();
        assert_eq!(v.build_args("/data/a.jpg"), vec!["vectorize.py", "/data/a.jpg"]);
    }

    #[test]
    fn test_placeholders_and_rewrite() {
        let v = CommandVectorizer::new(
            "docker run --rm -v {path}:/{name}:ro cwolff/face_recognition /{name}",
        )
        .unwrap()
        .with_path_rewrite("/app/files", "/srv/faces");

        assert_eq!(
            v.build_args("/app/files/x.png"),
            vec![
                "run",
                "--rm",
                "-v",
                "/srv/faces/x.png:/x.png:ro",
                "cwolff/face_recognition",
                "/x.png"
            ]
        );
    }

    #[test]
    fn test_rewrite_ignores_other_prefixes() {
        let v = CommandVectorizer::new("vec")
            .unwrap()
            .with_path_rewrite("/app/files", "/srv/faces");
        assert_eq!(v.host_path("/tmp/x.png"), "/tmp/x.png");
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandVectorizer::new("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_program_and_parses_stdout() {
        // Quoted arguments cannot come through split_whitespace; build directly
        let v = CommandVectorizer {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"echo '{"faceVectors":[[[1.0,2.0]]]}' # {path}"#.to_string(),
            ],
            path_rewrite: None,
        };
        let vectors = v.vectorize("/tmp/ignored.jpg").await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0]]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_backend_error() {
        let v = CommandVectorizer {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3 # {path}".to_string()],
            path_rewrite: None,
        };
        let err = v.vectorize("/tmp/ignored.jpg").await.unwrap_err();
        assert!(matches!(err, VectorizeError::Backend(msg) if msg.contains("boom")));
    }
}
