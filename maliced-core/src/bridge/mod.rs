//! Invocation bridge to the Python backend.
//!
//! The backend is an opaque collaborator driven through two command lines:
//!
//! - `<python> process.py <input> <output> <json-options>`
//! - `<python> get_metadata.py <image>`, printing a JSON object
//!
//! Exit code 0 is success. Otherwise stderr becomes the error detail.

mod options;
mod watermark;

pub use options::{output_file_name, output_path, ProcessingOptions};
pub use watermark::{WatermarkCatalog, WatermarkEntry};

use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppPaths;
use crate::error::BridgeError;
use crate::python::{CommandOutput, CommandRunner, RuntimeLayout, TokioCommandRunner};

/// Image extensions the backend accepts.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Result of a successful processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub output_path: PathBuf,
    /// Status text the backend printed.
    pub message: String,
}

impl ProcessOutcome {
    /// Folder the output was written to.
    pub fn output_folder(&self) -> &Path {
        self.output_path.parent().unwrap_or(&self.output_path)
    }
}

/// Checks that `path` is an existing, readable image of a supported type.
pub fn validate_image_path(path: &Path) -> Result<PathBuf, BridgeError> {
    if !path.exists() {
        return Err(BridgeError::FileNotFound(path.to_path_buf()));
    }
    if std::fs::File::open(path).is_err() {
        return Err(BridgeError::Unreadable(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(BridgeError::UnsupportedFormat(ext));
    }

    Ok(path.to_path_buf())
}

/// Runs the backend scripts with the provisioned runtime.
#[derive(Clone)]
pub struct Bridge {
    paths: AppPaths,
    layout: RuntimeLayout,
    output_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Bridge {
    pub fn new(paths: AppPaths, runner: Arc<dyn CommandRunner>) -> Self {
        let layout = paths.runtime_layout();
        let output_dir = paths.default_output_dir();
        Self {
            paths,
            layout,
            output_dir,
            runner,
        }
    }

    pub fn with_defaults(paths: AppPaths) -> Self {
        Self::new(paths, Arc::new(TokioCommandRunner))
    }

    /// Directory processed images are written to.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn watermarks(&self) -> WatermarkCatalog {
        WatermarkCatalog::from_paths(&self.paths)
    }

    /// Processes `input` and writes `maliced-<stem>.<format>` to the output
    /// directory.
    ///
    /// `original_name` names the output when the input is a staged copy
    /// (e.g. a dropped file); defaults to the input's file name.
    pub async fn process_image(
        &self,
        input: &Path,
        original_name: Option<&str>,
        options: &ProcessingOptions,
    ) -> Result<ProcessOutcome, BridgeError> {
        let python = self.runtime()?;
        let input = validate_image_path(input)?;

        let original_name = original_name
            .map(str::to_string)
            .or_else(|| {
                input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        // The backend reads from the staging directory, never the user's file.
        let input_dir = self.paths.input_dir();
        tokio::fs::create_dir_all(&input_dir).await?;
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staged = input_dir.join(format!("temp_input.{}", ext));
        if same_file(&input, &staged).await {
            debug!("Input is already staged at {}", staged.display());
        } else {
            tokio::fs::copy(&input, &staged).await?;
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output = output_path(&self.output_dir, &original_name, &options.output_format);

        info!(
            "Processing {} -> {}",
            input.display(),
            output.display()
        );

        let args = vec![
            self.paths.process_script().into_os_string(),
            staged.into_os_string(),
            output.clone().into_os_string(),
            OsString::from(options.to_json()?),
        ];
        let result = self.runner.run("process.py", &python, &args).await?;
        let result = check_exit(result)?;

        Ok(ProcessOutcome {
            output_path: output,
            message: result.stdout.trim().to_string(),
        })
    }

    /// Reads the metadata of `image` as a JSON object.
    pub async fn extract_metadata(&self, image: &Path) -> Result<Map<String, Value>, BridgeError> {
        if !image.exists() {
            return Err(BridgeError::FileNotFound(image.to_path_buf()));
        }
        let python = self.runtime()?;

        debug!("Getting metadata for {}", image.display());
        let args = vec![
            self.paths.metadata_script().into_os_string(),
            image.as_os_str().to_os_string(),
        ];
        let result = self.runner.run("get_metadata.py", &python, &args).await?;
        let result = check_exit(result)?;

        serde_json::from_str(result.stdout.trim()).map_err(BridgeError::InvalidMetadata)
    }

    fn runtime(&self) -> Result<PathBuf, BridgeError> {
        if self.layout.is_installed() {
            Ok(self.layout.executable.clone())
        } else {
            Err(BridgeError::RuntimeMissing(self.layout.executable.clone()))
        }
    }
}

fn check_exit(output: CommandOutput) -> Result<CommandOutput, BridgeError> {
    if output.success() {
        Ok(output)
    } else {
        Err(BridgeError::ProcessFailed {
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Whether both paths name the same existing file.
async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies with a canned output and records every invocation.
    struct ScriptedRunner {
        reply: CommandOutput,
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn replying(code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: CommandOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            _label: &str,
            program: &Path,
            args: &[OsString],
        ) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push((
                program.to_path_buf(),
                args.iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
            ));
            Ok(self.reply.clone())
        }
    }

    struct Fixture {
        temp: TempDir,
        paths: AppPaths,
    }

    fn fixture(with_runtime: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::new(temp.path().join("app"), temp.path().join("data"));
        if with_runtime {
            let exe = paths.runtime_layout().executable;
            std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
            std::fs::write(&exe, b"").unwrap();
        }
        Fixture { temp, paths }
    }

    fn image(f: &Fixture, name: &str) -> PathBuf {
        let path = f.temp.path().join(name);
        std::fs::write(&path, b"\x89PNG").unwrap();
        path
    }

    #[test]
    fn test_validate_image_path() {
        let f = fixture(false);
        let png = image(&f, "cat.PNG");
        assert_eq!(validate_image_path(&png).unwrap(), png);

        let gif = image(&f, "cat.gif");
        assert!(matches!(
            validate_image_path(&gif),
            Err(BridgeError::UnsupportedFormat(ref e)) if e == "gif"
        ));

        assert!(matches!(
            validate_image_path(&f.temp.path().join("missing.png")),
            Err(BridgeError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_process_image_invokes_backend() {
        let f = fixture(true);
        let input = image(&f, "holiday.jpeg");
        let runner = ScriptedRunner::replying(0, "Done\n", "");
        let bridge = Bridge::new(f.paths.clone(), runner.clone());

        let outcome = tokio_test::block_on(bridge.process_image(
            &input,
            None,
            &ProcessingOptions::default(),
        ))
        .unwrap();

        let expected = f.paths.default_output_dir().join("maliced-holiday.png");
        assert_eq!(outcome.output_path, expected);
        assert_eq!(outcome.message, "Done");
        assert_eq!(outcome.output_folder(), f.paths.default_output_dir());

        let calls = runner.calls.lock().unwrap();
        let (program, args) = &calls[0];
        assert_eq!(program, &f.paths.runtime_layout().executable);
        assert_eq!(args.len(), 4);
        assert_eq!(args[0], f.paths.process_script().to_string_lossy());
        assert_eq!(
            args[1],
            f.paths.input_dir().join("temp_input.jpeg").to_string_lossy()
        );
        assert_eq!(args[2], expected.to_string_lossy());

        let options: serde_json::Value = serde_json::from_str(&args[3]).unwrap();
        assert_eq!(options["output_format"], "png");
        assert!(f.paths.input_dir().join("temp_input.jpeg").is_file());
    }

    #[test]
    fn test_process_image_uses_original_name_and_output_dir() {
        let f = fixture(true);
        let input = image(&f, "temp_drop.png");
        let out = f.temp.path().join("custom-out");
        let bridge =
            Bridge::new(f.paths.clone(), ScriptedRunner::replying(0, "", "")).with_output_dir(&out);
        let mut options = ProcessingOptions::default();
        options.output_format = "webp".to_string();

        let outcome =
            tokio_test::block_on(bridge.process_image(&input, Some("portrait.jpg"), &options))
                .unwrap();

        assert_eq!(outcome.output_path, out.join("maliced-portrait.webp"));
        assert!(out.is_dir());
    }

    #[test]
    fn test_process_image_already_in_staging_dir() {
        let f = fixture(true);
        let staged = f.paths.input_dir().join("temp_input.png");
        std::fs::create_dir_all(staged.parent().unwrap()).unwrap();
        std::fs::write(&staged, b"\x89PNG original pixels").unwrap();
        let runner = ScriptedRunner::replying(0, "", "");
        let bridge = Bridge::new(f.paths.clone(), runner.clone());

        tokio_test::block_on(bridge.process_image(&staged, None, &ProcessingOptions::default()))
            .unwrap();

        assert_eq!(std::fs::read(&staged).unwrap(), b"\x89PNG original pixels");
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].1[1], staged.to_string_lossy());
    }

    #[test]
    fn test_process_failure_surfaces_stderr() {
        let f = fixture(true);
        let input = image(&f, "a.png");
        let bridge = Bridge::new(
            f.paths.clone(),
            ScriptedRunner::replying(2, "", "Traceback: boom\n"),
        );

        let err = tokio_test::block_on(bridge.process_image(
            &input,
            None,
            &ProcessingOptions::default(),
        ))
        .unwrap_err();

        match err {
            BridgeError::ProcessFailed { code, stderr } => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "Traceback: boom");
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_runtime() {
        let f = fixture(false);
        let input = image(&f, "a.png");
        let runner = ScriptedRunner::replying(0, "", "");
        let bridge = Bridge::new(f.paths.clone(), runner.clone());

        let err = tokio_test::block_on(bridge.process_image(
            &input,
            None,
            &ProcessingOptions::default(),
        ))
        .unwrap_err();

        assert!(matches!(err, BridgeError::RuntimeMissing(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_extract_metadata() {
        let f = fixture(true);
        let input = image(&f, "a.png");
        let runner = ScriptedRunner::replying(0, r#"{"format": "PNG", "exif": {}}"#, "");
        let bridge = Bridge::new(f.paths.clone(), runner.clone());

        let metadata = tokio_test::block_on(bridge.extract_metadata(&input)).unwrap();

        assert_eq!(metadata["format"], "PNG");
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].1[0], f.paths.metadata_script().to_string_lossy());
        assert_eq!(calls[0].1[1], input.to_string_lossy());
    }

    #[test]
    fn test_extract_metadata_rejects_non_object() {
        let f = fixture(true);
        let input = image(&f, "a.png");
        let bridge = Bridge::new(f.paths.clone(), ScriptedRunner::replying(0, "not json", ""));

        let err = tokio_test::block_on(bridge.extract_metadata(&input)).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidMetadata(_)));
    }
}
