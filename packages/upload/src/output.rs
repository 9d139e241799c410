//! Output bindings published after a run.

use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use s3_deploy_models::UploadOutcome;

/// Name of the output holding the uploaded package's file name.
pub const FILE_NAME: &str = "FileName";
/// Name of the output holding the uploaded package's local path.
pub const FILE_PATH: &str = "FilePath";

/// Name of the per-file output for `key`.
#[must_use]
pub fn files_output_name(key: &str) -> String {
    format!("Files[{key}]")
}

/// Receives named output values.
pub trait OutputSink {
    /// Publishes one output.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the value cannot be written.
    fn set_output(&mut self, name: &str, value: &str) -> std::io::Result<()>;
}

/// Writes outputs as `##deploy[setVariable ...]` service messages, with
/// name and value base64-encoded so neither needs escaping.
pub struct ServiceMessageSink<W: Write> {
    writer: W,
}

impl<W: Write> ServiceMessageSink<W> {
    /// Creates a sink writing one message per line to `writer`.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for ServiceMessageSink<W> {
    fn set_output(&mut self, name: &str, value: &str) -> std::io::Result<()> {
        writeln!(
            self.writer,
            "##deploy[setVariable name=\"{}\" value=\"{}\"]",
            STANDARD.encode(name),
            STANDARD.encode(value)
        )
    }
}

/// Collects outputs in memory, in the order they were set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectedOutputs {
    entries: Vec<(String, String)>,
}

impl CollectedOutputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All outputs in the order they were set.
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// The last value set for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Renders the outputs as a JSON object, preserving order.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
                .collect(),
        )
    }
}

impl OutputSink for CollectedOutputs {
    fn set_output(&mut self, name: &str, value: &str) -> std::io::Result<()> {
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }
}

/// Publishes the bindings for a run over `package`.
///
/// `FileName` and `FilePath` always describe the package. Each written
/// object that came back with a version id adds a `Files[<key>]` entry,
/// in processing order.
///
/// # Errors
///
/// Returns the first error raised by `sink`.
pub fn emit(
    sink: &mut dyn OutputSink,
    package: &Path,
    outcomes: &[UploadOutcome],
) -> std::io::Result<()> {
    let file_name = package
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    sink.set_output(FILE_NAME, &file_name)?;
    sink.set_output(FILE_PATH, &package.display().to_string())?;

    for outcome in outcomes.iter().filter(|o| o.performed) {
        let Some(version) = &outcome.remote_version else {
            continue;
        };
        let name = files_output_name(&outcome.target.remote_key);
        log::info!("Saving object version id to output \"{name}\"");
        sink.set_output(&name, version)?;
    }
    Ok(())
}
