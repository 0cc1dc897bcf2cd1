use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;

use tempfile::{NamedTempFile, PathPersistError};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Turns a named image into a tarball on disk.
pub trait ImageSaver {
    /// Save `image` to a fresh temporary file and return its path. The caller
    /// owns the file and deletes it.
    fn save(&self, image: &str) -> Result<PathBuf>;
}

/// Container runtime CLIs that can export an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    #[default]
    Docker,
    Podman,
    Containerd,
}

impl RuntimeKind {
    /// Default executable name for this runtime.
    pub fn binary(self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
            RuntimeKind::Containerd => "ctr",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
            RuntimeKind::Containerd => "containerd",
        })
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "podman" => Ok(RuntimeKind::Podman),
            "containerd" | "ctr" => Ok(RuntimeKind::Containerd),
            other => Err(format!(
                "unknown runtime '{other}' (expected docker, podman or containerd)"
            )),
        }
    }
}

/// Saves images by shelling out to a runtime CLI (`docker save`,
/// `podman save`, `ctr image export`).
#[derive(Debug, Clone)]
pub struct RuntimeSaver {
    cmd: String,
    kind: RuntimeKind,
}

impl RuntimeSaver {
    pub fn new(kind: RuntimeKind) -> Self {
        Self {
            cmd: kind.binary().to_string(),
            kind,
        }
    }

    /// Use a specific executable instead of the runtime's default name.
    pub fn with_command(kind: RuntimeKind, cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            kind,
        }
    }

    /// Fresh file in the temp dir, deleted on drop unless kept.
    fn temp_file() -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix("shuck-save-")
            .suffix(".tar")
            .tempfile()
            .map_err(|e| Error::io(std::env::temp_dir(), e))
    }

    fn persist_error(err: PathPersistError) -> Error {
        Error::io(&err.path, err.error)
    }

    fn failed(image: &str, reason: impl Into<String>) -> Error {
        Error::Materialize {
            image: image.to_string(),
            reason: reason.into(),
        }
    }

    /// ctr requires a file path argument; no stdout piping.
    fn save_via_export(&self, image: &str) -> Result<PathBuf> {
        let tmp = Self::temp_file()?.into_temp_path();

        let output = Command::new(&self.cmd)
            .args(["image", "export"])
            .arg(&tmp)
            .arg(image)
            .output()
            .map_err(|e| Self::failed(image, format!("cannot run '{} image export': {e}", self.cmd)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::failed(image, stderr.trim()));
        }
        tmp.keep().map_err(Self::persist_error)
    }

    /// docker/podman: pipe stdout into the temp file.
    fn save_via_pipe(&self, image: &str) -> Result<PathBuf> {
        let mut file = Self::temp_file()?;

        let mut cmd = Command::new(&self.cmd);
        cmd.args(["save", image]);
        if matches!(self.kind, RuntimeKind::Podman) {
            cmd.arg("--format=docker-archive");
        }

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::failed(image, format!("cannot run '{} save': {e}", self.cmd)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Self::failed(image, "stdout was not captured"))?;
        // stderr is read on its own thread while stdout streams to disk.
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        let copied = io::copy(&mut stdout, &mut file);
        drop(stdout);

        let status = child.wait().map_err(|e| Error::io(file.path(), e))?;
        let stderr_text = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(Self::failed(image, stderr_text.trim()));
        }
        let written = copied.map_err(|e| Error::io(file.path(), e))?;

        let tmp = file.into_temp_path().keep().map_err(Self::persist_error)?;
        debug!(image, bytes = written, path = %tmp.display(), "image saved");
        Ok(tmp)
    }
}

impl ImageSaver for RuntimeSaver {
    fn save(&self, image: &str) -> Result<PathBuf> {
        info!(image, runtime = %self.kind, "saving image via runtime");
        match self.kind {
            RuntimeKind::Containerd => self.save_via_export(image),
            RuntimeKind::Docker | RuntimeKind::Podman => self.save_via_pipe(image),
        }
    }
}
