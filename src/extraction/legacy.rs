use bytes::Bytes;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

pub const DEFAULT_CARVER_TIMEOUT: Duration = Duration::from_secs(600);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The external carving tool. It is run as
/// `program args... <input file> <output directory>`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CarverCommand {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Default for CarverCommand {
    fn default() -> Self {
        Self::new("python3", ["-m", "hachoir.subfile", "--category", "image"])
    }
}

impl CarverCommand {
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: Some(DEFAULT_CARVER_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Display for CarverCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        f.write_str("\"")
    }
}

/// A file produced by the carving tool.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Fragment {
    pub name: String,
    pub data: Bytes,
}

/// Pulls images out of opaque legacy documents by handing them to the
/// carving tool. Failure of the tool in any form yields no fragments.
#[derive(Debug, Clone, derive_new::new)]
pub struct LegacyExtractor {
    command: CarverCommand,
}

impl LegacyExtractor {
    pub fn command(&self) -> &CarverCommand {
        &self.command
    }

    /// Carves `data` using `workspace` as scratch space. Every file the tool
    /// leaves behind is removed before returning, fragments are returned in
    /// file name order.
    pub fn extract(&self, data: &[u8], workspace: &Path) -> io::Result<Vec<Fragment>> {
        let mut input = tempfile::Builder::new()
            .prefix(".carve-input-")
            .tempfile_in(workspace)?;
        input.write_all(data)?;
        input.flush()?;

        let succeeded = self.run(input.path(), workspace);
        let outputs = list_outputs(workspace, input.path());
        trace!(succeeded, outputs = outputs.len(), "carver finished");

        let mut fragments = Vec::new();
        for path in outputs {
            if succeeded {
                match fs::read(&path) {
                    Ok(data) => fragments.push(Fragment {
                        name: fragment_name(workspace, &path),
                        data: Bytes::from(data),
                    }),
                    Err(e) => warn!(?path, error = %e, "failed to read carved fragment"),
                }
            }
            if let Err(e) = fs::remove_file(&path) {
                warn!(?path, error = %e, "failed to remove carved fragment");
            }
        }
        remove_directories(workspace);
        input.close()?;
        Ok(fragments)
    }

    fn run(&self, input: &Path, workspace: &Path) -> bool {
        let spawned = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(input)
            .arg(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(carver = %self.command, error = %e, "failed to start carver");
                return false;
            }
        };

        let status = match self.command.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout),
            None => child.wait().map(Some),
        };
        match status {
            Ok(Some(status)) if status.success() => true,
            Ok(Some(status)) => {
                debug!(%status, "carver exited unsuccessfully, no fragments");
                false
            }
            Ok(None) => {
                warn!(timeout = ?self.command.timeout, "carver timed out and was killed");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed waiting for carver");
                false
            }
        }
    }
}

/// Returns `None` when the child had to be killed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn list_outputs(workspace: &Path, input: &Path) -> Vec<PathBuf> {
    WalkDir::new(workspace)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "failed to list carver output");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && entry.path() != input)
        .map(|entry| entry.into_path())
        .collect()
}

fn fragment_name(workspace: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(workspace).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn remove_directories(workspace: &Path) {
    let Ok(entries) = fs::read_dir(workspace) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!(?path, error = %e, "failed to remove carver output directory");
            }
        }
    }
}
