/// exiftool-backed metadata extraction
///
/// exiftool is invoked once per manifest build with the whole file list.
/// The list is streamed on stdin (`-@ -`) so large photo folders do not run
/// into the OS argument length limit.
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{ExtractError, MetadataExtractor, RawMetadata};

/// Tags requested from exiftool, numeric output, one JSON object per file
const EXIFTOOL_ARGS: [&str; 12] = [
    "-json",
    "-n",
    "-r",
    "-DateTimeOriginal",
    "-CreateDate",
    "-GPSLatitude",
    "-GPSLongitude",
    "-FileModifyDate",
    "-charset",
    "filename=utf8",
    "-@",
    "-",
];

/// Install hints logged when exiftool is missing
pub const INSTALL_HINTS: &str = "install exiftool and make sure it is on PATH: \
    Debian/Ubuntu `sudo apt-get install libimage-exiftool-perl`, \
    macOS `brew install exiftool`, Windows `choco install exiftool`";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time between SIGTERM and SIGKILL once the timeout hits
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Runs the exiftool binary
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: String,
    timeout: Duration,
}

impl ExifTool {
    /// `program` is either a bare name looked up on PATH or a path to the binary.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Resolve the binary without running it.
    pub fn locate(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        find_on_path(&self.program, std::env::var_os("PATH")?)
    }

    fn run(&self, binary: &Path, paths: &[PathBuf]) -> Result<String, ExtractError> {
        let mut cmd = Command::new(binary);
        cmd.args(EXIFTOOL_ARGS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout also takes down anything a wrapper
        // script started that still holds our pipes.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let spawn_error = |source| ExtractError::Spawn {
            tool: self.program.clone(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_error)?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            return Err(spawn_error(io::Error::other("child pipes were not captured")));
        };

        // One path per line; closing stdin ends the argument list.
        let file_list = argfile_contents(paths);
        let writer = thread::spawn(move || stdin.write_all(&file_list));
        let stdout_reader = thread::spawn(move || read_all(stdout));
        let stderr_reader = thread::spawn(move || read_all(stderr));

        let status = wait_with_timeout(&mut child, self.timeout).map_err(spawn_error)?;

        // After a timeout the pipe threads are detached instead of joined: a
        // process outside our group may still hold the pipes open.
        let Some(status) = status else {
            return Err(ExtractError::TimedOut(self.timeout));
        };

        let write_result = writer.join();
        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        if let Ok(Err(e)) = write_result {
            debug!("exiftool closed stdin early: {}", e);
        }

        if !status.success() {
            return Err(ExtractError::Failed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            debug!("exiftool stderr: {}", stderr.trim());
        }

        Ok(stdout)
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool", Duration::from_secs(120))
    }
}

impl MetadataExtractor for ExifTool {
    fn extract(&self, paths: &[PathBuf]) -> Result<Vec<RawMetadata>, ExtractError> {
        let Some(binary) = self.locate() else {
            return Err(ExtractError::ToolUnavailable {
                tool: self.program.clone(),
            });
        };

        if paths.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "running {} over {} files",
            binary.display(),
            paths.len()
        );

        let stdout = self.run(&binary, paths)?;
        parse_output(&stdout)
    }
}

/// Parse exiftool's `-json` output.
pub fn parse_output(stdout: &str) -> Result<Vec<RawMetadata>, ExtractError> {
    if stdout.trim().is_empty() {
        return Err(ExtractError::InvalidOutput("empty output".to_string()));
    }
    serde_json::from_str(stdout).map_err(|e| ExtractError::InvalidOutput(e.to_string()))
}

fn find_on_path(name: &str, path_var: OsString) -> Option<PathBuf> {
    let candidates: Vec<String> = if cfg!(windows) && Path::new(name).extension().is_none() {
        vec![format!("{name}.exe"), format!("{name}.bat"), name.to_string()]
    } else {
        vec![name.to_string()]
    };

    for dir in std::env::split_paths(&path_var) {
        for candidate in &candidates {
            let full = dir.join(candidate);
            if full.is_file() {
                return Some(full);
            }
        }
    }

    None
}

fn argfile_contents(paths: &[PathBuf]) -> Vec<u8> {
    let mut out = Vec::new();
    for path in paths {
        out.extend_from_slice(path.to_string_lossy().as_bytes());
        out.push(b'\n');
    }
    out
}

/// Wait for the child, killing it once `timeout` has elapsed.
///
/// Returns `Ok(None)` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            warn!("exiftool exceeded {}s, killing it", timeout.as_secs());
            terminate_process_tree(child)?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(start.elapsed())));
    }
}

#[cfg(unix)]
fn terminate_process_tree(child: &mut Child) -> io::Result<ExitStatus> {
    // The group id equals the child's pid, see `process_group(0)`.
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) with a negative pid only signals our own process group.
    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }

    let start = Instant::now();
    while start.elapsed() < KILL_GRACE {
        if let Some(status) = child.try_wait()? {
            // the leader is gone, make sure its children are too
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
            return Ok(status);
        }
        thread::sleep(Duration::from_millis(25));
    }

    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    child.wait()
}

#[cfg(not(unix))]
fn terminate_process_tree(child: &mut Child) -> io::Result<ExitStatus> {
    let _ = child.kill();
    child.wait()
}

fn read_all(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join_reader(handle: thread::JoinHandle<io::Result<Vec<u8>>>) -> String {
    match handle.join() {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            debug!("failed reading exiftool output: {}", e);
            String::new()
        }
        Err(_) => String::new(),
    }
}
