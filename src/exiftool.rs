use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::mapping::TagAssignment;

const STDERR_POLL_INTERVAL: Duration = Duration::from_millis(5);
const STDERR_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Control directives appended to every write: prefer the XMP sidecar next
/// to the image as the write target, and never keep `_original` backup
/// copies of whatever file ends up written.
const WRITE_DIRECTIVES: &[&str] = &["-srcfile", "%d%f.xmp", "-overwrite_original"];

/// Abstraction over the metadata tool, so the per-file worker can be tested
/// against an in-memory double.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read the given tags from a file. Tags the file does not carry are
    /// simply absent from the returned map; an empty map is not an error.
    async fn read_tags(&self, file: &Path, tags: &[&str]) -> Result<HashMap<String, String>>;

    /// Write all assignments to a file in one call.
    async fn write_tags(&self, file: &Path, assignments: &[TagAssignment]) -> Result<()>;
}

/// A persistent `exiftool` process in `-stay_open` mode.
///
/// Spawning exiftool once and streaming commands to it avoids the Perl
/// startup cost on every file. Commands are written to stdin one argument
/// per line followed by `-execute`; the response is everything on stdout up
/// to the `{ready}` marker. A dedicated thread drains stderr into a channel.
///
/// Methods take `&mut self` because each command is a stateful round-trip
/// over a single stdin/stdout channel — interleaved commands would corrupt
/// the responses. [`SharedExifTool`] wraps this in a mutex for concurrent
/// use.
#[derive(Debug)]
pub struct ExifTool {
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr_receiver: Receiver<String>,
    child: Child,
}

impl ExifTool {
    /// Launch `exiftool` from PATH in stay-open mode.
    pub fn new() -> Result<Self> {
        Self::with_executable(Path::new("exiftool"))
    }

    /// Launch `exiftool` from a specific path.
    pub fn with_executable(executable: &Path) -> Result<Self> {
        let mut child = Command::new(executable)
            .arg("-stay_open")
            .arg("True")
            .arg("-@")
            .arg("-") // read command args from stdin
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Error::ExifToolNotFound)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stderr")))?;

        let (stderr_sender, stderr_receiver) = mpsc::channel();
        let stderr_reader = BufReader::new(stderr);
        thread::spawn(move || {
            for line in stderr_reader.lines().map_while(std::result::Result::ok) {
                if stderr_sender.send(line).is_err() {
                    // Receiver dropped, process is closing
                    break;
                }
            }
        });

        Ok(Self {
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            stderr_receiver,
            child,
        })
    }

    /// Read the requested tags from `file` as a group-qualified tag → value
    /// map.
    ///
    /// Tags are exiftool names (`XMP:GPSLatitude`, `Composite:GPSLatitude`,
    /// …). The `-n` flag keeps coordinates as signed decimals instead of
    /// formatted degree strings; `-G` keeps the group prefix on the returned
    /// keys so the same tag from different groups stays distinguishable.
    pub fn read_tags(&mut self, file: &Path, tags: &[&str]) -> Result<HashMap<String, String>> {
        let mut args: Vec<String> = vec!["-j".to_string(), "-n".to_string(), "-G".to_string()];
        for tag in tags {
            args.push(format!("-{tag}"));
        }
        args.push(file.display().to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let (stdout, stderr) = self.round_trip(&arg_refs)?;

        if let Some(message) = first_error_line(&stderr) {
            return Err(Error::MetadataRead {
                path: file.to_path_buf(),
                message,
            });
        }

        parse_tag_json(&stdout).map_err(|message| Error::MetadataRead {
            path: file.to_path_buf(),
            message,
        })
    }

    /// Write all assignments to `file` in a single exiftool call, with the
    /// sidecar/overwrite directives appended.
    pub fn write_tags(&mut self, file: &Path, assignments: &[TagAssignment]) -> Result<()> {
        let mut args: Vec<String> = assignments
            .iter()
            .map(TagAssignment::to_exiftool_arg)
            .collect();
        args.extend(WRITE_DIRECTIVES.iter().map(|s| s.to_string()));
        args.push(file.display().to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let (stdout, stderr) = self.round_trip(&arg_refs)?;

        if let Some(message) = first_error_line(&stderr) {
            return Err(Error::MetadataWrite {
                path: file.to_path_buf(),
                message,
            });
        }

        let summary = String::from_utf8_lossy(&stdout);
        let summary = summary.trim();
        if summary.contains("0 image files updated") && !summary.contains("1 image files updated") {
            return Err(Error::MetadataWrite {
                path: file.to_path_buf(),
                message: summary.to_string(),
            });
        }
        log::debug!("exiftool: {summary}");
        Ok(())
    }

    /// Send one command and collect (stdout body, stderr lines).
    fn round_trip(&mut self, args: &[&str]) -> Result<(Vec<u8>, Vec<String>)> {
        // Clear stale stderr from a previous command so errors are not
        // misattributed
        while self.stderr_receiver.try_recv().is_ok() {}

        for arg in args {
            writeln!(self.stdin, "{arg}")?;
        }
        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;

        let stdout = self.read_until_ready()?;
        let stderr = self.drain_stderr()?;

        for line in &stderr {
            if line.contains("Warning:") {
                log::warn!("exiftool: {line}");
            }
        }

        Ok((stdout, stderr))
    }

    /// Read stdout until the `{ready}` marker.
    fn read_until_ready(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(4096);
        let ready_unix: &[u8] = b"{ready}\n";
        let ready_win: &[u8] = b"{ready}\r\n";

        loop {
            let mut chunk = [0u8; 4096];
            let n = self.stdout.read(&mut chunk)?;
            if n == 0 {
                // EOF before {ready}: the process died under us
                return Err(Error::ProcessTerminated);
            }
            buffer.extend_from_slice(&chunk[..n]);

            if buffer.ends_with(ready_win) {
                buffer.truncate(buffer.len() - ready_win.len());
                return Ok(buffer);
            }
            if buffer.ends_with(ready_unix) {
                buffer.truncate(buffer.len() - ready_unix.len());
                return Ok(buffer);
            }
        }
    }

    /// Drain stderr, polling briefly since error lines can arrive slightly
    /// after the stdout response.
    fn drain_stderr(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let start = Instant::now();

        loop {
            match self.stderr_receiver.try_recv() {
                Ok(line) => lines.push(line),
                Err(TryRecvError::Empty) => {
                    if !lines.is_empty() || start.elapsed() >= STDERR_POLL_TIMEOUT {
                        break;
                    }
                    thread::sleep(STDERR_POLL_INTERVAL);
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }

        Ok(lines)
    }

    /// Leave stay-open mode and reap the child process.
    pub fn close(&mut self) -> Result<()> {
        writeln!(self.stdin, "-stay_open")?;
        writeln!(self.stdin, "False")?;
        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        if self.close().is_err() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Blocking interface of the underlying tool.
///
/// [`ExifTool`] is the production implementation; the trait exists so the
/// shared-handle layer can be exercised against an in-memory tool.
pub trait MetadataTool: Send + 'static {
    fn read_tags(&mut self, file: &Path, tags: &[&str]) -> Result<HashMap<String, String>>;
    fn write_tags(&mut self, file: &Path, assignments: &[TagAssignment]) -> Result<()>;
}

impl MetadataTool for ExifTool {
    fn read_tags(&mut self, file: &Path, tags: &[&str]) -> Result<HashMap<String, String>> {
        ExifTool::read_tags(self, file, tags)
    }

    fn write_tags(&mut self, file: &Path, assignments: &[TagAssignment]) -> Result<()> {
        ExifTool::write_tags(self, file, assignments)
    }
}

/// A shareable handle to one stateful tool instance.
///
/// The inner mutex is held for the full duration of each read/write
/// round-trip, so at most one command is in flight against the tool at
/// any time regardless of how many workers share the handle. The lock is
/// released on every exit path, error paths included. The actual blocking
/// I/O runs on the tokio blocking pool.
pub struct SharedTool<T: MetadataTool> {
    inner: Arc<Mutex<T>>,
}

/// The handle the batch pipeline hands its workers.
pub type SharedExifTool = SharedTool<ExifTool>;

impl<T: MetadataTool> Clone for SharedTool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: MetadataTool> SharedTool<T> {
    pub fn new(tool: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tool)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, T>> {
        // A poisoned lock means a panic mid round-trip; the channel state is
        // unknown, so treat the process as gone
        self.inner.lock().map_err(|_| Error::ProcessTerminated)
    }
}

impl SharedTool<ExifTool> {
    /// Shut down the underlying exiftool process. Call after the batch has
    /// fully drained.
    pub fn close(&self) -> Result<()> {
        self.lock()?.close()
    }
}

#[async_trait::async_trait]
impl<T: MetadataTool> MetadataStore for SharedTool<T> {
    async fn read_tags(&self, file: &Path, tags: &[&str]) -> Result<HashMap<String, String>> {
        let this = self.clone();
        let file: PathBuf = file.to_path_buf();
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
            this.lock()?.read_tags(&file, &tag_refs)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    async fn write_tags(&self, file: &Path, assignments: &[TagAssignment]) -> Result<()> {
        let this = self.clone();
        let file: PathBuf = file.to_path_buf();
        let assignments: Vec<TagAssignment> = assignments.to_vec();

        tokio::task::spawn_blocking(move || this.lock()?.write_tags(&file, &assignments))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

/// Extract the first `Error:` line from exiftool's stderr, if any.
fn first_error_line(stderr: &[String]) -> Option<String> {
    stderr
        .iter()
        .find(|line| line.contains("Error:"))
        .map(|line| line.trim().to_string())
}

/// Parse exiftool `-j` output into a tag → value map.
///
/// The output is a one-element JSON array even for a single file; a file
/// carrying none of the requested tags yields just its `SourceFile` entry,
/// which maps to an empty result here. Numeric values (signed decimal
/// coordinates under `-n`) are stringified.
fn parse_tag_json(stdout: &[u8]) -> std::result::Result<HashMap<String, String>, String> {
    let value: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|e| format!("invalid JSON from exiftool: {e}"))?;

    let object = value
        .as_array()
        .and_then(|array| array.first())
        .and_then(|entry| entry.as_object())
        .ok_or_else(|| "expected a one-element JSON array from exiftool".to_string())?;

    let mut tags = HashMap::new();
    for (key, value) in object {
        if key == "SourceFile" {
            continue;
        }
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        tags.insert(key.clone(), rendered);
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_tag_json ───────────────────────────────────────────────

    #[test]
    fn parse_tags_with_values() {
        let json = br#"[{
            "SourceFile": "photo.jpg",
            "GPSLatitude": 48.8583,
            "GPSLongitude": -2.2945,
            "Country": "France"
        }]"#;
        let tags = parse_tag_json(json).unwrap();
        assert_eq!(tags.get("GPSLatitude").unwrap(), "48.8583");
        assert_eq!(tags.get("GPSLongitude").unwrap(), "-2.2945");
        assert_eq!(tags.get("Country").unwrap(), "France");
        assert!(!tags.contains_key("SourceFile"));
    }

    #[test]
    fn parse_no_matching_tags_is_empty() {
        let json = br#"[{"SourceFile": "photo.jpg"}]"#;
        let tags = parse_tag_json(json).unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn parse_garbage_is_error() {
        assert!(parse_tag_json(b"not json").is_err());
        assert!(parse_tag_json(b"{}").is_err());
        assert!(parse_tag_json(b"[]").is_err());
    }

    // ── first_error_line ─────────────────────────────────────────────

    #[test]
    fn error_line_detected() {
        let stderr = vec![
            "Warning: Minor issue".to_string(),
            "Error: File not found - missing.jpg".to_string(),
        ];
        assert_eq!(
            first_error_line(&stderr).unwrap(),
            "Error: File not found - missing.jpg"
        );
    }

    #[test]
    fn warnings_alone_are_not_errors() {
        let stderr = vec!["Warning: Minor issue".to_string()];
        assert!(first_error_line(&stderr).is_none());
    }

    #[test]
    fn empty_stderr_has_no_error() {
        assert!(first_error_line(&[]).is_none());
    }

    // ── write directives ─────────────────────────────────────────────

    #[test]
    fn write_directives_prefer_sidecar_without_backups() {
        assert_eq!(WRITE_DIRECTIVES, &["-srcfile", "%d%f.xmp", "-overwrite_original"]);
    }

    // ── shared handle ────────────────────────────────────────────────

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// An inner tool with no synchronization of its own: every call flags
    /// itself as in flight, holds the flag across a sleep, and records
    /// whether another call was already in flight when it entered. Only the
    /// shared handle's mutex stands between concurrent callers and an
    /// observed overlap.
    struct OverlapDetector {
        in_flight: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
    }

    impl OverlapDetector {
        fn enter_and_hold(&self) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(10));
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }

    impl MetadataTool for OverlapDetector {
        fn read_tags(&mut self, _file: &Path, _tags: &[&str]) -> Result<HashMap<String, String>> {
            self.enter_and_hold();
            Ok(HashMap::new())
        }

        fn write_tags(&mut self, _file: &Path, _assignments: &[TagAssignment]) -> Result<()> {
            self.enter_and_hold();
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_handle_serializes_concurrent_round_trips() {
        let overlaps = Arc::new(AtomicUsize::new(0));
        let store = SharedTool::new(OverlapDetector {
            in_flight: Arc::new(AtomicBool::new(false)),
            overlaps: Arc::clone(&overlaps),
        });

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let path = PathBuf::from(format!("photo_{i}.jpg"));
                if i % 2 == 0 {
                    store.read_tags(&path, &["XMP:Country"]).await.unwrap();
                } else {
                    let tag = TagAssignment {
                        tag: crate::mapping::Tag::Country,
                        value: "France".to_string(),
                    };
                    store.write_tags(&path, &[tag]).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            overlaps.load(Ordering::SeqCst),
            0,
            "round-trips overlapped despite sharing one handle"
        );
    }
}
