//! ``src/tasks/preview_task.rs``
//! ============================================================================
//! # Preview Task: external previewer runs and the preview worker loop
//!
//! The worker owns the request queue. Each wake-up drains it down to the most
//! recent request so only the latest path is previewed. A previewer that exits
//! non-zero makes its output volatile; the cleaner runs once for it before a
//! different preview is shown or the preview is cleared. Volatile directory
//! previews come from the scanner and are handed over with `Track`.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::SystemTime,
};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug, info, info_span};

use crate::error::{AppError, AppResult};

/// Shown in place of content that contains a NUL byte.
pub const BINARY_MARKER: &str = "\x1b[7mbinary\x1b[0m";

/// Geometry of the preview pane, passed to the previewer and cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewWindow {
    pub width: u16,
    pub height: u16,
    pub x: u16,
    pub y: u16,
}

impl PreviewWindow {
    fn args(&self) -> [String; 4] {
        [
            self.width.to_string(),
            self.height.to_string(),
            self.x.to_string(),
            self.y.to_string(),
        ]
    }
}

/// Selection context exported to previewer and cleaner processes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreviewEnv {
    pub file: Option<PathBuf>,
    pub selections: Vec<PathBuf>,
    pub dir: PathBuf,
    pub filesep: String,
}

impl PreviewEnv {
    fn apply(&self, cmd: &mut Command) {
        let file: String = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let selections: String = self
            .selections
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<String>>()
            .join(&self.filesep);
        let either: &str = if self.selections.is_empty() {
            &file
        } else {
            &selections
        };

        cmd.env("f", &file)
            .env("fs", &selections)
            .env("fx", either)
            .env("PWD", &self.dir);

        if self.dir.is_dir() {
            cmd.current_dir(&self.dir);
        }
    }
}

/// Cached preview of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub path: PathBuf,
    pub loading: bool,
    pub volatile: bool,
    pub load_time: SystemTime,
    pub lines: Vec<String>,
}

impl Preview {
    /// Cache slot for a queued request. Volatile until the result says otherwise.
    pub fn placeholder(path: PathBuf) -> Self {
        Self {
            path,
            loading: true,
            volatile: true,
            load_time: SystemTime::now(),
            lines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PreviewRequest {
    Show {
        path: PathBuf,
        window: PreviewWindow,
        env: PreviewEnv,
    },
    Clear {
        window: PreviewWindow,
        env: PreviewEnv,
    },
    /// A volatile preview of `path` made elsewhere (a directory preview) is
    /// on screen and needs cleaning like one the worker produced.
    Track {
        path: PathBuf,
        window: PreviewWindow,
        env: PreviewEnv,
    },
}

/// Output of one previewer run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreviewOutput {
    pub lines: Vec<String>,
    pub volatile: bool,
}

/// Keep at most `max` lines; any NUL byte turns the result into the binary marker.
pub async fn read_preview_lines<R>(reader: R, max: usize) -> Vec<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines: Vec<String> = Vec::new();
    let mut buf: Vec<u8> = Vec::new();
    let mut reader: R = reader;

    while lines.len() < max {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                info!("loading preview: {}", e);
                break;
            }
        }

        if buf.contains(&0) {
            return vec![BINARY_MARKER.to_string()];
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }

    lines
}

/// Run `previewer target w h x y` and keep the first `window.height` lines.
pub async fn run_previewer(
    previewer: &Path,
    target: &Path,
    window: PreviewWindow,
    env: &PreviewEnv,
) -> AppResult<PreviewOutput> {
    let mut cmd: Command = Command::new(previewer);
    cmd.arg(target)
        .args(window.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    env.apply(&mut cmd);

    let mut child: Child = cmd.spawn().map_err(|e| AppError::ExternalCmd {
        cmd: previewer.display().to_string(),
        code: None,
        stderr: e.to_string(),
    })?;

    let lines: Vec<String> = match child.stdout.take() {
        Some(stdout) => {
            let reader: BufReader<ChildStdout> = BufReader::new(stdout);
            // dropping the reader closes the pipe before we wait
            read_preview_lines(reader, usize::from(window.height)).await
        }
        None => Vec::new(),
    };

    let volatile: bool = match child.wait().await {
        Ok(status) => !status.success(),
        Err(e) => {
            info!("waiting for previewer: {}", e);
            false
        }
    };

    Ok(PreviewOutput { lines, volatile })
}

/// Run `cleaner prev w h x y`; failures are only logged.
pub async fn run_cleaner(cleaner: &Path, prev: &Path, window: PreviewWindow, env: &PreviewEnv) {
    let mut cmd: Command = Command::new(cleaner);
    cmd.arg(prev)
        .args(window.args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    env.apply(&mut cmd);

    match cmd.status().await {
        Ok(status) if status.success() => {}
        Ok(status) => info!("cleaning preview: exit status {}", status),
        Err(e) => info!("cleaning preview: {}", e),
    }
}

/// Build the preview of `path`, through the previewer when one is configured.
pub async fn load_preview(
    path: &Path,
    window: PreviewWindow,
    env: &PreviewEnv,
    previewer: Option<&Path>,
) -> Preview {
    let mut preview: Preview = Preview {
        path: path.to_path_buf(),
        loading: false,
        volatile: false,
        load_time: SystemTime::now(),
        lines: Vec::new(),
    };

    match previewer {
        Some(previewer) => match run_previewer(previewer, path, window, env).await {
            Ok(out) => {
                preview.lines = out.lines;
                preview.volatile = out.volatile;
            }
            Err(e) => info!("previewing file: {}", e),
        },
        None => match tokio::fs::File::open(path).await {
            Ok(file) => {
                preview.lines = read_preview_lines(BufReader::new(file), usize::from(window.height)).await;
            }
            Err(e) => info!("opening file: {}", e),
        },
    }

    preview
}

/// Run the cleaner on `prev`. Nothing runs unless both a cleaner and a
/// previewer are configured.
async fn clean(
    cleaner: Option<&Path>,
    has_previewer: bool,
    prev: Option<&Path>,
    window: PreviewWindow,
    env: &PreviewEnv,
) {
    let (Some(cleaner), Some(prev), true) = (cleaner, prev, has_previewer) else {
        return;
    };

    debug!(
        marker = "PREVIEW_CLEAN",
        operation_type = "preview_clean",
        path = %prev.display(),
        "Cleaning volatile preview"
    );
    run_cleaner(cleaner, prev, window, env).await;
}

/// Spawn the preview worker. It exits when the request channel closes.
pub fn spawn_preview_worker(
    mut requests: UnboundedReceiver<PreviewRequest>,
    results: UnboundedSender<Preview>,
    previewer: Option<PathBuf>,
    cleaner: Option<PathBuf>,
) {
    tokio::spawn(
        async move {
            let mut prev: Option<PathBuf> = None;
            let mut volatile: bool = false;

            while let Some(first) = requests.recv().await {
                let mut latest: Option<(Option<PathBuf>, PreviewWindow, PreviewEnv)> = None;
                let mut clear: bool = false;

                // supersession: only the latest queued show or clear is served
                let queued = std::iter::once(first)
                    .chain(std::iter::from_fn(|| requests.try_recv().ok()));
                for request in queued {
                    match request {
                        PreviewRequest::Track { path, window, env } => {
                            if volatile && prev.as_ref() != Some(&path) {
                                let (cleaner, prev) = (cleaner.as_deref(), prev.as_deref());
                                clean(cleaner, previewer.is_some(), prev, window, &env).await;
                            }
                            prev = Some(path);
                            volatile = true;

                            // the pane moved on past anything queued before
                            latest = None;
                            clear = false;
                        }
                        PreviewRequest::Show { path, window, env } => {
                            latest = Some((Some(path), window, env));
                        }
                        PreviewRequest::Clear { window, env } => {
                            clear = true;
                            latest = Some((None, window, env));
                        }
                    }
                }

                let Some((path, window, env)) = latest else {
                    continue;
                };

                let switching: bool = path.is_some() && path != prev;
                if (clear || switching) && volatile {
                    let (cleaner, prev) = (cleaner.as_deref(), prev.as_deref());
                    clean(cleaner, previewer.is_some(), prev, window, &env).await;
                    volatile = false;
                }

                if let Some(path) = path {
                    let preview: Preview =
                        load_preview(&path, window, &env, previewer.as_deref()).await;
                    volatile = preview.volatile;
                    prev = Some(path);

                    if results.send(preview).is_err() {
                        break;
                    }
                }
            }
        }
        .instrument(info_span!("preview_worker", operation_type = "preview")),
    );
}
