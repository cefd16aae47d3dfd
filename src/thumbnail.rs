#![forbid(unsafe_code)]

//! Cache-forever thumbnail store.
//!
//! One JPEG per video, named after a hash of the video identifier. A file on
//! disk is the only record of a cache hit: there is no index, no expiry and
//! no invalidation. Misses grab a single frame from the remote media through
//! a [`FrameExtractor`] and persist it atomically.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use parking_lot::{Condvar, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientSettings;
use crate::error::{Result, SyncError};

/// Position of the representative frame inside the stream.
pub const FRAME_OFFSET: Duration = Duration::from_secs(1);
pub const JPEG_QUALITY: u8 = 90;
const FILE_PREFIX: &str = "thumbnail_";
const FILE_EXTENSION: &str = "jpg";
const KEY_LEN: usize = 32;
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Pulls one still frame out of a remote media source.
pub trait FrameExtractor: Send + Sync {
    /// Returns the frame at the closest sync point at or before `offset`.
    fn extract_frame(&self, source_url: &str, offset: Duration) -> anyhow::Result<DynamicImage>;
}

/// Extracts frames by piping a single PNG out of `ffmpeg`.
///
/// `-ss` is placed before `-i` with accurate seeking disabled, so ffmpeg
/// jumps to the keyframe preceding the offset and emits that frame instead of
/// decoding forward to the exact timestamp.
///
/// With a timeout set, stalled reads abort through `-rw_timeout` and the
/// process is killed once the deadline passes.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    bin: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegFrameExtractor {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, source_url: &str, offset: Duration) -> Command {
        let mut command = Command::new(&self.bin);
        command
            .arg("-nostdin")
            .args(["-v", "error"])
            .arg("-noaccurate_seek");
        if let Some(timeout) = self.timeout {
            command.arg("-rw_timeout").arg(timeout.as_micros().to_string());
        }
        command
            .arg("-ss")
            .arg(format!("{:.3}", offset.as_secs_f64()))
            .arg("-i")
            .arg(source_url)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn wait(&self, child: &mut Child) -> anyhow::Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child.wait().context("waiting for ffmpeg");
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().context("waiting for ffmpeg")? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(timeout_secs = timeout.as_secs_f64(), "ffmpeg timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                bail!("ffmpeg timed out after {:.1}s", timeout.as_secs_f64());
            }
            thread::sleep(WAIT_POLL);
        }
    }
}

/// Drains a child pipe on its own thread so a full pipe never stalls ffmpeg.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl FrameExtractor for FfmpegFrameExtractor {
    #[instrument(name = "ffmpeg", skip(self))]
    fn extract_frame(&self, source_url: &str, offset: Duration) -> anyhow::Result<DynamicImage> {
        let mut command = self.command(source_url, offset);
        debug!(?command, "invoking ffmpeg");
        let mut child = command
            .spawn()
            .with_context(|| format!("calling {}", self.bin.display()))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        // On timeout the readers are left behind; they end with the pipes.
        let status = self.wait(&mut child)?;
        let stdout = stdout
            .join()
            .map_err(|_| anyhow!("ffmpeg stdout reader panicked"))?;
        if !status.success() {
            let stderr = stderr.join().unwrap_or_default();
            bail!(
                "ffmpeg exited with {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            );
        }
        if stdout.is_empty() {
            bail!("ffmpeg produced no frame");
        }
        image::load_from_memory_with_format(&stdout, ImageFormat::Png)
            .context("decoding extracted frame")
    }
}

/// Derives the cache key for a video identifier.
///
/// Pure function of the identifier: the same id maps to the same file in
/// every process.
pub fn cache_key(video_id: &str) -> String {
    let hash = blake3::hash(video_id.as_bytes());
    hash.to_hex().as_str()[..KEY_LEN].to_string()
}

/// Outcome of one generation, shared with every caller that joined it.
#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<std::result::Result<PathBuf, String>>>,
    done: Condvar,
}

impl Flight {
    /// First outcome wins; later calls only wake waiters.
    fn complete(&self, outcome: std::result::Result<PathBuf, String>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> std::result::Result<PathBuf, String> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

/// Held by the caller running a generation. Dropping it (also while
/// unwinding) settles the flight and removes it from the table.
struct FlightGuard<'a> {
    table: &'a Mutex<HashMap<String, Arc<Flight>>>,
    key: String,
    flight: Arc<Flight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight
            .complete(Err("thumbnail generation aborted".to_string()));
        let mut table = self.table.lock();
        if table
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            table.remove(&self.key);
        }
    }
}

/// On-disk thumbnail cache with per-key single-flight generation.
pub struct ThumbnailCache {
    dir: PathBuf,
    extractor: Arc<dyn FrameExtractor>,
    in_flight: Mutex<HashMap<String, Arc<Flight>>>,
}

impl ThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>, extractor: Arc<dyn FrameExtractor>) -> Self {
        Self {
            dir: dir.into(),
            extractor,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Cache in `settings.cache_dir` backed by the configured ffmpeg binary.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            settings.cache_dir.clone(),
            Arc::new(
                FfmpegFrameExtractor::new(settings.ffmpeg_bin.clone())
                    .with_timeout(settings.request_timeout),
            ),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the thumbnail for `video_id` lives (or would live).
    pub fn path_for(&self, video_id: &str) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}.{FILE_EXTENSION}", cache_key(video_id)))
    }

    /// Hit-only lookup; never generates.
    pub fn lookup(&self, video_id: &str) -> Option<PathBuf> {
        let path = self.path_for(video_id);
        path.is_file().then_some(path)
    }

    /// Returns the cached thumbnail, generating it on a miss.
    ///
    /// Generation failures are logged and reported as `None`; callers carry
    /// on without a thumbnail.
    pub fn get_or_create(&self, video_id: &str, source_url: &str) -> Option<PathBuf> {
        match self.try_get_or_create(video_id, source_url) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(video_id, error = %err, "thumbnail unavailable");
                None
            }
        }
    }

    /// Same as [`get_or_create`](Self::get_or_create) but surfaces the
    /// [`SyncError::Thumbnail`] instead of swallowing it.
    pub fn try_get_or_create(&self, video_id: &str, source_url: &str) -> Result<PathBuf> {
        if let Some(path) = self.lookup(video_id) {
            debug!(video_id, "thumbnail cache hit");
            return Ok(path);
        }

        let key = cache_key(video_id);
        let (flight, leader) = self.join_flight(&key);
        if !leader {
            debug!(video_id, "waiting on in-flight thumbnail");
            return flight
                .wait()
                .map_err(|message| SyncError::thumbnail(video_id, message));
        }

        let guard = FlightGuard {
            table: &self.in_flight,
            key,
            flight,
        };
        // A previous flight may have produced the file since the first lookup.
        let outcome = match self.lookup(video_id) {
            Some(path) => Ok(path),
            None => self
                .generate(video_id, source_url)
                .map_err(|err| format!("{err:#}")),
        };
        guard.flight.complete(outcome.clone());
        drop(guard);
        outcome.map_err(|message| SyncError::thumbnail(video_id, message))
    }

    /// Returns the flight for `key` and whether this caller has to run it.
    fn join_flight(&self, key: &str) -> (Arc<Flight>, bool) {
        let mut table = self.in_flight.lock();
        if let Some(flight) = table.get(key) {
            return (flight.clone(), false);
        }
        let flight = Arc::new(Flight::default());
        table.insert(key.to_string(), flight.clone());
        (flight, true)
    }

    #[instrument(skip(self))]
    fn generate(&self, video_id: &str, source_url: &str) -> anyhow::Result<PathBuf> {
        let frame = self.extractor.extract_frame(source_url, FRAME_OFFSET)?;
        let path = self.path_for(video_id);
        self.persist(&frame, &path)?;
        info!(video_id, path = %path.display(), "thumbnail cached");
        Ok(path)
    }

    fn persist(&self, frame: &DynamicImage, path: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            frame
                .to_rgb8()
                .write_with_encoder(encoder)
                .context("encoding jpeg")?;
            writer.flush().context("flushing jpeg")?;
        }
        tmp.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("persisting {}", path.display()))?;
        Ok(())
    }
}
