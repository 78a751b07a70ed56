//! YouTube subscriber counts, read from `yt-dlp --dump-json` output so no
//! API key is needed.
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;

use crate::config::{scalar_string, ConfigSlice};
use crate::document::{self, local_today, Clock};
use crate::error::UpdateError;
use crate::registry::Updater;
use crate::updaters::{settle, shorten};

pub const DEFAULT_OUTPUT_FILE: &str = "data/youtube_subscribers.yml";
pub const DEFAULT_YTDLP: &str = "yt-dlp";
const YTDLP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
pub struct YoutubeSettings {
  /// A handle (`@name`), a bare name, or a full channel URL.
  #[serde(deserialize_with = "scalar_string")]
  pub channel: String,
  #[serde(default = "default_output_file")]
  pub output_file: PathBuf,
  #[serde(default = "default_ytdlp")]
  pub ytdlp: PathBuf,
}

fn default_output_file() -> PathBuf {
  PathBuf::from(DEFAULT_OUTPUT_FILE)
}

fn default_ytdlp() -> PathBuf {
  PathBuf::from(DEFAULT_YTDLP)
}

/// The fields we need out of one `--dump-json` line.
#[derive(Debug, Deserialize)]
struct VideoInfo {
  channel: Option<String>,
  uploader: Option<String>,
  channel_follower_count: Option<u64>,
  channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
  pub channel_title: String,
  pub subscribers: u64,
  pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySubscribers {
  pub subscribers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeMetadata {
  pub last_updated: NaiveDate,
  pub channel: String,
  pub channel_url: String,
  pub channel_title: String,
  pub channel_id: String,
  pub total_days: usize,
  pub latest_subscribers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeDocument {
  pub metadata: YoutubeMetadata,
  pub history: BTreeMap<NaiveDate, DailySubscribers>,
}

#[derive(Debug, Clone)]
pub struct YoutubeUpdater {
  clock: Clock,
  timeout: Duration,
}

impl Default for YoutubeUpdater {
  fn default() -> Self {
    YoutubeUpdater {
      clock: local_today,
      timeout: YTDLP_TIMEOUT,
    }
  }
}

impl Updater for YoutubeUpdater {
  fn update(&self, slice: &ConfigSlice) -> bool {
    settle("youtube", self.try_update(slice))
  }
}

impl YoutubeUpdater {
  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  fn try_update(&self, slice: &ConfigSlice) -> Result<bool, UpdateError> {
    let settings: YoutubeSettings = slice.settings()?;
    if settings.channel.trim().is_empty() {
      return Err(UpdateError::Config(
        "please set 'channel' (a handle like @vincenttalk) in config.yml".to_string(),
      ));
    }
    let output_file = settings.output_file.as_path();
    let today = (self.clock)();

    if document::is_fresh(output_file, today) {
      info!("YouTube subscribers already updated today. Skipping.");
      return Ok(false);
    }

    let url = channel_url(&settings.channel);
    info!("Fetching stats from: {}", url);
    let stats = self.fetch_stats(&settings.ytdlp, &url)?;
    info!("  Channel: {}", stats.channel_title);
    info!("  Subscribers: {}", stats.subscribers);

    let history = document::read_existing::<YoutubeDocument>(output_file)
      .map(|previous| previous.history)
      .unwrap_or_default();
    let subscribers_document = build_document(today, &settings.channel, &url, &stats, history);

    document::write(output_file, &subscribers_document)?;
    info!("Saved to {}", output_file.display());
    Ok(true)
  }

  /// Run yt-dlp against the channel's video list and read the channel
  /// fields off the first video.
  pub fn fetch_stats(&self, ytdlp: &Path, url: &str) -> Result<ChannelStats, UpdateError> {
    let child = Command::new(ytdlp)
      .args(["--dump-json", "--playlist-items", "1"])
      .arg(format!("{}/videos", url))
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| match e.kind() {
        ErrorKind::NotFound => UpdateError::Command(format!(
          "{} not found, install it with `pip install yt-dlp`",
          ytdlp.display()
        )),
        _ => UpdateError::Command(format!("could not start {}: {}", ytdlp.display(), e)),
      })?;

    let (stdout, stderr) = wait_with_deadline(child, self.timeout)?;
    if let Some(stats) = parse_dump_json(&stdout) {
      return Ok(stats);
    }
    if !stderr.trim().is_empty() {
      warn!("yt-dlp warnings: {}", shorten(stderr.trim(), 500));
    }
    Err(UpdateError::Source("yt-dlp printed no channel metadata".to_string()))
  }
}

/// Wait for `child`, killing it once `timeout` has passed. Output is drained
/// on separate threads so a chatty child cannot fill the pipe and stall.
fn wait_with_deadline(mut child: Child, timeout: Duration) -> Result<(String, String), UpdateError> {
  let stdout_reader = child.stdout.take().map(spawn_reader);
  let stderr_reader = child.stderr.take().map(spawn_reader);

  let finished = match child.wait_timeout(timeout) {
    Ok(status) => status.is_some(),
    Err(e) => {
      reap(&mut child);
      return Err(e.into());
    }
  };
  if !finished {
    reap(&mut child);
    return Err(UpdateError::Command(format!(
      "yt-dlp did not finish within {}s",
      timeout.as_secs()
    )));
  }

  let collect = |reader: Option<thread::JoinHandle<String>>| {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
  };
  Ok((collect(stdout_reader), collect(stderr_reader)))
}

fn reap(child: &mut Child) {
  if let Err(e) = child.kill() {
    warn!("could not kill yt-dlp (pid {}): {}", child.id(), e);
  }
  if let Err(e) = child.wait() {
    warn!("could not reap yt-dlp (pid {}): {}", child.id(), e);
  }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
  thread::spawn(move || {
    let mut bytes = Vec::new();
    let _ = pipe.read_to_end(&mut bytes);
    String::from_utf8_lossy(&bytes).into_owned()
  })
}

/// The first stdout line that is a JSON object; warnings and other noise
/// are skipped.
pub fn parse_dump_json(stdout: &str) -> Option<ChannelStats> {
  stdout
    .lines()
    .map(str::trim)
    .filter(|line| line.starts_with('{'))
    .find_map(|line| serde_json::from_str::<VideoInfo>(line).ok())
    .map(|info| ChannelStats {
      channel_title: info
        .channel
        .or(info.uploader)
        .unwrap_or_else(|| "Unknown".to_string()),
      subscribers: info.channel_follower_count.unwrap_or(0),
      channel_id: info.channel_id.unwrap_or_default(),
    })
}

pub fn channel_url(channel: &str) -> String {
  let channel = channel.trim();
  if channel.starts_with("http") {
    channel.trim_end_matches('/').to_string()
  } else if channel.starts_with('@') {
    format!("https://www.youtube.com/{}", channel)
  } else {
    format!("https://www.youtube.com/@{}", channel)
  }
}

pub fn build_document(
  today: NaiveDate,
  channel: &str,
  url: &str,
  stats: &ChannelStats,
  mut history: BTreeMap<NaiveDate, DailySubscribers>,
) -> YoutubeDocument {
  history.insert(
    today,
    DailySubscribers {
      subscribers: stats.subscribers,
    },
  );
  YoutubeDocument {
    metadata: YoutubeMetadata {
      last_updated: today,
      channel: channel.to_string(),
      channel_url: url.to_string(),
      channel_title: stats.channel_title.clone(),
      channel_id: stats.channel_id.clone(),
      total_days: history.len(),
      latest_subscribers: stats.subscribers,
    },
    history,
  }
}
