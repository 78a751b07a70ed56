#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;

use daily_updaters::updaters::youtube::{YoutubeDocument, YoutubeUpdater};
use daily_updaters::{ConfigSlice, Updater};

fn day_one() -> NaiveDate {
  NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn day_two() -> NaiveDate {
  NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

/// A stand-in for yt-dlp that prints `body` and records its arguments.
fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
  let script = dir.join("fake-yt-dlp");
  let args_log = dir.join("args.log");
  fs::write(
    &script,
    format!("#!/bin/sh\necho \"$@\" > '{}'\n{}\n", args_log.display(), body),
  )
  .unwrap();
  fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
  script
}

fn slice(output_file: &Path, ytdlp: &Path) -> ConfigSlice {
  ConfigSlice::new()
    .with("channel", "@vincenttalk")
    .with("output_file", output_file.to_string_lossy().into_owned())
    .with("ytdlp", ytdlp.to_string_lossy().into_owned())
}

// Everything that spawns the fake binary lives in one test so the scripts
// are never written while another test thread is forking.
#[test]
fn runs_ytdlp_and_records_subscribers() {
  let dir = tempfile::tempdir().unwrap();
  let output_file = dir.path().join("data/youtube.yml");
  let ytdlp = fake_ytdlp(
    dir.path(),
    r#"echo 'WARNING: [youtube] throttled'
echo '{"channel": "Vincent Talk", "channel_follower_count": 4321, "channel_id": "UCabc"}'"#,
  );

  assert!(YoutubeUpdater::default().with_clock(day_one).update(&slice(&output_file, &ytdlp)));
  assert!(!YoutubeUpdater::default().with_clock(day_one).update(&slice(&output_file, &ytdlp)));
  assert!(YoutubeUpdater::default().with_clock(day_two).update(&slice(&output_file, &ytdlp)));

  let args = fs::read_to_string(dir.path().join("args.log")).unwrap();
  assert_eq!(
    args.trim(),
    "--dump-json --playlist-items 1 https://www.youtube.com/@vincenttalk/videos"
  );

  let written: YoutubeDocument = serde_yaml::from_str(&fs::read_to_string(&output_file).unwrap()).unwrap();
  assert_eq!(written.metadata.channel, "@vincenttalk");
  assert_eq!(written.metadata.channel_title, "Vincent Talk");
  assert_eq!(written.metadata.channel_id, "UCabc");
  assert_eq!(written.metadata.latest_subscribers, 4321);
  assert_eq!(written.metadata.total_days, 2);
  assert_eq!(written.metadata.last_updated, day_two());

  // no JSON on stdout: skip, keep yesterday's document
  let silent_dir = tempfile::tempdir().unwrap();
  let silent = fake_ytdlp(silent_dir.path(), "echo 'ERROR: channel does not exist' >&2");
  let silent_output = silent_dir.path().join("youtube.yml");
  assert!(!YoutubeUpdater::default().with_clock(day_one).update(&slice(&silent_output, &silent)));
  assert!(!silent_output.exists());

  // hanging binary: killed at the deadline
  let slow_dir = tempfile::tempdir().unwrap();
  let slow = fake_ytdlp(slow_dir.path(), "exec sleep 30");
  let slow_output = slow_dir.path().join("youtube.yml");
  let updater = YoutubeUpdater::default()
    .with_clock(day_one)
    .with_timeout(Duration::from_millis(300));
  assert!(!updater.update(&slice(&slow_output, &slow)));
  assert!(!slow_output.exists());
}
