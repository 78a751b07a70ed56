//! Bilibili follower statistics from the public web API, kept as a daily
//! history.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{scalar_string, ConfigSlice};
use crate::document::{self, local_today, Clock};
use crate::error::UpdateError;
use crate::http::Fetcher;
use crate::registry::Updater;
use crate::updaters::settle;

pub const DEFAULT_BASE_URL: &str = "https://api.bilibili.com";
pub const DEFAULT_OUTPUT_FILE: &str = "data/bilibili_stats.yml";
const REFERER: &str = "https://space.bilibili.com/";

#[derive(Debug, Deserialize)]
pub struct BilibiliSettings {
  #[serde(deserialize_with = "scalar_string")]
  pub mid: String,
  #[serde(default = "default_output_file")]
  pub output_file: PathBuf,
}

fn default_output_file() -> PathBuf {
  PathBuf::from(DEFAULT_OUTPUT_FILE)
}

/// Envelope every Bilibili endpoint answers with; `code` 0 means success.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
  code: i64,
  #[serde(default)]
  message: String,
  data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct RelationStat {
  #[serde(default)]
  follower: u64,
  #[serde(default)]
  following: u64,
}

#[derive(Debug, Default, Deserialize)]
struct CardData {
  card: Option<Card>,
}

#[derive(Debug, Default, Deserialize)]
struct Card {
  name: Option<String>,
  #[serde(default)]
  level_info: LevelInfo,
}

#[derive(Debug, Default, Deserialize)]
struct LevelInfo {
  #[serde(default)]
  current_level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
  pub username: String,
  pub followers: u64,
  pub following: u64,
  pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
  pub followers: u64,
  pub following: u64,
  pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BilibiliMetadata {
  pub last_updated: NaiveDate,
  pub mid: String,
  pub username: String,
  pub space_url: String,
  pub total_days: usize,
  pub latest_followers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BilibiliDocument {
  pub metadata: BilibiliMetadata,
  pub history: BTreeMap<NaiveDate, DailyStats>,
}

#[derive(Debug, Clone)]
pub struct BilibiliUpdater {
  base_url: String,
  clock: Clock,
  retry_delay: Duration,
}

impl Default for BilibiliUpdater {
  fn default() -> Self {
    BilibiliUpdater {
      base_url: DEFAULT_BASE_URL.to_string(),
      clock: local_today,
      retry_delay: Duration::from_secs(10),
    }
  }
}

impl Updater for BilibiliUpdater {
  fn update(&self, slice: &ConfigSlice) -> bool {
    settle("bilibili", self.try_update(slice))
  }
}

impl BilibiliUpdater {
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into().trim_end_matches('/').to_string();
    self
  }

  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
    self.retry_delay = retry_delay;
    self
  }

  fn try_update(&self, slice: &ConfigSlice) -> Result<bool, UpdateError> {
    let settings: BilibiliSettings = slice.settings()?;
    if settings.mid.trim().is_empty() {
      return Err(UpdateError::Config(
        "please set 'mid' (Bilibili user ID) in config.yml".to_string(),
      ));
    }
    let output_file = settings.output_file.as_path();
    let today = (self.clock)();

    if document::is_fresh(output_file, today) {
      info!("Bilibili stats already updated today. Skipping.");
      return Ok(false);
    }

    info!("Fetching Bilibili stats for user ID: {}", settings.mid);
    let stats = self.fetch_stats(&settings.mid)?;
    info!("  Username: {}", stats.username);
    info!("  Followers: {}", stats.followers);
    info!("  Following: {}", stats.following);
    info!("  Level: {}", stats.level);

    let history = document::read_existing::<BilibiliDocument>(output_file)
      .map(|previous| previous.history)
      .unwrap_or_default();
    let stats_document = build_document(today, &settings.mid, &stats, history);

    document::write(output_file, &stats_document)?;
    info!("Saved to {}", output_file.display());
    Ok(true)
  }

  pub fn fetch_stats(&self, mid: &str) -> Result<UserStats, UpdateError> {
    let fetcher = Fetcher::new()?.with_retry_delay(self.retry_delay);

    let stat_url = format!("{}/x/relation/stat?vmid={}", self.base_url, mid);
    let stat: ApiResponse<RelationStat> = get_json(&fetcher, &stat_url)?;
    if stat.code != 0 {
      return Err(UpdateError::Source(format!(
        "stat API answered code {}: {}",
        stat.code, stat.message
      )));
    }
    let stat = stat.data.unwrap_or_default();

    // The card only supplies the name and level; a bad answer there is not
    // worth losing the follower count over.
    let card_url = format!("{}/x/web-interface/card?mid={}", self.base_url, mid);
    let card = match get_json::<ApiResponse<CardData>>(&fetcher, &card_url) {
      Ok(card) if card.code == 0 => card.data.and_then(|data| data.card).unwrap_or_default(),
      Ok(card) => {
        warn!("card API answered code {}: {}", card.code, card.message);
        Card::default()
      }
      Err(e) => {
        warn!("could not fetch user card: {}", e);
        Card::default()
      }
    };

    Ok(UserStats {
      username: card.name.unwrap_or_else(|| "Unknown".to_string()),
      followers: stat.follower,
      following: stat.following,
      level: card.level_info.current_level,
    })
  }
}

fn get_json<T: DeserializeOwned>(fetcher: &Fetcher, url: &str) -> Result<T, UpdateError> {
  let body = fetcher.get_text(url, &[("Referer", REFERER)])?;
  Ok(serde_json::from_str(&body)?)
}

/// Record today's stats on top of the previous history. The whole document
/// is rebuilt; only the history entries are carried over.
pub fn build_document(
  today: NaiveDate,
  mid: &str,
  stats: &UserStats,
  mut history: BTreeMap<NaiveDate, DailyStats>,
) -> BilibiliDocument {
  history.insert(
    today,
    DailyStats {
      followers: stats.followers,
      following: stats.following,
      level: stats.level,
    },
  );
  BilibiliDocument {
    metadata: BilibiliMetadata {
      last_updated: today,
      mid: mid.to_string(),
      username: stats.username.clone(),
      space_url: format!("{}{}", REFERER, mid),
      total_days: history.len(),
      latest_followers: stats.followers,
    },
    history,
  }
}
