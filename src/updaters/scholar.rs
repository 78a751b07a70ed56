//! Google Scholar citation counts, scraped from the public profile page.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::config::{scalar_string, ConfigSlice};
use crate::document::{self, local_today, Clock};
use crate::error::UpdateError;
use crate::http::Fetcher;
use crate::registry::Updater;
use crate::updaters::{settle, shorten};

pub const DEFAULT_BASE_URL: &str = "https://scholar.google.com";
pub const DEFAULT_OUTPUT_FILE: &str = "data/scholar_citations.yml";
const PLACEHOLDER_USER_ID: &str = "YOUR_GOOGLE_SCHOLAR_ID";
/// Largest page the profile view serves.
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 50;

lazy_static! {
  static ref CITATION_FOR_VIEW: Regex = Regex::new(r"citation_for_view=([^&]+)").unwrap();
  static ref PUBLICATION_TABLE: Selector = Selector::parse("#gsc_a_b").unwrap();
  static ref PUBLICATION_ROW: Selector = Selector::parse("tr.gsc_a_tr").unwrap();
  static ref TITLE_LINK: Selector = Selector::parse("a.gsc_a_at").unwrap();
  static ref CITED_BY: Selector = Selector::parse("a.gsc_a_ac").unwrap();
  static ref YEAR: Selector = Selector::parse("span.gsc_a_h").unwrap();
  static ref AUTHOR_NAME: Selector = Selector::parse("#gsc_prf_in").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct ScholarSettings {
  #[serde(deserialize_with = "scalar_string")]
  pub user_id: String,
  #[serde(default = "default_output_file")]
  pub output_file: PathBuf,
}

fn default_output_file() -> PathBuf {
  PathBuf::from(DEFAULT_OUTPUT_FILE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
  pub title: String,
  pub year: String,
  pub citations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationMetadata {
  pub last_updated: NaiveDate,
  pub scholar_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  pub total_citations: u64,
  pub paper_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationDocument {
  pub metadata: CitationMetadata,
  pub papers: BTreeMap<String, Paper>,
}

/// One page of a profile, as parsed from HTML.
#[derive(Debug, Default, PartialEq)]
pub struct ProfilePage {
  pub author: Option<String>,
  /// Rows seen on the page, including ones that had to be dropped.
  pub rows: usize,
  pub papers: Vec<(String, Paper)>,
}

#[derive(Debug, Clone)]
pub struct ScholarUpdater {
  base_url: String,
  clock: Clock,
  retry_delay: Duration,
}

impl Default for ScholarUpdater {
  fn default() -> Self {
    ScholarUpdater {
      base_url: DEFAULT_BASE_URL.to_string(),
      clock: local_today,
      retry_delay: Duration::from_secs(10),
    }
  }
}

impl Updater for ScholarUpdater {
  fn update(&self, slice: &ConfigSlice) -> bool {
    settle("scholar", self.try_update(slice))
  }
}

impl ScholarUpdater {
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
    let settings: ScholarSettings = slice.settings()?;
    if settings.user_id.trim().is_empty() || settings.user_id == PLACEHOLDER_USER_ID {
      return Err(UpdateError::Config(
        "please set your Google Scholar user_id in config.yml".to_string(),
      ));
    }
    let output_file = settings.output_file.as_path();
    let today = (self.clock)();

    if document::is_fresh(output_file, today) {
      info!("Citations already updated today. Skipping.");
      return Ok(false);
    }

    info!("Fetching citations for Google Scholar ID: {}", settings.user_id);
    let pages = self.fetch_profile(&settings.user_id)?;
    let citations = build_document(today, &settings.user_id, pages);
    if citations.papers.is_empty() {
      warn!("No publications found.");
      return Ok(false);
    }

    if let Some(previous) = document::read_existing::<CitationDocument>(output_file) {
      if previous.papers == citations.papers {
        info!("No changes in citation data.");
      }
    }

    document::write(output_file, &citations)?;
    info!("Saved to {}", output_file.display());
    info!(
      "Total: {} citations across {} papers",
      citations.metadata.total_citations, citations.metadata.paper_count
    );
    Ok(true)
  }

  fn fetch_profile(&self, user_id: &str) -> Result<Vec<ProfilePage>, UpdateError> {
    let fetcher = Fetcher::new()?.with_retry_delay(self.retry_delay);
    let mut pages = Vec::new();
    for page_index in 0..MAX_PAGES {
      let url = self.profile_url(user_id, page_index * PAGE_SIZE)?;
      let body = fetcher.get_text(url.as_str(), &[])?;
      let page = parse_profile_page(&body)?;
      debug!("page {} of {} listed {} rows", page_index, user_id, page.rows);
      let last = page.rows < PAGE_SIZE;
      pages.push(page);
      if last {
        break;
      }
    }
    Ok(pages)
  }

  fn profile_url(&self, user_id: &str, cstart: usize) -> Result<Url, UpdateError> {
    let cstart = cstart.to_string();
    let pagesize = PAGE_SIZE.to_string();
    Url::parse_with_params(
      &format!("{}/citations", self.base_url),
      &[
        ("user", user_id),
        ("hl", "en"),
        ("cstart", cstart.as_str()),
        ("pagesize", pagesize.as_str()),
      ],
    )
    .map_err(|e| UpdateError::Config(format!("bad Scholar URL: {}", e)))
  }
}

/// Parse one page of a Scholar profile.
///
/// A page without the publication table is an error: that is what Scholar
/// serves when it decides the client is a bot.
pub fn parse_profile_page(html: &str) -> Result<ProfilePage, UpdateError> {
  let document = Html::parse_document(html);
  let table = document.select(&PUBLICATION_TABLE).next().ok_or_else(|| {
    UpdateError::Parse("no publication table on the profile page (blocked or CAPTCHA?)".to_string())
  })?;

  let author = document
    .select(&AUTHOR_NAME)
    .next()
    .map(element_text)
    .filter(|name| !name.is_empty());

  let mut page = ProfilePage {
    author,
    ..ProfilePage::default()
  };
  for row in table.select(&PUBLICATION_ROW) {
    page.rows += 1;
    match parse_row(row) {
      Some(paper) => page.papers.push(paper),
      None => debug!("skipping publication row without an id: {}", shorten(&element_text(row), 80)),
    }
  }
  Ok(page)
}

fn parse_row(row: ElementRef) -> Option<(String, Paper)> {
  let link = row.select(&TITLE_LINK).next()?;
  let href = link
    .value()
    .attr("data-href")
    .or_else(|| link.value().attr("href"))?;
  let id = paper_id(href)?;

  let title = Some(element_text(link))
    .filter(|title| !title.is_empty())
    .unwrap_or_else(|| "Unknown".to_string());
  let year = row
    .select(&YEAR)
    .next()
    .map(element_text)
    .filter(|year| !year.is_empty())
    .unwrap_or_else(|| "Unknown".to_string());
  let citations = row
    .select(&CITED_BY)
    .next()
    .map(element_text)
    .and_then(|text| {
      let digits: String = text.chars().filter(char::is_ascii_digit).collect();
      digits.parse().ok()
    })
    .unwrap_or(0);

  Some((id, Paper { title, year, citations }))
}

/// `citation_for_view=USER:PAPER` -> `PAPER`.
fn paper_id(href: &str) -> Option<String> {
  let view = CITATION_FOR_VIEW.captures(href)?.get(1)?.as_str();
  let id = view.rsplit(':').next().unwrap_or(view);
  if id.is_empty() {
    None
  } else {
    Some(id.to_string())
  }
}

fn element_text(element: ElementRef) -> String {
  element
    .text()
    .collect::<Vec<_>>()
    .join(" ")
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Fold the fetched pages into the output document. The first row wins when
/// an id shows up twice.
pub fn build_document(today: NaiveDate, user_id: &str, pages: Vec<ProfilePage>) -> CitationDocument {
  let mut author = None;
  let mut papers = BTreeMap::new();
  for page in pages {
    if author.is_none() {
      author = page.author;
    }
    for (id, paper) in page.papers {
      if papers.contains_key(&id) {
        warn!("duplicate publication id {}, keeping the first one", id);
        continue;
      }
      info!("  {} ({}) - {} citations", shorten(&paper.title, 50), paper.year, paper.citations);
      papers.insert(id, paper);
    }
  }

  let total_citations = papers.values().map(|paper| paper.citations).sum();
  CitationDocument {
    metadata: CitationMetadata {
      last_updated: today,
      scholar_id: user_id.to_string(),
      author,
      total_citations,
      paper_count: papers.len(),
    },
    papers,
  }
}
