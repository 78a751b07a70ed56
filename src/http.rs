use std::thread;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;

use crate::error::UpdateError;

pub const USER_AGENT: &str =
  "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A blocking HTTP client with a bounded timeout and a small retry budget,
/// shared by the updaters that talk to web sources.
#[derive(Debug, Clone)]
pub struct Fetcher {
  client: Client,
  attempts: usize,
  retry_delay: Duration,
}

impl Fetcher {
  pub fn new() -> Result<Fetcher, UpdateError> {
    let client = Client::builder()
      .user_agent(USER_AGENT)
      .timeout(REQUEST_TIMEOUT)
      .build()?;
    Ok(Fetcher {
      client,
      attempts: 3,
      retry_delay: Duration::from_secs(10),
    })
  }

  pub fn with_attempts(mut self, attempts: usize) -> Self {
    self.attempts = attempts.max(1);
    self
  }

  pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
    self.retry_delay = retry_delay;
    self
  }

  /// GET `url` and return the body.
  ///
  /// Transport errors and 5xx answers are retried; any other non-200 status
  /// fails straight away.
  pub fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, UpdateError> {
    let mut last_error = None;
    for attempt in 1..=self.attempts {
      if attempt > 1 {
        thread::sleep(self.retry_delay);
      }
      debug!("GET {} (attempt {}/{})", url, attempt, self.attempts);
      let request = with_headers(self.client.get(url), headers);
      match request.send() {
        Ok(response) => {
          let status = response.status();
          if status == StatusCode::OK {
            return Ok(response.text()?);
          }
          let error = UpdateError::Source(format!("{} answered with HTTP {}", url, status.as_u16()));
          if !status.is_server_error() {
            return Err(error);
          }
          warn!("-- {} answered with HTTP {}, retrying", url, status.as_u16());
          last_error = Some(error);
        }
        Err(e) => {
          warn!("-- request to {} failed: {}", url, e);
          last_error = Some(UpdateError::Http(e));
        }
      }
    }
    Err(last_error.unwrap_or_else(|| UpdateError::Source(format!("no attempt made for {}", url))))
  }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
  for (name, value) in headers {
    request = request.header(*name, *value);
  }
  request
}
