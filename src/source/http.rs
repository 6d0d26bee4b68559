//! Book endpoints served over HTTP.

use std::time::Duration;

use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};

use super::{BookSource, SourceError, TocResponse, WindowResponse};
use crate::progress::ProgressPayload;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BEACON_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HttpBookSource {
    client: Client,
    beacon_client: Client,
    base_url: String,
    book_id: String,
}

impl HttpBookSource {
    pub fn new(base_url: &str, book_id: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("bookstream")
            .build()?;
        let beacon_client = Client::builder()
            .timeout(BEACON_TIMEOUT)
            .user_agent("bookstream")
            .build()?;

        Ok(Self {
            client,
            beacon_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            book_id: book_id.to_string(),
        })
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/books/{}/{}", self.base_url, self.book_id, tail)
    }

    fn post_progress(&self, client: &Client, payload: &ProgressPayload) -> Result<(), SourceError> {
        let url = self.url("progress");
        let response = client.post(&url).json(payload).send()?;
        check_status(response, &url)?;
        Ok(())
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SourceError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

impl BookSource for HttpBookSource {
    fn book_id(&self) -> &str {
        &self.book_id
    }

    fn fetch_toc(&mut self) -> Result<TocResponse, SourceError> {
        let url = self.url("toc");
        debug!("GET {url}");
        let response = check_status(self.client.get(&url).send()?, &url)?;
        Ok(response.json()?)
    }

    fn fetch_window(&mut self, index: usize, buffer: usize) -> Result<WindowResponse, SourceError> {
        let url = self.url(&format!("chapter/{index}"));
        debug!("GET {url}?buffer={buffer}");
        let response = self
            .client
            .get(&url)
            .query(&[("buffer", buffer)])
            .send()?;
        let response = check_status(response, &url)?;
        Ok(response.json()?)
    }

    fn fetch_progress(&mut self) -> Result<Option<ProgressPayload>, SourceError> {
        let url = self.url("progress");
        let response = self.client.get(&url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = check_status(response, &url)?.text()?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    fn save_progress(&mut self, payload: &ProgressPayload) -> Result<(), SourceError> {
        self.post_progress(&self.client, payload)
    }

    fn send_beacon(&mut self, payload: &ProgressPayload) {
        if let Err(e) = self.post_progress(&self.beacon_client, payload) {
            warn!("Progress beacon for {} failed: {}", self.book_id, e);
        }
    }
}
