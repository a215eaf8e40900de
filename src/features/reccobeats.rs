use reqwest::blocking::Client;
use serde::Deserialize;

use super::{AudioFeatureRecord, FeatureStore, LookupError};

/// Looks up audio features through the ReccoBeats `audio-features` endpoint.
pub struct ReccoBeatsStore {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct AudioFeaturesPage {
    #[serde(default)]
    content: Vec<AudioFeatureRecord>,
}

impl ReccoBeatsStore {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio-features", self.base_url)
    }
}

impl FeatureStore for ReccoBeatsStore {
    fn lookup(&self, id: &str) -> Result<AudioFeatureRecord, LookupError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("ids", id)])
            .send()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Unavailable(format!("HTTP {status} for '{id}'")));
        }

        let body = response
            .text()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;
        parse_response(&body, id)
    }
}

/// First record of the page, as the API returns results in request order.
fn parse_response(body: &str, id: &str) -> Result<AudioFeatureRecord, LookupError> {
    let page: AudioFeaturesPage = serde_json::from_str(body)
        .map_err(|e| LookupError::Unavailable(format!("malformed response for '{id}': {e}")))?;
    page.content
        .into_iter()
        .next()
        .ok_or_else(|| LookupError::NotFound(id.to_string()))
}
