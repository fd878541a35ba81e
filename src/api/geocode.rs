use log::{debug, warn};
use serde_json::Value;

use crate::{config::Config, error::Result};

use super::{check_status, HttpClient};

/// Reverse geocoding against a Nominatim compatible service.
#[derive(Debug, Clone)]
pub struct Geocoder {
    client: HttpClient,
    reverse_url: String,
}

impl Geocoder {
    pub fn new(config: &Config) -> Self {
        Self::with_client(HttpClient::new(config), config.geocoder())
    }

    pub fn with_client(client: HttpClient, base_url: &str) -> Self {
        let reverse_url = format!("{}/reverse", base_url.trim_end_matches('/'));
        Self {
            client,
            reverse_url,
        }
    }

    /// Best effort, any failure is logged and yields `None`.
    pub async fn postcode(&self, lat: f64, lon: f64) -> Option<String> {
        match self.lookup(lat, lon).await {
            Ok(postcode) => postcode,
            Err(e) => {
                warn!("Reverse geocoding ({}, {}) failed: {}", lat, lon, e);
                None
            }
        }
    }

    async fn lookup(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        let request = self.client.get(&self.reverse_url).query(&[
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("zoom", "17".to_string()),
            ("format", "json".to_string()),
        ]);
        let response = check_status(self.client.send(request).await?)?;
        let body: Value = response.json().await?;

        let postcode = postcode_of(&body);
        debug!("({}, {}) -> {:?}", lat, lon, postcode);
        Ok(postcode)
    }
}

fn postcode_of(body: &Value) -> Option<String> {
    body.get("address")?
        .get("postcode")?
        .as_str()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_postcode_from_address() {
        let body = json!({
            "display_name": "Rua do Almada, Porto",
            "address": { "road": "Rua do Almada", "postcode": "4050-032" }
        });
        assert_eq!(postcode_of(&body), Some("4050-032".to_string()));
    }

    #[test]
    fn missing_postcode_is_none() {
        assert_eq!(postcode_of(&json!({ "address": { "road": "x" } })), None);
        assert_eq!(postcode_of(&json!({ "address": { "postcode": " " } })), None);
        assert_eq!(postcode_of(&json!({ "error": "Unable to geocode" })), None);
    }

    #[test]
    fn reverse_url() {
        let geocoder = Geocoder::with_client(
            HttpClient::with_limits(1, 0),
            "https://nominatim.openstreetmap.org/",
        );
        assert_eq!(geocoder.reverse_url, "https://nominatim.openstreetmap.org/reverse");
    }
}
