/*
 * This file is part of Terrarium.
 *
 * Copyright (C) 2025 Terrarium contributors
 *
 * Terrarium is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Terrarium is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Terrarium. If not, see <https://www.gnu.org/licenses/>.
 */

//! ThingSpeak-compatible HTTP backend

use std::future::Future;

use reqwest::Client;
use tracing::debug;

use tr_error::{Result, TerrariumError};
use tr_protocol::{parse_settings_feed, Settings, TelemetryRecord};

use super::TelemetryBackend;
use crate::config::TelemetryConfig;

#[derive(Debug, Clone)]
pub struct ThingSpeakClient {
    http: Client,
    base_url: String,
    write_api_key: Option<String>,
    settings_channel_id: Option<String>,
    read_api_key: Option<String>,
}

impl ThingSpeakClient {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TerrariumError::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            write_api_key: config.write_api_key.clone(),
            settings_channel_id: config.settings_channel_id.clone(),
            read_api_key: config.read_api_key.clone(),
        })
    }

    pub fn update_url(&self) -> String {
        format!("{}/update", self.base_url)
    }

    pub fn last_entry_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/feeds/last.json", self.base_url, channel_id)
    }

    async fn upload_record(&self, record: TelemetryRecord) -> Result<String> {
        let key = self
            .write_api_key
            .as_deref()
            .ok_or_else(|| TerrariumError::MissingConfig("telemetry.write_api_key".to_string()))?;

        let response = self
            .http
            .get(self.update_url())
            .query(&record.query_pairs(key))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_error)?;
        check_upload_response(status, &body)
    }

    async fn fetch_last_settings(&self) -> Result<Settings> {
        let channel = self
            .settings_channel_id
            .as_deref()
            .ok_or_else(|| TerrariumError::MissingConfig("telemetry.settings_channel_id".to_string()))?;

        let mut request = self.http.get(self.last_entry_url(channel));
        if let Some(key) = self.read_api_key.as_deref() {
            request = request.query(&[("api_key", key)]);
        }

        let response = request.send().await.map_err(request_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_error)?;

        if !(200..300).contains(&status) {
            return Err(TerrariumError::RemoteRejected { status, body });
        }
        debug!(channel, "Settings record received");
        parse_settings_feed(&body)
    }
}

fn request_error(e: reqwest::Error) -> TerrariumError {
    if e.is_timeout() {
        TerrariumError::Timeout(e.to_string())
    } else {
        TerrariumError::http(e.to_string())
    }
}

/// Success is a 2xx whose body is a non-zero entry id
pub fn check_upload_response(status: u16, body: &str) -> Result<String> {
    let entry = body.trim();
    if (200..300).contains(&status) && !entry.is_empty() && entry != "0" {
        Ok(entry.to_string())
    } else {
        Err(TerrariumError::RemoteRejected {
            status,
            body: entry.to_string(),
        })
    }
}

impl TelemetryBackend for ThingSpeakClient {
    fn upload(&self, record: &TelemetryRecord) -> impl Future<Output = Result<String>> + Send {
        self.upload_record(*record)
    }

    fn fetch_settings(&self) -> impl Future<Output = Result<Settings>> + Send {
        self.fetch_last_settings()
    }
}
