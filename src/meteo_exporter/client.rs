// meteo_exporter - Open-Meteo to OTLP telemetry adapter
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::headers;
use crate::model::{Config, ConfigResponse, Location, LocationResponse};
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};

pub(crate) const CLIENT_USER_AGENT: &str = "Meteo Exporter (https://github.com/56quarters/meteo_exporter)";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Internal(#[from] reqwest::Error),
    #[error("invalid base URL {0}")]
    InvalidUrl(String),
    #[error("unexpected status {0} for {1}")]
    Unexpected(StatusCode, Url),
}

/// Parse `base_url` and make sure path segments can be appended to it.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ClientError> {
    let url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_owned()))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(base_url.to_owned()));
    }

    Ok(url)
}

/// Append `segments` to the path of `base`.
pub(crate) fn with_path(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut p) = url.path_segments_mut() {
        p.pop_if_empty().extend(segments);
    }

    url
}

/// Read-only client for tenant objects in the knowledge store.
#[derive(Debug, Clone)]
pub struct KnowledgeStoreClient {
    client: Client,
    base_url: Url,
}

impl KnowledgeStoreClient {
    const JSON_RESPONSE: &'static str = "application/json";
    const CONFIG_TYPE: &'static str = "meteodata:meteoConfig";
    const CONFIG_ID: &'static str = "meteodata:config";
    const LOCATION_TYPE: &'static str = "meteodata:meteoLocation";
    const PAGE_SIZE: u32 = 999;

    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        Ok(KnowledgeStoreClient {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Fetch the tenant's config object, `None` if the object has no data.
    pub async fn config(&self, inbound: &HeaderMap) -> Result<Option<Config>, ClientError> {
        let url = with_path(&self.base_url, &["v1", "objects", Self::CONFIG_TYPE, Self::CONFIG_ID]);
        tracing::debug!(message = "making config request", url = %url);

        let res = self.make_request(url, inbound).await?;
        let body = res.json::<ConfigResponse>().await?;
        Ok(body.data)
    }

    /// Fetch every location object of the tenant, in the order returned by the store.
    pub async fn locations(&self, inbound: &HeaderMap) -> Result<Vec<Location>, ClientError> {
        let url = with_path(&self.base_url, &["v1", "objects", Self::LOCATION_TYPE]);
        tracing::debug!(message = "making locations request", url = %url);

        let res = self.make_request(url, inbound).await?;
        let body = res.json::<LocationResponse>().await?;
        Ok(body.items.into_iter().map(|i| i.data).collect())
    }

    async fn make_request(&self, url: Url, inbound: &HeaderMap) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .query(&[("max", Self::PAGE_SIZE)])
            .headers(headers::propagate(inbound))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }
}
