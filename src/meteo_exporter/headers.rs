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

use reqwest::header::{HeaderMap, HeaderName};

pub const PRINCIPAL_TYPE: &str = "appd-cpty";
pub const PRINCIPAL_ID: &str = "appd-cpid";
pub const TENANT_LAYER_TYPE: &str = "layer-type";
pub const TENANT_LAYER_ID: &str = "layer-id";

/// Inbound headers forwarded on every outbound call made on behalf of a tenant.
pub const PROPAGATED_HEADERS: [&str; 9] = [
    PRINCIPAL_TYPE,
    PRINCIPAL_ID,
    TENANT_LAYER_TYPE,
    TENANT_LAYER_ID,
    "traceparent",
    "x-b3-parentspanid",
    "x-b3-spanid",
    "x-b3-traceid",
    "x-request-id",
];

/// Identity headers required by the ingestion endpoint, as (synthesized, source) pairs.
const IDENTITY_HEADERS: [(&str, &str); 3] = [
    ("appd-pid", PRINCIPAL_ID),
    ("appd-pty", PRINCIPAL_TYPE),
    ("appd-tid", TENANT_LAYER_ID),
];

/// Select the allow-listed subset of `inbound`.
///
/// Header names are matched case-insensitively and every value for a matched name is kept
/// in its original order and casing. Anything not on the allow-list is dropped.
pub fn propagate(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in PROPAGATED_HEADERS {
        let name = HeaderName::from_static(name);
        for value in inbound.get_all(&name) {
            out.append(name.clone(), value.clone());
        }
    }

    out
}

/// Headers for calls to the ingestion endpoint: the propagated subset plus the
/// synthesized tenant identity headers. An identity header whose source is absent
/// from `inbound` is omitted.
pub fn ingest_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = propagate(inbound);
    for (synthesized, source) in IDENTITY_HEADERS {
        if let Some(value) = inbound.get(source) {
            out.insert(HeaderName::from_static(synthesized), value.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{ingest_headers, propagate};
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    fn header(headers: &mut HeaderMap, name: &str, value: &'static str) {
        headers.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_static(value),
        );
    }

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        header(&mut headers, "Layer-ID", "Tenant-ABC");
        header(&mut headers, "layer-type", "TENANT");
        header(&mut headers, "APPD-CPTY", "solution");
        header(&mut headers, "appd-cpid", "meteodata");
        header(&mut headers, "traceparent", "00-abc-def-01");
        header(&mut headers, "X-Request-Id", "first");
        header(&mut headers, "x-request-id", "second");
        header(&mut headers, "Authorization", "Bearer secret");
        header(&mut headers, "content-type", "application/json");
        headers
    }

    #[test]
    fn test_propagate_drops_unlisted() {
        let out = propagate(&inbound());
        assert!(out.get("authorization").is_none());
        assert!(out.get("content-type").is_none());
        assert_eq!(6, out.keys_len());
    }

    #[test]
    fn test_propagate_any_name_casing() {
        let out = propagate(&inbound());
        assert_eq!(out.get("layer-id").unwrap(), "Tenant-ABC");
        assert_eq!(out.get("appd-cpty").unwrap(), "solution");
    }

    #[test]
    fn test_propagate_keeps_all_values() {
        let out = propagate(&inbound());
        let values: Vec<_> = out.get_all("x-request-id").iter().collect();
        assert_eq!(values, vec!["first", "second"]);
    }

    #[test]
    fn test_propagate_idempotent() {
        let once = propagate(&inbound());
        let twice = propagate(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_propagate_empty() {
        assert!(propagate(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_ingest_headers_synthesized() {
        let out = ingest_headers(&inbound());
        assert_eq!(out.get("appd-pid").unwrap(), "meteodata");
        assert_eq!(out.get("appd-pty").unwrap(), "solution");
        assert_eq!(out.get("appd-tid").unwrap(), "Tenant-ABC");
        assert_eq!(out.get("layer-id").unwrap(), "Tenant-ABC");
    }

    #[test]
    fn test_ingest_headers_missing_source() {
        let mut headers = HeaderMap::new();
        header(&mut headers, "layer-id", "t1");

        let out = ingest_headers(&headers);
        assert_eq!(out.get("appd-tid").unwrap(), "t1");
        assert!(out.get("appd-pid").is_none());
        assert!(out.get("appd-pty").is_none());
    }
}
