//! DNS manager REST client.

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Serialize;
use tracing::{error, info};

use super::JSON_CONTENT_TYPE;
use crate::appconf::DnsSettings;

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("{operation} request to dns server failed with status {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("request to dns server failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("marshal dns info failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub rr_type: String,
    pub class: String,
    pub ttl: u32,
    #[serde(rename = "rData")]
    pub rdata: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneEntry {
    pub zone: String,
    pub rr: Vec<ResourceRecord>,
}

/// Joins URL pieces with exactly one `/` between them.
fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }
    url
}

fn absolute(host: &str) -> String {
    if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    }
}

#[derive(Debug, Clone)]
pub struct DnsClient {
    endpoint: String,
    http: reqwest::Client,
}

impl DnsClient {
    #[must_use]
    pub fn new(settings: &DnsSettings, http: reqwest::Client) -> Self {
        Self {
            endpoint: format!(
                "http://{}:{}/mep/dns_server_mgmt/v1/",
                settings.host, settings.port
            ),
            http,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Creates or replaces an A-style record for `host` in the root zone.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError`] on transport failure or a non-2xx reply.
    pub async fn set_resource_record_type_a(
        &self,
        host: &str,
        rr_type: &str,
        class: &str,
        point_to: Vec<String>,
        ttl: u32,
    ) -> Result<(), DnsError> {
        let zones = [ZoneEntry {
            zone: ".".to_string(),
            rr: vec![ResourceRecord {
                name: absolute(host),
                rr_type: rr_type.to_string(),
                class: class.to_string(),
                ttl,
                rdata: point_to,
            }],
        }];
        let body = serde_json::to_vec(&zones)?;
        let url = join_url(&self.endpoint, &["rrecord"]);
        self.send(Method::PUT, url, body, "update").await
    }

    /// Deletes the record of `rr_type` for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError`] on transport failure or a non-2xx reply.
    pub async fn delete_resource_record_type_a(
        &self,
        host: &str,
        rr_type: &str,
    ) -> Result<(), DnsError> {
        let name = absolute(host);
        let url = join_url(&self.endpoint, &["rrecord", &name, rr_type]);
        self.send(Method::DELETE, url, b"{}".to_vec(), "delete").await
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Vec<u8>,
        operation: &'static str,
    ) -> Result<(), DnsError> {
        let response = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .inspect_err(|_| error!(operation, "request to dns server failed"))?;

        let status = response.status();
        if !status.is_success() {
            error!(operation, status = status.as_u16(), "dns rule request failed on server");
            return Err(DnsError::Status {
                operation,
                status: status.as_u16(),
            });
        }
        info!(operation, %url, "dns rule applied");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::extif::mock::MockServer;

    fn client_for(server: &MockServer) -> DnsClient {
        let settings = DnsSettings {
            host: "127.0.0.1".to_string(),
            port: server.port(),
        };
        DnsClient::new(&settings, reqwest::Client::new())
    }

    #[test]
    fn join_url_uses_single_separators() {
        assert_eq!(join_url("http://h:1/v1/", &["rrecord"]), "http://h:1/v1/rrecord");
        assert_eq!(join_url("http://h:1/v1", &["/rrecord/", "a.", "A"]), "http://h:1/v1/rrecord/a./A");
    }

    #[test]
    fn endpoint_uses_settings() {
        let client = DnsClient::new(&DnsSettings::default(), reqwest::Client::new());
        assert_eq!(client.endpoint(), "http://localhost:8080/mep/dns_server_mgmt/v1/");
    }

    #[tokio::test]
    async fn set_record_puts_root_zone_entry() {
        let server = MockServer::start(StatusCode::OK).await;
        let client = client_for(&server);

        client
            .set_resource_record_type_a("svc.mep", "A", "IN", vec!["10.0.0.5".to_string()], 30)
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].path, "/mep/dns_server_mgmt/v1/rrecord");
        assert_eq!(requests[0].content_type, JSON_CONTENT_TYPE);
        assert_eq!(
            requests[0].body,
            json!([{"zone": ".", "rr": [{
                "name": "svc.mep.",
                "type": "A",
                "class": "IN",
                "ttl": 30,
                "rData": ["10.0.0.5"]
            }]}])
        );
    }

    #[tokio::test]
    async fn delete_record_sends_empty_object() {
        let server = MockServer::start(StatusCode::OK).await;
        let client = client_for(&server);

        client.delete_resource_record_type_a("svc.mep.", "A").await.unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].path, "/mep/dns_server_mgmt/v1/rrecord/svc.mep./A");
        assert_eq!(requests[0].body, json!({}));
    }

    #[tokio::test]
    async fn non_success_reply_is_an_error() {
        let server = MockServer::start(StatusCode::INTERNAL_SERVER_ERROR).await;
        let client = client_for(&server);

        let err = client
            .set_resource_record_type_a("svc", "A", "IN", Vec::new(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::Status { operation: "update", status: 500 }));
    }
}
