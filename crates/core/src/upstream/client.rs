//! HTTP implementation of [`TicketApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{ApiNote, ApiTicket, ApiTimeEntry, QueryRequest, QueryResponse, TicketPageQuery};
use super::{TicketApi, UpstreamError};
use crate::config::UpstreamConfig;
use crate::ticket::{Note, Ticket, TimeEntry};

/// Path appended to the zone URL.
const API_PATH: &str = "/atservicesrest/v1.0";

/// Error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 200;

/// Queryable entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Tickets,
    TicketNotes,
    TimeEntries,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Tickets => "Tickets",
            Resource::TicketNotes => "TicketNotes",
            Resource::TimeEntries => "TimeEntries",
        }
    }
}

/// Authenticated client for the ticketing REST API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
}

impl UpstreamClient {
    /// Build a client carrying the three credential headers on every request.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        // Header names are case-insensitive on the wire; `HeaderName` wants lowercase.
        headers.insert("username", header_value("UserName", &config.username)?);
        headers.insert("secret", header_value("Secret", &config.secret)?);
        headers.insert(
            "apiintegrationcode",
            header_value("APIIntegrationcode", &config.integration_code)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .build()
            .map_err(|e| UpstreamError::NotConfigured(format!("failed to build HTTP client: {}", e)))?;

        let base_url = format!("{}{}", config.zone_url.trim_end_matches('/'), API_PATH);

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a query to `{base}/{resource}/query` and decode its `items`.
    pub async fn query<T: DeserializeOwned>(
        &self,
        resource: Resource,
        request: &QueryRequest,
    ) -> Result<Vec<T>, UpstreamError> {
        let url = format!("{}/{}/query", self.base_url, resource.as_str());

        debug!(
            resource = resource.as_str(),
            max_records = request.max_records,
            filters = request.filter.len(),
            "Upstream query"
        );

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let bytes = response.bytes().await?;
        let parsed: QueryResponse<T> = serde_json::from_slice(&bytes).map_err(|e| {
            UpstreamError::Parse(format!("{} response: {}", resource.as_str(), e))
        })?;

        Ok(parsed.items)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value)
        .map_err(|e| UpstreamError::NotConfigured(format!("invalid {} header value: {}", name, e)))
}

#[async_trait]
impl TicketApi for UpstreamClient {
    async fn query_tickets(&self, query: &TicketPageQuery) -> Result<Vec<Ticket>, UpstreamError> {
        let items: Vec<ApiTicket> = self.query(Resource::Tickets, &query.to_request()).await?;
        Ok(items.into_iter().map(Ticket::from).collect())
    }

    async fn ticket_notes(
        &self,
        ticket_id: i64,
        max_records: u32,
    ) -> Result<Vec<Note>, UpstreamError> {
        let request = QueryRequest::for_ticket(ticket_id, max_records);
        let items: Vec<ApiNote> = self.query(Resource::TicketNotes, &request).await?;
        Ok(items.into_iter().map(Note::from).collect())
    }

    async fn ticket_time_entries(
        &self,
        ticket_id: i64,
        max_records: u32,
    ) -> Result<Vec<TimeEntry>, UpstreamError> {
        let request = QueryRequest::for_ticket(ticket_id, max_records);
        let items: Vec<ApiTimeEntry> = self.query(Resource::TimeEntries, &request).await?;
        Ok(items.into_iter().map(TimeEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(zone_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            zone_url: zone_url.to_string(),
            username: "api@example.com".to_string(),
            secret: "s3cret".to_string(),
            integration_code: "INTEGRATION".to_string(),
            timeout_secs: 5,
        }
    }

    fn page_query() -> TicketPageQuery {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        TicketPageQuery {
            start: day.and_hms_opt(0, 0, 0).unwrap(),
            end: day.and_hms_opt(23, 59, 59).unwrap(),
            after_id: 0,
            company_id: None,
            max_records: 2,
        }
    }

    #[test]
    fn test_base_url_from_zone() {
        let client = UpstreamClient::new(&test_config("https://ws.example.net/")).unwrap();
        assert_eq!(client.base_url(), "https://ws.example.net/atservicesrest/v1.0");
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let mut config = test_config("https://ws.example.net");
        config.secret = "line\nbreak".to_string();
        let result = UpstreamClient::new(&config);
        assert!(matches!(result, Err(UpstreamError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_query_tickets_sends_auth_headers_and_filters() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/atservicesrest/v1.0/Tickets/query"))
            .and(header("UserName", "api@example.com"))
            .and(header("Secret", "s3cret"))
            .and(header("APIIntegrationcode", "INTEGRATION"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "MaxRecords": 2,
                "IncludeFields": [],
                "Filter": [
                    {"field": "createDate", "op": "gte", "value": "2024-05-01T00:00:00"},
                    {"field": "createDate", "op": "lte", "value": "2024-05-01T23:59:59"},
                    {"field": "id", "op": "gt", "value": 0}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": 10, "title": "VPN down", "companyID": 3},
                    {"id": 11, "title": "New laptop"}
                ],
                "pageDetails": {"count": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri())).unwrap();
        let tickets = client.query_tickets(&page_query()).await.unwrap();

        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].id, 10);
        assert_eq!(tickets[0].company_id, Some(3));
        assert_eq!(tickets[1].title.as_deref(), Some("New laptop"));
    }

    #[tokio::test]
    async fn test_child_queries_filter_by_ticket() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/atservicesrest/v1.0/TicketNotes/query"))
            .and(body_json(json!({
                "MaxRecords": 500,
                "IncludeFields": [],
                "Filter": [{"field": "ticketID", "op": "eq", "value": 10}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": 1, "ticketID": 10, "title": "Called"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/atservicesrest/v1.0/TimeEntries/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri())).unwrap();
        let notes = client.ticket_notes(10, 500).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].ticket_id, 10);

        let entries = client.ticket_time_entries(10, 500).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri())).unwrap();
        let err = client.ticket_notes(1, 500).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_server_error_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(1000)))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri())).unwrap();
        match client.query_tickets(&page_query()).await {
            Err(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&test_config(&server.uri())).unwrap();
        let err = client.ticket_time_entries(1, 500).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Parse(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": []}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.timeout_secs = 1;
        let client = UpstreamClient::new(&config).unwrap();
        let err = client.ticket_notes(1, 500).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout));
    }
}
