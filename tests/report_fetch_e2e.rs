//! HTTP-level tests of the report and rate clients against a mock server

use mfsync::domain::errors::{RateError, ReportError};
use mfsync::domain::repositories::rate_source::RateSource;
use mfsync::domain::repositories::report_source::{ReportKind, ReportSource};
use mfsync::infrastructure::flex_client::{FlexClientConfig, FlexQueryClient};
use mfsync::infrastructure::yahoo_fx::{YahooFxClient, YahooFxConfig};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

fn ack_xml(statement_url: &str) -> String {
    format!(
        r#"<FlexStatementResponse timestamp="t">
  <Status>Success</Status>
  <ReferenceCode>1234567890</ReferenceCode>
  <Url>{statement_url}</Url>
</FlexStatementResponse>"#
    )
}

const IN_PROGRESS_XML: &str = r#"<FlexStatementResponse timestamp="t">
  <Status>Warn</Status>
  <ErrorCode>1019</ErrorCode>
  <ErrorMessage>Statement generation in progress. Please try again shortly.</ErrorMessage>
</FlexStatementResponse>"#;

const STATEMENT_XML: &str = r#"<FlexQueryResponse queryName="mf" type="AF">
  <FlexStatements count="1">
    <FlexStatement accountId="U1234567">
      <CashReport>
        <CashReportCurrency currency="BASE_SUMMARY" endingCash="1500.0" />
        <CashReportCurrency currency="USD" endingCash="1000.5" />
        <CashReportCurrency currency="EUR" endingCash="500" />
      </CashReport>
      <OpenPositions>
        <OpenPosition currency="USD" assetCategory="STK" symbol="AAPL"
          position="100" positionValue="15000" costBasisMoney="12000" />
      </OpenPositions>
    </FlexStatement>
  </FlexStatements>
</FlexQueryResponse>"#;

fn flex_client(server_uri: &str, poll_attempts: u32) -> FlexQueryClient {
    FlexQueryClient::with_config(
        Zeroizing::new("test-token".to_string()),
        "99999".to_string(),
        FlexClientConfig {
            base_url: server_uri.to_string(),
            poll_attempts,
            poll_delay: Duration::from_millis(10),
        },
    )
}

#[tokio::test]
async fn test_flex_cash_report_round_trip_drops_base_summary() {
    let server = MockServer::start().await;
    let statement_url = format!("{}/GetStatement", server.uri());

    Mock::given(method("GET"))
        .and(path("/SendRequest"))
        .and(query_param("t", "test-token"))
        .and(query_param("q", "99999"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ack_xml(&statement_url)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GetStatement"))
        .and(query_param("q", "1234567890"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATEMENT_XML))
        .mount(&server)
        .await;

    let client = flex_client(&server.uri(), 3);
    let rows = client.fetch(ReportKind::CashReport).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("currency").map(String::as_str), Some("USD"));
    assert_eq!(rows[1].get("currency").map(String::as_str), Some("EUR"));
}

#[tokio::test]
async fn test_flex_polls_while_statement_generates() {
    let server = MockServer::start().await;
    let statement_url = format!("{}/GetStatement", server.uri());

    Mock::given(method("GET"))
        .and(path("/SendRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ack_xml(&statement_url)))
        .mount(&server)
        .await;
    // First poll: still generating. Second poll: ready.
    Mock::given(method("GET"))
        .and(path("/GetStatement"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IN_PROGRESS_XML))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GetStatement"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATEMENT_XML))
        .mount(&server)
        .await;

    let client = flex_client(&server.uri(), 3);
    let rows = client.fetch(ReportKind::OpenPositions).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("symbol").map(String::as_str), Some("AAPL"));
}

#[tokio::test]
async fn test_flex_gives_up_after_bounded_polling() {
    let server = MockServer::start().await;
    let statement_url = format!("{}/GetStatement", server.uri());

    Mock::given(method("GET"))
        .and(path("/SendRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ack_xml(&statement_url)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GetStatement"))
        .respond_with(ResponseTemplate::new(200).set_body_string(IN_PROGRESS_XML))
        .mount(&server)
        .await;

    let client = flex_client(&server.uri(), 2);
    let result = client.fetch(ReportKind::CashReport).await;
    assert!(matches!(
        result,
        Err(ReportError::StatementNotReady { attempts: 2 })
    ));
}

#[tokio::test]
async fn test_flex_service_rejection_is_an_error() {
    let server = MockServer::start().await;
    let rejection = r#"<FlexStatementResponse timestamp="t">
  <Status>Fail</Status>
  <ErrorCode>1012</ErrorCode>
  <ErrorMessage>Token has expired.</ErrorMessage>
</FlexStatementResponse>"#;

    Mock::given(method("GET"))
        .and(path("/SendRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rejection))
        .mount(&server)
        .await;

    let client = flex_client(&server.uri(), 2);
    let result = client.fetch(ReportKind::CashReport).await;
    match result {
        Err(ReportError::Service(message)) => assert!(message.contains("1012")),
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_yahoo_latest_rate() {
    let server = MockServer::start().await;
    let payload = r#"{
        "chart": {
            "result": [
                {"meta": {"currency": "JPY", "symbol": "USDJPY=X", "regularMarketPrice": 151.37}}
            ],
            "error": null
        }
    }"#;
    Mock::given(method("GET"))
        .and(path("/USDJPY=X"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(payload, "application/json"),
        )
        .mount(&server)
        .await;

    let client = YahooFxClient::with_config(YahooFxConfig {
        base_url: server.uri(),
    })
    .unwrap();
    let rate = client.latest_rate("USD").await.unwrap();
    assert!((rate - 151.37).abs() < 1e-9);
}

#[tokio::test]
async fn test_yahoo_missing_pair_is_unavailable() {
    let server = MockServer::start().await;
    let payload = r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#;
    Mock::given(method("GET"))
        .and(path("/XXXJPY=X"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(payload, "application/json"),
        )
        .mount(&server)
        .await;

    let client = YahooFxClient::with_config(YahooFxConfig {
        base_url: server.uri(),
    })
    .unwrap();
    let result = client.latest_rate("XXX").await;
    assert!(matches!(result, Err(RateError::Unavailable { .. })));
}
