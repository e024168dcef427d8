use s3_presigned_upload::broker::{HttpBrokerClient, UrlBroker, CORRELATION_ID_HEADER};
use s3_presigned_upload::error::ErrorKind;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn regular_response_xml() -> &'static str {
    "<presignedUrlListResponse>\
     <presignedUrl objectKey=\"build-42/a.txt\" multipart=\"false\">\
     <url partNumber=\"1\">https://s3.example.com/a?sig=1</url>\
     </presignedUrl>\
     <presignedUrl objectKey=\"build-42/b.txt\" multipart=\"false\">\
     <url partNumber=\"1\">https://s3.example.com/b?sig=2</url>\
     </presignedUrl>\
     </presignedUrlListResponse>"
}

async fn client_for(server: &MockServer) -> HttpBrokerClient {
    HttpBrokerClient::builder()
        .endpoint(format!("{}/artifact-urls", server.uri()))
        .connect_timeout(Duration::from_secs(5))
        .pool_size(2)
        .build()
        .unwrap()
}

#[tokio::test]
async fn fetch_regular_posts_v2_xml_and_parses_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/artifact-urls"))
        .and(header("content-type", "application/xml; charset=UTF-8"))
        .and(header_exists(CORRELATION_ID_HEADER))
        .and(body_string_contains("<request version=\"v2\">"))
        .and(body_string_contains(
            "<key digest=\"aa11\">build-42/a.txt</key>",
        ))
        .and(body_string_contains("<key>build-42/b.txt</key>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(regular_response_xml()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let keys = vec!["build-42/a.txt".to_string(), "build-42/b.txt".to_string()];
    let digests: HashMap<String, String> =
        [("build-42/a.txt".to_string(), "aa11".to_string())].into();

    let urls = client.fetch_regular(&keys, &digests).await.unwrap();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0].object_key(), "build-42/a.txt");
    assert!(!urls[0].is_multipart());
    assert_eq!(urls[0].parts()[0].url(), "https://s3.example.com/a?sig=1");
}

#[tokio::test]
async fn fetch_regular_repeats_artifact_keys_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_exists("X-S3-Artifact-Keys"))
        .respond_with(ResponseTemplate::new(200).set_body_string(regular_response_xml()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let keys = vec!["build-42/a.txt".to_string(), "build-42/b.txt".to_string()];
    client.fetch_regular(&keys, &HashMap::new()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let values: Vec<_> = requests[0]
        .headers
        .get_all("X-S3-Artifact-Keys")
        .iter()
        .collect();
    assert_eq!(values.len(), 2);
}

#[tokio::test]
async fn fetch_multipart_selects_the_requested_key() {
    let server = MockServer::start().await;
    let body = "<presignedUrlListResponse>\
        <presignedUrl objectKey=\"build-42/big.bin\" uploadId=\"u-77\" multipart=\"true\">\
        <url partNumber=\"1\">https://s3.example.com/p1</url>\
        <url partNumber=\"2\">https://s3.example.com/p2</url>\
        </presignedUrl>\
        </presignedUrlListResponse>";
    Mock::given(method("POST"))
        .and(body_string_contains("<multipart objectKey=\"build-42/big.bin\">"))
        .and(body_string_contains("<digest>d1</digest><digest>d2</digest>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let url = client
        .fetch_multipart(
            "build-42/big.bin",
            &["d1".to_string(), "d2".to_string()],
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(url.upload_id(), Some("u-77"));
    assert_eq!(url.parts().len(), 2);
}

#[tokio::test]
async fn fetch_single_sends_digest_and_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains(
            "<objectKey digest=\"aa11\" ttl=\"120\">build-42/a.txt</objectKey>",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(regular_response_xml()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let url = client
        .fetch_single("build-42/a.txt", Some("aa11"), Some(Duration::from_secs(120)))
        .await
        .unwrap();
    assert_eq!(url.object_key(), "build-42/a.txt");
    assert_eq!(url.parts().len(), 1);
}

#[tokio::test]
async fn response_missing_the_requested_key_is_a_shape_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(regular_response_xml()))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_multipart("build-42/other.bin", &["d1".to_string()], None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BrokerShape);
}

#[tokio::test]
async fn complete_posts_form_with_repeated_etags() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("OBJECT_KEY=build-42%2Fbig.bin"))
        .and(body_string_contains("FINISH_UPLOAD=u-77"))
        .and(body_string_contains("UPLOAD_SUCCESSFUL=true"))
        .and(body_string_contains("ETAGS=e1&ETAGS=e2&ETAGS=e3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client
        .complete(
            "build-42/big.bin",
            "u-77",
            &["e1".to_string(), "e2".to_string(), "e3".to_string()],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn abort_posts_unsuccessful_form_without_etags() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("FINISH_UPLOAD=u-77"))
        .and(body_string_contains("UPLOAD_SUCCESSFUL=false"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.abort("build-42/big.bin", "u-77").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(!body.contains("ETAGS="));
}

#[tokio::test]
async fn node_cookie_rides_along_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("cookie", "node-id=main-node"))
        .respond_with(ResponseTemplate::new(200).set_body_string(regular_response_xml()))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpBrokerClient::builder()
        .endpoint(format!("{}/artifact-urls", server.uri()))
        .node_cookie("node-id", "main-node")
        .build()
        .unwrap();
    client
        .fetch_regular(&["build-42/a.txt".to_string()], &HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn broker_5xx_is_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_regular(&["k".to_string()], &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BrokerFetch);
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn broker_auth_failure_is_not_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_regular(&["k".to_string()], &HashMap::new())
        .await
        .unwrap_err();
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn interrupted_body_marker_maps_to_interrupted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(409).set_body_string("Upload interrupted by the server"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_regular(&["k".to_string()], &HashMap::new())
        .await
        .unwrap_err();
    assert!(err.is_interrupted());
}

#[tokio::test]
async fn malformed_response_is_a_shape_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<oops"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .fetch_regular(&["k".to_string()], &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BrokerShape);
}

#[tokio::test]
async fn closed_client_rejects_every_call() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    client.close();

    let err = client
        .fetch_regular(&["k".to_string()], &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BrokerShutdown);

    let err = client.abort("k", "u-1").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BrokerShutdown);

    let err = client
        .fetch_multipart("k", &[], None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BrokerShutdown);
}
