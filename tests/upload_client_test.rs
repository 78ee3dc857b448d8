//! Upload Client Integration Tests
//!
//! Drives the full signing → transfer → metadata sequence against mock
//! signing, storage and metadata endpoints.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parking_lot::Mutex;
    use presign_uploadr::config::UploadConfig;
    use presign_uploadr::metadata::HttpMetadataStore;
    use presign_uploadr::signing::HttpUrlSigner;
    use presign_uploadr::upload::{
        HttpTransfer, MessageKind, UploadClient, UploadOutcome, UploadRequest, UploadStage,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const TWO_MB: usize = 2 * 1024 * 1024;

    /// Mount a signing endpoint that grants `{server}/storage/{name}?sig=abc`
    async fn mount_signing(server: &MockServer, name: &str) {
        Mock::given(method("POST"))
            .and(path("/presign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "presigned_url": format!("{}/storage/{}?sig=abc", server.uri(), name),
                "s3_object_key": format!("uploads/rec123/1700000000000_{}", name),
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn create_client(server: &MockServer) -> UploadClient {
        let signer = HttpUrlSigner::new(
            &format!("{}/presign", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        UploadClient::new(
            UploadConfig::new("test-bucket"),
            Arc::new(signer),
            Arc::new(HttpTransfer::new().unwrap()),
        )
    }

    fn with_metadata(client: UploadClient, server: &MockServer) -> UploadClient {
        let store =
            HttpMetadataStore::new(&format!("{}/metadata", server.uri()), Duration::from_secs(5))
                .unwrap();
        client.with_metadata(Arc::new(store))
    }

    fn report_pdf() -> UploadRequest {
        UploadRequest::from_bytes(
            "report.pdf",
            "application/pdf",
            Bytes::from(vec![7u8; TWO_MB]),
        )
        .with_owner("rec123")
    }

    #[tokio::test]
    async fn test_successful_upload_with_metadata() {
        let server = MockServer::start().await;
        mount_signing(&server, "report.pdf").await;

        Mock::given(method("PUT"))
            .and(path("/storage/report.pdf"))
            .and(query_param("sig", "abc"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/metadata"))
            .and(body_partial_json(json!({
                "owner_context": "rec123",
                "file_name": "report.pdf",
                "object_key": "uploads/rec123/1700000000000_report.pdf",
                "object_url": format!("{}/storage/report.pdf", server.uri()),
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = with_metadata(create_client(&server), &server);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_progress(move |p| sink.lock().push(p.percent_complete));

        client.select(report_pdf());
        let state = client.state();
        assert_eq!(state.file_name.as_deref(), Some("report.pdf"));
        assert_eq!(state.file_size.as_deref(), Some("2.0 MB"));

        let outcome = client.upload_selected().await;

        match outcome {
            UploadOutcome::Success {
                storage_url,
                object_key,
            } => {
                assert_eq!(storage_url, format!("{}/storage/report.pdf", server.uri()));
                assert_eq!(object_key, "uploads/rec123/1700000000000_report.pdf");
            }
            other => panic!("expected success, got {:?}", other),
        }

        let seen = seen.lock().clone();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let state = client.state();
        assert!(!state.uploading);
        assert_eq!(state.file_name, None);
        assert_eq!(state.progress.percent_complete, 100);
        let message = state.message.unwrap();
        assert_eq!(message.text, "Upload successful!");
        assert_eq!(message.kind, MessageKind::Success);
    }

    #[tokio::test]
    async fn test_signing_request_carries_bucket_and_content_type() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/presign"))
            .and(body_partial_json(json!({
                "bucket": "test-bucket",
                "content_type": "text/plain",
                "expires_in": 600,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "presignedUrl": format!("{}/storage/a.txt?sig=abc", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/storage/a.txt"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_client(&server);
        let outcome = client
            .upload(UploadRequest::from_bytes(
                "a.txt",
                "text/plain",
                Bytes::from("hello"),
            ))
            .await;

        assert!(outcome.is_success(), "{:?}", outcome);
        if let UploadOutcome::Success { object_key, .. } = outcome {
            assert!(object_key.starts_with("uploads/anonymous/"));
            assert!(object_key.ends_with("_a.txt"));
        }
    }

    #[tokio::test]
    async fn test_storage_rejection_reports_status_and_body() {
        let server = MockServer::start().await;
        mount_signing(&server, "report.pdf").await;

        Mock::given(method("PUT"))
            .and(path("/storage/report.pdf"))
            .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = with_metadata(create_client(&server), &server);
        let outcome = client.upload(report_pdf()).await;

        assert_eq!(outcome.stage(), Some(UploadStage::Transfer));
        let reason = outcome.reason().unwrap();
        assert!(reason.contains("403"), "{}", reason);
        assert!(reason.contains("SignatureDoesNotMatch"), "{}", reason);

        let state = client.state();
        assert!(!state.uploading);
        let message = state.message.unwrap();
        assert!(message.text.starts_with("Upload failed: "));
        assert!(message.text.contains("403"));
        assert_eq!(message.kind, MessageKind::Error);
    }

    #[tokio::test]
    async fn test_metadata_failure_keeps_success() {
        let server = MockServer::start().await;
        mount_signing(&server, "report.pdf").await;

        Mock::given(method("PUT"))
            .and(path("/storage/report.pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let client = with_metadata(create_client(&server), &server);
        let outcome = client.upload(report_pdf()).await;

        assert!(outcome.is_success(), "{:?}", outcome);
        assert_eq!(
            client.state().message.map(|m| m.text).as_deref(),
            Some("Upload successful!")
        );
    }

    #[tokio::test]
    async fn test_no_owner_skips_metadata() {
        let server = MockServer::start().await;
        mount_signing(&server, "notes.txt").await;

        Mock::given(method("PUT"))
            .and(path("/storage/notes.txt"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = with_metadata(create_client(&server), &server);
        let outcome = client
            .upload(UploadRequest::from_bytes(
                "notes.txt",
                "text/plain",
                Bytes::from("n"),
            ))
            .await;

        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_missing_presigned_url_skips_transfer() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/presign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = create_client(&server);
        let outcome = client.upload(report_pdf()).await;

        assert_eq!(outcome.stage(), Some(UploadStage::Signing));
        assert_eq!(
            outcome.reason().as_deref(),
            Some("Failed to retrieve presigned URL")
        );

        let state = client.state();
        assert!(!state.uploading);
        assert_eq!(state.progress.percent_complete, 0);
        assert_eq!(
            state.message.map(|m| m.text).as_deref(),
            Some("Upload failed: Failed to retrieve presigned URL")
        );
    }

    #[tokio::test]
    async fn test_signing_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/presign"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": "bucket not allowed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_client(&server);
        let outcome = client.upload(report_pdf()).await;

        assert_eq!(outcome.stage(), Some(UploadStage::Signing));
        assert!(outcome.reason().unwrap().contains("bucket not allowed"));
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = create_client(&server);
        let outcome = client.upload_selected().await;

        assert_eq!(outcome.reason().as_deref(), Some("no file selected"));
        assert!(!client.is_uploading());
    }

    #[tokio::test]
    async fn test_upload_from_disk() {
        let server = MockServer::start().await;
        mount_signing(&server, "notes.txt").await;

        Mock::given(method("PUT"))
            .and(path("/storage/notes.txt"))
            .and(header("content-length", "15"))
            .and(body_string("hello from disk"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello from disk").unwrap();

        let request = UploadRequest::from_path(&file, "text/plain").await.unwrap();
        assert_eq!(request.file_name, "notes.txt");
        assert_eq!(request.size_bytes, 15);

        let client = create_client(&server);
        let outcome = client.upload(request).await;

        assert!(outcome.is_success(), "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_transfer_failure() {
        let server = MockServer::start().await;

        // Nothing listens on a port released right after binding
        let closed_port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        Mock::given(method("POST"))
            .and(path("/presign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "presigned_url": format!("http://127.0.0.1:{}/storage/a.txt?sig=abc", closed_port),
            })))
            .mount(&server)
            .await;

        let client = create_client(&server);
        let outcome = client
            .upload(UploadRequest::from_bytes(
                "a.txt",
                "text/plain",
                Bytes::from("x"),
            ))
            .await;

        assert_eq!(outcome.stage(), Some(UploadStage::Transfer));
        assert!(!client.is_uploading());

        // The signed URL is a credential and must not leak into messages
        let reason = outcome.reason().unwrap();
        assert!(!reason.contains("sig=abc"), "{}", reason);
        assert!(!reason.contains(&closed_port.to_string()), "{}", reason);
        let message = client.state().message.unwrap().text;
        assert!(message.starts_with("Upload failed: network error"), "{}", message);
        assert!(!message.contains("sig=abc"), "{}", message);
    }

    #[tokio::test]
    async fn test_invalid_content_type_is_sent_without_header() {
        let server = MockServer::start().await;
        mount_signing(&server, "a.txt").await;

        Mock::given(method("PUT"))
            .and(path("/storage/a.txt"))
            .and(|req: &Request| !req.headers.contains_key("content-type"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_client(&server);
        let outcome = client
            .upload(UploadRequest::from_bytes(
                "a.txt",
                "text/plain\n",
                Bytes::from("hello"),
            ))
            .await;

        assert!(outcome.is_success(), "{:?}", outcome);
    }
}
