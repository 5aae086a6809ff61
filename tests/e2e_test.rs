//! End-to-end tests against a deployed server
//!
//! These tests require a running med-id-scan instance with the mock
//! recognizer (the default). Run with:
//! cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

mod fixtures;

use fixtures::*;
use reqwest::multipart;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use med_id_scan::models::api::{ScanStatusResponse, SubmitResponse};
use med_id_scan::models::medicine::MedicineDetail;
use med_id_scan::models::scan::ScanStatus;

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

async fn upload(client: &reqwest::Client, base_url: &str, image: Vec<u8>) -> SubmitResponse {
    let form = multipart::Form::new().part(
        "image",
        multipart::Part::bytes(image)
            .file_name("capture.jpg")
            .mime_str("image/jpeg")
            .unwrap(),
    );
    let response = client
        .post(format!("{}/scan", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Upload failed");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    response.json().await.expect("Invalid submit body")
}

/// Poll every 500ms until the scan is terminal (with timeout)
async fn poll_until_terminal(
    client: &reqwest::Client,
    base_url: &str,
    request_id: Uuid,
    timeout_secs: u64,
) -> ScanStatusResponse {
    for attempt in 0..timeout_secs * 2 {
        let status: ScanStatusResponse = client
            .get(format!("{}/scan/{}", base_url, request_id))
            .send()
            .await
            .expect("Status check failed")
            .json()
            .await
            .expect("Invalid status body");

        if status.status.is_terminal() {
            return status;
        }
        if attempt % 10 == 0 && attempt > 0 {
            println!("  ... still {} (attempt {})", status.status, attempt);
        }
        sleep(Duration::from_millis(500)).await;
    }
    panic!("Scan {} did not finish within {} seconds", request_id, timeout_secs);
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_health_check() {
    let response = reqwest::get(format!("{}/health", get_base_url()))
        .await
        .expect("Health check failed");
    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );
    println!("✓ Health check passed");
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_scan_to_detail() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let submitted = upload(&client, &base_url, jpeg_photo(rand_seed())).await;
    println!("Submitted scan {}", submitted.request_id);

    let done = poll_until_terminal(&client, &base_url, submitted.request_id, 30).await;
    assert_eq!(done.status, ScanStatus::Done);
    let result = done.result.expect("No result in done scan");
    assert_eq!(result.name, MOCK_NAME);

    let detail: MedicineDetail = client
        .get(format!("{}/medicine/{}", base_url, result.medicine_id))
        .send()
        .await
        .expect("Detail request failed")
        .json()
        .await
        .expect("Invalid detail body");
    assert_eq!(detail.medicine_id, result.medicine_id);
    println!("✓ {} -> {}", submitted.request_id, detail.name);
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_resubmission_hits_cache() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();
    let image = jpeg_photo(rand_seed());

    let first = upload(&client, &base_url, image.clone()).await;
    poll_until_terminal(&client, &base_url, first.request_id, 30).await;

    let second = upload(&client, &base_url, image).await;
    assert_eq!(second.status, ScanStatus::Done);
    println!("✓ Resubmission answered from cache");
}

/// Distinct bytes per run so a long-lived server's cache does not interfere.
fn rand_seed() -> u32 {
    Uuid::new_v4().as_u128() as u32
}
