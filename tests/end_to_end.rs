//! One full run: wiremock marketplace in, wiremock Drive out.

use carsale_harvester::config::Settings;
use carsale_harvester::drive::GoogleDrive;
use carsale_harvester::runner::{run_with_drive, target_date_label};
use chrono::Local;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn nav_page(links: &[(&str, &str)]) -> String {
    let tiles: String = links
        .iter()
        .map(|(title, href)| format!(r#"<div class="styles_itemWrapper__MTzPB"><a title="{title}" href="{href}"></a></div>"#))
        .collect();
    format!("<html><body>{tiles}</body></html>")
}

fn listing_page(listings: serde_json::Value) -> String {
    format!(
        r#"<script id="__NEXT_DATA__" type="application/json">{}</script>"#,
        json!({ "props": { "pageProps": { "listings": listings } } })
    )
}

async fn page(server: &MockServer, at: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn harvests_uploads_and_cleans_up() {
    let site = MockServer::start().await;
    page(&site, "/root", 200, nav_page(&[("Toyota", "/toyota"), ("Kia", "/kia")])).await;
    page(&site, "/toyota", 200, nav_page(&[("Camry", "/toyota/camry"), ("Supra", "/toyota/supra")])).await;
    page(&site, "/kia", 200, nav_page(&[("Rio", "/kia/rio")])).await;
    page(&site, "/toyota/camry", 200, listing_page(json!([{ "title": "Camry GLE", "price": 8500 }]))).await;
    page(&site, "/toyota/supra", 503, String::new()).await;
    page(&site, "/kia/rio", 200, listing_page(json!([]))).await;

    let drive_server = MockServer::start().await;
    let label = target_date_label(Local::now().date_naive());

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .expect(1)
        .mount(&drive_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_partial_json(json!({ "name": label, "parents": ["parent-a"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "dated-folder" })))
        .expect(1)
        .mount(&drive_server)
        .await;
    for name in ["Toyota.xlsx".to_string(), format!("brands_summary_{label}.xlsx")] {
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "resumable"))
            .and(body_partial_json(json!({ "name": name, "parents": ["dated-folder"] })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Location", format!("{}/session", drive_server.uri()).as_str()),
            )
            .expect(1)
            .mount(&drive_server)
            .await;
    }
    Mock::given(method("PUT"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "uploaded" })))
        .expect(2)
        .mount(&drive_server)
        .await;

    let scratch = tempfile::tempdir().unwrap();
    let mut settings = Settings::new().unwrap();
    settings.root_url = format!("{}/root", site.uri());
    settings.base_url = site.uri();
    settings.parent_folder_ids = vec!["parent-a".to_string()];
    settings.chunk_delay_secs = 0;
    settings.retry_base_delay_secs = 0;
    settings.work_dir = scratch.path().join("temp_files");

    let drive = GoogleDrive::with_token(
        "test-token",
        &format!("{}/drive/v3", drive_server.uri()),
        &format!("{}/upload/drive/v3", drive_server.uri()),
        settings.upload_chunk_bytes,
    )
    .unwrap();

    let summary = run_with_drive(&settings, drive).await.unwrap();

    assert_eq!(summary.brand_names().collect::<Vec<_>>(), vec!["Toyota"]);
    assert!(!settings.work_dir.exists(), "temporary directory is removed");
}

#[tokio::test]
async fn hierarchy_failure_aborts_and_still_cleans_up() {
    let site = MockServer::start().await;
    page(&site, "/root", 500, String::new()).await;
    let drive_server = MockServer::start().await;

    let scratch = tempfile::tempdir().unwrap();
    let mut settings = Settings::new().unwrap();
    settings.root_url = format!("{}/root", site.uri());
    settings.base_url = site.uri();
    settings.work_dir = scratch.path().join("temp_files");

    let drive = GoogleDrive::with_token("t", &drive_server.uri(), &drive_server.uri(), settings.upload_chunk_bytes).unwrap();
    let result = run_with_drive(&settings, drive).await;

    assert!(result.is_err());
    assert!(!settings.work_dir.exists());
    assert!(drive_server.received_requests().await.unwrap().is_empty());
}
