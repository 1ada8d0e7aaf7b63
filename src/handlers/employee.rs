use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{error, info, warn};

use crate::config::Config;
use crate::db::JsonStore;
use crate::errors::AppError;
use crate::models::employee::GateOutcome;
use crate::utils::{upload, validation};

const RESOURCE: &str = "employees";

pub async fn create_employee(
    store: web::Data<JsonStore>,
    config: web::Data<Config>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let upload = upload::intercept(payload, &config.upload).await?;

    match validation::validate_employee(&upload.fields, Utc::now()) {
        GateOutcome::Rejected(errors) => {
            warn!("Rejected employee submission: {:?}", errors.fields());
            upload.discard().await;
            Ok(HttpResponse::BadRequest().json(errors))
        }
        GateOutcome::Accepted(record) => match store.insert(RESOURCE, record).await {
            Ok(stored) => {
                info!("Stored employee {}", stored["id"]);
                Ok(HttpResponse::Created().json(stored))
            }
            Err(err) => {
                error!("Failed to store employee: {}", err);
                upload.discard().await;
                Err(err)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadSettings;
    use crate::handlers;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use futures_util::future::join_all;
    use std::collections::HashSet;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const BOUNDARY: &str = "----employee-form-boundary";

    struct TestFile<'a> {
        field: &'a str,
        filename: &'a str,
        content: &'a [u8],
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<TestFile<'_>>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        if let Some(file) = file {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    file.field, file.filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
            body.extend_from_slice(file.content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn photo() -> Option<TestFile<'static>> {
        Some(TestFile {
            field: "image",
            filename: "photo.png",
            content: b"\x89PNG fake image bytes",
        })
    }

    fn valid_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("name", "Al"),
            ("email", "a@b.com"),
            ("designation", "Eng"),
            ("gender", "Male"),
            ("courses", "Math"),
        ]
    }

    struct Harness {
        dir: TempDir,
        config: Config,
    }

    impl Harness {
        fn new(max_upload_bytes: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config {
                bind_address: "127.0.0.1:0".to_string(),
                db_path: dir.path().join("db.json"),
                upload: UploadSettings {
                    upload_dir: dir.path().join("images"),
                    max_upload_bytes,
                },
            };
            Self { dir, config }
        }

        fn stored_images(&self) -> Vec<String> {
            let dir = &self.config.upload.upload_dir;
            if !dir.exists() {
                return Vec::new();
            }
            std::fs::read_dir(dir)
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        }

        fn employees(&self) -> Value {
            let raw = std::fs::read(self.dir.path().join("db.json")).unwrap();
            let document: Value = serde_json::from_slice(&raw).unwrap();
            document.get("employees").cloned().unwrap_or_else(|| json!([]))
        }

        async fn post(&self, body: Vec<u8>) -> (StatusCode, Value) {
            let store = JsonStore::open(&self.config.db_path).await.unwrap();
            let app = test::init_service(
                App::new()
                    .app_data(web::Data::new(store))
                    .app_data(web::Data::new(self.config.clone()))
                    .configure(handlers::configure),
            )
            .await;

            let req = test::TestRequest::post()
                .uri("/employees")
                .insert_header((
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                ))
                .set_payload(body)
                .to_request();

            let resp = test::call_service(&app, req).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }
    }

    #[actix_web::test]
    async fn valid_submission_is_stored_with_image_and_timestamp() {
        let harness = Harness::new(1024);
        let (status, body) = harness.post(multipart_body(&valid_fields(), photo())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Al");
        assert_eq!(body["courses"], json!(["Math"]));
        assert!(body["id"].is_string());

        let created_at = body["createdAt"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
        assert!(created_at.ends_with('Z'));

        let image = body["imageFilename"].as_str().unwrap();
        assert!(image.ends_with("_photo.png"));
        let stored = harness.config.upload.upload_dir.join(image);
        assert!(stored.is_file());
        assert_eq!(std::fs::read(stored).unwrap(), b"\x89PNG fake image bytes");

        assert_eq!(harness.employees(), json!([body]));
    }

    #[actix_web::test]
    async fn invalid_submission_returns_all_errors() {
        let harness = Harness::new(1024);
        let fields = [
            ("name", "A"),
            ("email", "not-an-email"),
            ("designation", "E"),
            ("gender", "Other"),
        ];
        let (status, body) = harness.post(multipart_body(&fields, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "name": "The name must be at least 2 characters",
                "email": "A valid email is required",
                "designation": "Designation must be at least 2 characters",
                "gender": "Gender must be 'Male' or 'Female'",
                "courses": "At least one course must be selected",
                "image": "Image is required",
            })
        );
        assert_eq!(harness.employees(), json!([]));
    }

    #[actix_web::test]
    async fn rejected_submission_does_not_keep_the_image() {
        let harness = Harness::new(1024);
        let mut fields = valid_fields();
        fields.push(("mobileNo", "12345"));

        let (status, body) = harness.post(multipart_body(&fields, photo())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "mobileNo": "Mobile number must be at least 10 digits" }));
        assert!(harness.stored_images().is_empty());
    }

    #[actix_web::test]
    async fn price_is_stored_as_a_number() {
        let harness = Harness::new(1024);
        let mut fields = valid_fields();
        fields.push(("price", "42.50"));
        fields.push(("mobileNo", "1234567890"));

        let (status, body) = harness.post(multipart_body(&fields, photo())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["price"], json!(42.5));
        assert_eq!(body["mobileNo"], "1234567890");
    }

    #[actix_web::test]
    async fn repeated_courses_are_kept_as_a_list() {
        let harness = Harness::new(1024);
        let mut fields = valid_fields();
        fields.push(("courses", "Physics"));

        let (status, body) = harness.post(multipart_body(&fields, photo())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["courses"], json!(["Math", "Physics"]));
    }

    #[actix_web::test]
    async fn client_cannot_supply_derived_fields() {
        let harness = Harness::new(1024);
        let mut fields = valid_fields();
        fields.push(("imageFilename", "spoofed.png"));
        fields.push(("createdAt", "1999-01-01T00:00:00.000Z"));

        let (status, body) = harness.post(multipart_body(&fields, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "image": "Image is required" }));
    }

    #[actix_web::test]
    async fn oversized_image_is_rejected_and_removed() {
        // The text fields add up to exactly 20 bytes; the image is 21.
        let harness = Harness::new(20);
        let (status, body) = harness.post(multipart_body(&valid_fields(), photo())).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].as_str().unwrap().contains("limit"));
        assert!(harness.stored_images().is_empty());
        assert_eq!(harness.employees(), json!([]));
    }

    #[actix_web::test]
    async fn text_fields_share_one_size_budget() {
        // Each field fits on its own; together they exceed the limit.
        let harness = Harness::new(16);
        let (status, body) = harness.post(multipart_body(&valid_fields(), None)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].is_string());
        assert_eq!(harness.employees(), json!([]));
    }

    #[actix_web::test]
    async fn empty_file_input_counts_as_no_image() {
        let harness = Harness::new(1024);
        let empty = Some(TestFile {
            field: "image",
            filename: "",
            content: b"",
        });

        let (status, body) = harness.post(multipart_body(&valid_fields(), empty)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "image": "Image is required" }));
        assert!(harness.stored_images().is_empty());
    }

    #[actix_web::test]
    async fn non_utf8_text_field_is_a_bad_request() {
        let harness = Harness::new(1024);
        let mut body = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n",
            BOUNDARY
        )
        .into_bytes();
        body.extend_from_slice(b"\xff\xfe\xfd\r\n");
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let (status, body) = harness.post(body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("UTF-8"));
        assert_eq!(harness.employees(), json!([]));
    }

    #[actix_web::test]
    async fn concurrent_uploads_keep_their_own_images() {
        let harness = Harness::new(1024);
        let store = JsonStore::open(&harness.config.db_path).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .app_data(web::Data::new(harness.config.clone()))
                .configure(handlers::configure),
        )
        .await;

        let requests = (0..40).map(|i| {
            let mut fields = valid_fields();
            if i % 2 == 1 {
                fields.push(("mobileNo", "123"));
            }
            let req = test::TestRequest::post()
                .uri("/employees")
                .insert_header((
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                ))
                .set_payload(multipart_body(&fields, photo()))
                .to_request();
            test::call_service(&app, req)
        });
        let responses = join_all(requests).await;

        let mut created = 0;
        for resp in responses {
            match resp.status() {
                StatusCode::CREATED => created += 1,
                status => assert_eq!(status, StatusCode::BAD_REQUEST),
            }
        }
        assert_eq!(created, 20);

        let employees = harness.employees();
        let names: HashSet<&str> = employees
            .as_array()
            .unwrap()
            .iter()
            .map(|employee| employee["imageFilename"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 20);
        for name in &names {
            assert!(harness.config.upload.upload_dir.join(name).is_file(), "missing {}", name);
        }
        assert_eq!(harness.stored_images().len(), 20);
    }
}
