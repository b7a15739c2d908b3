use std::{sync::Arc, time::Duration};

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use npo_github::{config::AppCredential, github::GitHubClient, provisioner::RepositoryProvisioner};
use serde::Deserialize;
use serde_json::json;
use wiremock::{
    Match, Mock, MockServer, Request, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

const APP_ID: u64 = 1005976;
const INSTALLATION_ID: u64 = 55276178;
const INSTALLATION_TOKEN: &str = "ghs_installation";

#[derive(Deserialize)]
struct Claims {
    iss: String,
}

/// Matches requests carrying an App JWT signed by the fixture key.
struct SignedByApp;

impl Match for SignedByApp {
    fn matches(&self, request: &Request) -> bool {
        let Some(token) = request
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        else {
            return false;
        };
        let key = DecodingKey::from_rsa_pem(include_bytes!("fixtures/app_key.pub.pem")).unwrap();
        jsonwebtoken::decode::<Claims>(token, &key, &Validation::new(Algorithm::RS256))
            .is_ok_and(|data| data.claims.iss == APP_ID.to_string())
    }
}

fn provisioner(server: &MockServer) -> RepositoryProvisioner {
    let credential = Arc::new(AppCredential::new(
        APP_ID,
        INSTALLATION_ID,
        include_str!("fixtures/app_key.pem"),
    ));
    let client = GitHubClient::new(server.uri(), server.uri(), Duration::from_secs(5));
    RepositoryProvisioner::new(credential, Arc::new(client), "org", "https://github.com")
}

async fn mount_app_auth(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/app/installations/{INSTALLATION_ID}")))
        .and(SignedByApp)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": INSTALLATION_ID,
            "permissions": {"administration": "write", "metadata": "read"}
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/app/installations/{INSTALLATION_ID}/access_tokens")))
        .and(SignedByApp)
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": INSTALLATION_TOKEN,
            "expires_at": "2026-10-19T21:00:00Z"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn provisions_repository_over_http() {
    let server = MockServer::start().await;
    mount_app_auth(&server).await;

    Mock::given(method("GET"))
        .and(path("/repos/org/demo-repo"))
        .and(header("authorization", "Bearer ghs_installation"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/orgs/org/repos"))
        .and(header("authorization", "Bearer ghs_installation"))
        .and(body_json(json!({
            "name": "demo-repo",
            "description": "test",
            "private": false
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "name": "demo-repo",
            "html_url": "https://github.com/org/demo-repo"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = provisioner(&server)
        .provision("demo-repo", "test", "Helping Hands")
        .await
        .unwrap();

    assert_eq!(record.repository_url(), Some("https://github.com/org/demo-repo"));
    assert_eq!(record.organization, "Helping Hands");

    let calls: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| format!("{} {}", request.method, request.url.path()))
        .collect();
    assert_eq!(
        calls,
        vec![
            "GET /app/installations/55276178",
            "POST /app/installations/55276178/access_tokens",
            "GET /repos/org/demo-repo",
            "POST /orgs/org/repos",
        ]
    );
}

#[tokio::test]
async fn existing_repository_is_never_created_over_http() {
    let server = MockServer::start().await;
    mount_app_auth(&server).await;

    Mock::given(method("GET"))
        .and(path("/repos/org/demo-repo"))
        .and(header("authorization", "Bearer ghs_installation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "demo-repo",
            "html_url": "https://github.com/org/demo-repo"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/orgs/org/repos"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = provisioner(&server)
        .provision("demo-repo", "test", "Helping Hands")
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), http::StatusCode::CONFLICT);
    assert_eq!(
        err.to_string(),
        "repository already exists at https://github.com/org/demo-repo"
    );
}
