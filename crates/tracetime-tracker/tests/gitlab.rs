//! GitLab client against a mock HTTP server

use std::time::Duration;

use mockito::Matcher;
use tracetime_tracker::{Credentials, GitLabClient, TrackerDirectory, TrackerError};
use tracetime_util::{GroupId, ProjectId};

fn client() -> GitLabClient {
    GitLabClient::new(Duration::from_secs(5)).unwrap()
}

fn per_page() -> Matcher {
    Matcher::UrlEncoded("per_page".into(), "100".into())
}

#[tokio::test]
async fn test_connection_resolves_user() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/user")
        .match_header("authorization", "Bearer tok-123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 42, "username": "ana", "name": "Ana"}"#)
        .create_async()
        .await;

    // Trailing slash on the base URL is tolerated
    let user = client()
        .test_connection(&Credentials::new(format!("{}/", server.url()), "tok-123"))
        .await
        .unwrap();
    assert_eq!(user.id, 42);
    assert_eq!(user.username, "ana");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_groups_and_projects() {
    let mut server = mockito::Server::new_async().await;
    let groups = server
        .mock("GET", "/api/v4/groups")
        .match_query(per_page())
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 1, "name": "Platform"}, {"id": 4, "name": "Mobile"}]"#)
        .create_async()
        .await;
    let projects = server
        .mock("GET", "/api/v4/groups/4/projects")
        .match_query(per_page())
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 30, "name": "app", "path": "app"}]"#)
        .create_async()
        .await;

    let credentials = Credentials::new(server.url(), "tok");
    let listed = client().list_groups(&credentials).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].name, "Mobile");

    let listed = client()
        .list_projects(&credentials, GroupId::new(4))
        .await
        .unwrap();
    assert_eq!(listed[0].id, 30);

    groups.assert_async().await;
    projects.assert_async().await;
}

#[tokio::test]
async fn test_list_issues_maps_titles() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/projects/17/issues")
        .match_query(per_page())
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 5, "iid": 1, "title": "First"}, {"id": 9, "iid": 2, "title": "Second"}]"#)
        .create_async()
        .await;

    let issues = client()
        .list_issues(&Credentials::new(server.url(), "tok"), ProjectId::new(17))
        .await
        .unwrap();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].id, 5);
    assert_eq!(issues[1].name, "Second");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_is_status_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/groups")
        .match_query(per_page())
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "401 Unauthorized"}"#)
        .create_async()
        .await;

    let result = client()
        .list_groups(&Credentials::new(server.url(), "bad"))
        .await;
    match result {
        Err(TrackerError::Status { status, url }) => {
            assert_eq!(status, 401);
            assert!(url.ends_with("/api/v4/groups"));
        }
        other => panic!("expected status error, got {:?}", other),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v4/groups")
        .match_query(per_page())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"not": "a list"}"#)
        .create_async()
        .await;

    let result = client().list_groups(&Credentials::new(server.url(), "tok")).await;
    assert!(matches!(result, Err(TrackerError::Decode(_))));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_base_url_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let result = client()
        .test_connection(&Credentials::new("gitlab.example.com", "tok"))
        .await;
    assert!(matches!(result, Err(TrackerError::InvalidUrl(_))));

    mock.assert_async().await;
}
