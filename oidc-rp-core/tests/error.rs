use http_body_util::BodyExt;
use oidc_rp_core::HttpError;
use axum::http::StatusCode;
use axum::response::IntoResponse;

async fn error_parts(err: HttpError) -> (StatusCode, serde_json::Value) {
    let resp = err.into_response();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

#[tokio::test]
async fn service_unavailable_503() {
    let (status, body) =
        error_parts(HttpError::ServiceUnavailable("try again later".into())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "try again later");
}

#[tokio::test]
async fn unauthorized_401() {
    let (status, body) = error_parts(HttpError::Unauthorized("nope".into())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "nope");
}

#[test]
fn display_formatting() {
    assert_eq!(
        HttpError::Unauthorized("x".into()).to_string(),
        "Unauthorized: x"
    );
    assert_eq!(
        HttpError::ServiceUnavailable("y".into()).to_string(),
        "Service Unavailable: y"
    );
}
