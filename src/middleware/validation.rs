use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Upper bound for request bodies; every payload this API accepts is a small JSON object.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Early rejection of requests the JSON handlers could never accept.
///
/// - `413` when `Content-Length` exceeds [`MAX_BODY_BYTES`].
/// - `415` when a `POST`/`PUT` carries a body that is not `application/json`.
///
/// `DefaultBodyLimit` still guards bodies sent without a length header.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    let content_length = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = content_length {
        if length > MAX_BODY_BYTES {
            return reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("Request body exceeds maximum size of {} bytes", MAX_BODY_BYTES),
            );
        }
    }

    if matches!(req.method(), &Method::POST | &Method::PUT) && content_length.unwrap_or(0) > 0 {
        let content_type = req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
        if !is_json_content_type(content_type) {
            tracing::debug!("Rejected {} with content type {:?}", req.method(), content_type);
            return reject(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                "Request body must be application/json".to_string(),
            );
        }
    }

    next.run(req).await
}

fn is_json_content_type(value: Option<&str>) -> bool {
    value
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

fn reject(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "error": { "code": code, "message": message },
            "status": status.as_u16(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_content_type_detection() {
        assert!(is_json_content_type(Some("application/json")));
        assert!(is_json_content_type(Some("application/json; charset=utf-8")));
        assert!(is_json_content_type(Some("Application/JSON")));
        assert!(is_json_content_type(Some("application/merge-patch+json")));
        assert!(!is_json_content_type(Some("application/x-www-form-urlencoded")));
        assert!(!is_json_content_type(Some("text/plain")));
        assert!(!is_json_content_type(None));
    }
}
