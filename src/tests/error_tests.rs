#[cfg(test)]
mod tests {
    use crate::error::{validation, AppError, AppResult, OptionExt};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;

    async fn envelope(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::BadRequest("Invalid input".to_string());
        assert_eq!(format!("{}", error), "Bad request: Invalid input");

        let error = AppError::NotFound("Mine not found".to_string());
        assert_eq!(format!("{}", error), "Not found: Mine not found");

        let error = AppError::RateLimited { retry_after_seconds: 60 };
        assert_eq!(format!("{}", error), "Rate limited. Retry after 60 seconds");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Constraint("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Internal(anyhow::anyhow!("x")), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::RateLimited { retry_after_seconds: 1 }, StatusCode::TOO_MANY_REQUESTS),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error);
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_constraint_envelope_carries_message() {
        let (status, body) = envelope(AppError::Constraint(
            "Error: Date ranges for Mine Manager must not overlap.".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "CONSTRAINT_VIOLATION");
        assert_eq!(body["error"]["message"], "Error: Date ranges for Mine Manager must not overlap.");
        assert_eq!(body["status"], 400);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let (status, body) = envelope(AppError::Database("relation \"mine\" does not exist".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "A database error occurred");
        assert!(body["error"]["details"]["error_id"].is_string());
        assert!(!body.to_string().contains("relation"));
    }

    #[tokio::test]
    async fn test_validation_error_details() {
        let (status, body) = envelope(AppError::ValidationError {
            field: "due_date".to_string(),
            message: "Missing required parameter".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "due_date");
    }

    #[test]
    fn test_from_sqlx_error() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
        assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::ServiceUnavailable(_)));
        assert!(matches!(AppError::from(sqlx::Error::PoolClosed), AppError::Database(_)));
    }

    #[test]
    fn test_option_ext() {
        let result: AppResult<i32> = Some(42).ok_or_not_found("Mine");
        assert_eq!(result.unwrap(), 42);

        let result: AppResult<i32> = None::<i32>.ok_or_not_found("Mine Report");
        match result.unwrap_err() {
            AppError::NotFound(msg) => assert_eq!(msg, "Mine Report not found"),
            other => panic!("Expected NotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_guid_validation() {
        let guid = "4fc5ab6c-8b41-4f7c-9a4b-1f2b3c4d5e6f";
        assert_eq!(validation::parse_guid(guid, "Mine").unwrap().to_string(), guid);
        assert!(matches!(validation::parse_guid("nope", "Mine"), Err(AppError::NotFound(m)) if m == "Mine not found"));
        assert!(matches!(
            validation::parse_field_guid("nope", "party_guid"),
            Err(AppError::ValidationError { field, .. }) if field == "party_guid"
        ));
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(validation::require(Some(2019), "submission_year").unwrap(), 2019);
        assert!(validation::require::<i32>(None, "submission_year").is_err());
        assert!(validation::require_non_empty(Some("  ".to_string()), "mine_guid").is_err());
        assert_eq!(validation::require_non_empty(Some("MMG".to_string()), "code").unwrap(), "MMG");
    }
}
