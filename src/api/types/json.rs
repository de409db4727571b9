//! JSON extractor whose rejections use the API error envelope

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::de::DeserializeOwned;

use super::error::{ApiErrorDetail, ApiErrorResponse, ApiErrorType};

/// `axum::Json` replacement whose rejections are rendered as `ApiErrorResponse`
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// JSON rejection error that returns API error format
#[derive(Debug)]
pub struct JsonRejection {
    status: StatusCode,
    message: String,
}

impl IntoResponse for JsonRejection {
    fn into_response(self) -> Response {
        let response = ApiErrorResponse {
            error: ApiErrorDetail {
                message: self.message,
                error_type: ApiErrorType::InvalidRequestError,
                param: None,
                code: Some("invalid_json".to_string()),
            },
        };

        (self.status, AxumJson(response)).into_response()
    }
}

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = JsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match AxumJson::<T>::from_request(req, state).await {
            Ok(AxumJson(value)) => Ok(Json(value)),
            Err(rejection) => {
                let message = format_rejection_message(&rejection);
                let status = rejection.status();

                Err(JsonRejection { status, message })
            }
        }
    }
}

/// Format the rejection message to be more user-friendly
fn format_rejection_message(rejection: &axum::extract::rejection::JsonRejection) -> String {
    use axum::extract::rejection::JsonRejection::*;

    match rejection {
        JsonDataError(err) => {
            // Extract the serde error message which contains field info
            let msg = err.body_text();
            format!("Invalid JSON data: {}", msg)
        }
        JsonSyntaxError(err) => {
            format!("Invalid JSON syntax: {}", err.body_text())
        }
        MissingJsonContentType(_) => {
            "Missing Content-Type header. Expected 'application/json'.".to_string()
        }
        BytesRejection(err) => {
            format!("Failed to read request body: {}", err.body_text())
        }
        _ => "Invalid JSON request".to_string(),
    }
}

impl<T> IntoResponse for Json<T>
where
    T: serde::Serialize,
{
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TriggerBody {
        request_id: String,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_extracts_valid_body() {
        let Json(body) = Json::<TriggerBody>::from_request(json_request(r#"{"request_id": "req-1"}"#), &())
            .await
            .unwrap();
        assert_eq!(body.request_id, "req-1");
    }

    #[tokio::test]
    async fn test_missing_field_is_rejected_as_api_error() {
        let rejection = Json::<TriggerBody>::from_request(json_request("{}"), &())
            .await
            .unwrap_err();

        assert_eq!(rejection.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(rejection.message.starts_with("Invalid JSON data"));
        assert!(rejection.message.contains("request_id"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_rejected() {
        let rejection = Json::<TriggerBody>::from_request(json_request("{not json"), &())
            .await
            .unwrap_err();

        assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
        assert_eq!(rejection.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
