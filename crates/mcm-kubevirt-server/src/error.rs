use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mcm_kubevirt::Error as DriverError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Driver(DriverError::MachineNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Driver(
                DriverError::InvalidSpec(_)
                | DriverError::InvalidCredentials(_)
                | DriverError::InvalidProviderId(_)
                | DriverError::UserData(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Driver(DriverError::NetworkData(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Driver(_) => StatusCode::BAD_GATEWAY,
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use mcm_kubevirt::StoreError;

    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn maps_driver_errors_to_statuses() {
        assert_eq!(
            status_of(DriverError::MachineNotFound { name: "m".into() }.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DriverError::InvalidSpec("pvcSize is required".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DriverError::UserData("not a list".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DriverError::Client("bad kubeconfig".into()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(
                DriverError::Delete {
                    kind: "VirtualMachine",
                    name: "m".into(),
                    source: StoreError::Api("boom".into()),
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(DriverError::NetworkData("unsupported value".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
    }
}
