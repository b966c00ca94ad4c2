use validator::{Validate, ValidationErrors};

use crate::api::errors::ApiError;

pub(crate) fn validate_payload<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(flatten_errors(&errors)))
}

fn flatten_errors(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| match &error.message {
                Some(message) => format!("{field}: {message}"),
                None => format!("{field}: invalid value"),
            })
        })
        .collect();

    parts.sort();

    if parts.is_empty() {
        "Invalid request payload".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Payload {
        #[validate(length(min = 3, message = "too short"))]
        name: String,
    }

    #[test]
    fn validation_errors_become_bad_request() {
        let result = validate_payload(&Payload { name: "ab".to_string() });
        match result {
            Err(ApiError::BadRequest(detail)) => assert!(detail.contains("too short")),
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn valid_payload_passes() {
        assert!(validate_payload(&Payload { name: "abc".to_string() }).is_ok());
    }
}
