//! Field validation for inbound service descriptions.

use crate::types::ServiceInfo;

pub const MAX_SER_NAME_LEN: usize = 128;
pub const MAX_VERSION_LEN: usize = 32;
pub const MAX_TRANSPORT_ID_LEN: usize = 64;
pub const MAX_LIVENESS_INTERVAL: u32 = 2_147_483_646;

/// A field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} has invalid format")]
    Format { field: &'static str },
    #[error("livenessInterval must not exceed {max}")]
    LivenessOutOfRange { max: u32 },
}

/// `[A-Za-z0-9][A-Za-z0-9_.-]*`
fn is_name(value: &str) -> bool {
    value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// `[A-Za-z0-9_-]+`
fn is_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

fn check_text(
    field: &'static str,
    value: &str,
    max: usize,
    well_formed: fn(&str) -> bool,
) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    if !well_formed(value) {
        return Err(ValidationError::Format { field });
    }
    Ok(())
}

/// Validates the client-supplied fields of `info`.
///
/// # Errors
///
/// Returns the first field that fails its length or format rule.
pub fn validate_service_info(info: &ServiceInfo) -> Result<(), ValidationError> {
    if info.ser_name.is_empty() {
        return Err(ValidationError::Missing { field: "serName" });
    }
    check_text("serName", &info.ser_name, MAX_SER_NAME_LEN, is_name)?;

    if info.version.is_empty() {
        return Err(ValidationError::Missing { field: "version" });
    }
    check_text("version", &info.version, MAX_VERSION_LEN, is_name)?;

    if !info.transport_id.is_empty() {
        check_text("transportId", &info.transport_id, MAX_TRANSPORT_ID_LEN, is_id)?;
    }

    if info.serializer.is_none() {
        return Err(ValidationError::Missing { field: "serializer" });
    }

    if info.liveness_interval > MAX_LIVENESS_INTERVAL {
        return Err(ValidationError::LivenessOutOfRange {
            max: MAX_LIVENESS_INTERVAL,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SerializerType;

    fn valid() -> ServiceInfo {
        ServiceInfo {
            ser_name: "location-service".to_string(),
            version: "1.0.0".to_string(),
            serializer: Some(SerializerType::Json),
            ..ServiceInfo::default()
        }
    }

    #[test]
    fn accepts_minimal_service() {
        assert_eq!(validate_service_info(&valid()), Ok(()));
    }

    #[test]
    fn rejects_missing_name() {
        let info = ServiceInfo {
            ser_name: String::new(),
            ..valid()
        };
        assert_eq!(
            validate_service_info(&info),
            Err(ValidationError::Missing { field: "serName" })
        );
    }

    #[test]
    fn rejects_long_name() {
        let info = ServiceInfo {
            ser_name: "a".repeat(MAX_SER_NAME_LEN + 1),
            ..valid()
        };
        assert!(matches!(
            validate_service_info(&info),
            Err(ValidationError::TooLong { field: "serName", .. })
        ));
    }

    #[test]
    fn rejects_bad_version_format() {
        let info = ServiceInfo {
            version: "1.0 beta".to_string(),
            ..valid()
        };
        assert_eq!(
            validate_service_info(&info),
            Err(ValidationError::Format { field: "version" })
        );
    }

    #[test]
    fn transport_id_is_optional_but_checked() {
        let info = ServiceInfo {
            transport_id: "bad.id".to_string(),
            ..valid()
        };
        assert_eq!(
            validate_service_info(&info),
            Err(ValidationError::Format { field: "transportId" })
        );
    }

    #[test]
    fn character_rules() {
        assert!(is_name("location.v2_beta-1"));
        assert!(!is_name("-lead"));
        assert!(!is_name("has space"));
        assert!(!is_name("café"));
        assert!(!is_name(""));
        assert!(is_id("rest_1-a"));
        assert!(!is_id("rest.1"));
        assert!(!is_id(""));
    }

    #[test]
    fn requires_serializer() {
        let info = ServiceInfo {
            serializer: None,
            ..valid()
        };
        assert_eq!(
            validate_service_info(&info),
            Err(ValidationError::Missing { field: "serializer" })
        );
    }

    #[test]
    fn liveness_upper_bound() {
        let info = ServiceInfo {
            liveness_interval: MAX_LIVENESS_INTERVAL + 1,
            ..valid()
        };
        assert!(validate_service_info(&info).is_err());
    }
}
