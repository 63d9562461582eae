//! Maps `Box<dyn Error>` from the physical-layer traits to typed `ServoError`.
//!
//! The traits in `servo_traits` use `Box<dyn Error + Send + Sync>` so any
//! front-end can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `servo_frontend::FrontendError`.

use crate::error::ServoError;

/// Map a trait-boundary error to a typed `ServoError`.
///
/// Known front-end error types are downcast first; anything else is reported
/// as a generic frontend error carrying its message.
pub fn map_frontend_error(e: &(dyn std::error::Error + 'static)) -> ServoError {
    #[cfg(feature = "frontend-errors")]
    {
        if let Some(fe) = e.downcast_ref::<servo_frontend::error::FrontendError>() {
            return match fe {
                servo_frontend::error::FrontendError::Io(_) => ServoError::Hardware(fe.to_string()),
                other => ServoError::HardwareFault(other.to_string()),
            };
        }
    }

    ServoError::Hardware(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_keep_their_message() {
        let e: Box<dyn std::error::Error + Send + Sync> = "lane 3 stuck".into();
        assert_eq!(
            map_frontend_error(&*e),
            ServoError::Hardware("lane 3 stuck".to_string())
        );
    }

    #[cfg(feature = "frontend-errors")]
    #[test]
    fn frontend_faults_are_typed() {
        let e: Box<dyn std::error::Error + Send + Sync> =
            Box::new(servo_frontend::error::FrontendError::Framing("sync glitch".into()));
        assert!(matches!(map_frontend_error(&*e), ServoError::HardwareFault(_)));
    }
}
