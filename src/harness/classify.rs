use super::types::{FailureKind, Outcome, ScriptError};

/// Map a script's result to the run outcome.
///
/// Timeouts are recognised by their declared kind; every other error is
/// unclassified.
pub fn classify(result: Result<(), ScriptError>) -> Outcome {
    let err = match result {
        Ok(()) => return Outcome::Success,
        Err(err) => err,
    };
    match err.kind() {
        FailureKind::Timeout => match err.into_timeout() {
            Ok(timeout) => Outcome::ClassifiedTimeout(timeout),
            Err(err) => Outcome::UnclassifiedFailure(err),
        },
        FailureKind::Other => Outcome::UnclassifiedFailure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use crate::harness::types::{CapabilityError, TimeoutFailure, TimeoutKind};

    #[test]
    fn test_success() {
        assert!(matches!(classify(Ok(())), Outcome::Success));
    }

    #[test]
    fn test_timeout_is_classified() {
        let timeout = TimeoutFailure {
            kind: TimeoutKind::Motion,
            expected: "<whole frame>".to_string(),
            timeout_secs: 10,
            screenshot: None,
        };
        let outcome = classify(Err(CapabilityError::from(timeout).into()));
        match outcome {
            Outcome::ClassifiedTimeout(t) => assert_eq!(t.timeout_secs, 10),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_message_mentioning_timeout_is_not_classified() {
        let outcome = classify(Err(ScriptError::msg(
            "Didn't find match for 'logo' after 5 seconds.",
        )));
        assert!(matches!(outcome, Outcome::UnclassifiedFailure(_)));

        let err: ScriptError =
            CapabilityError::from(ControlError::Closed("vr".to_string())).into();
        assert!(matches!(classify(Err(err)), Outcome::UnclassifiedFailure(_)));
    }
}
