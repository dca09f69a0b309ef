//! Unwrap helper for test code, with `#[track_caller]` for accurate panic
//! locations.

/// Unwrap an `Option`, panicking with a custom message if `None`.
///
/// # Example
///
/// ```rust
/// use cadence_test_helpers::must_some;
///
/// assert_eq!(must_some(Some(3), "value expected"), 3);
/// ```
///
/// # Panics
///
/// Panics if the option is `None`, with the provided message.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_must_some_returns_value() {
        assert_eq!(must_some(Some("fine"), "unused"), "fine");
    }

    #[test]
    #[should_panic(expected = "must_some: missing")]
    fn test_must_some_none_panics() {
        let _: u8 = must_some(None, "missing");
    }
}
