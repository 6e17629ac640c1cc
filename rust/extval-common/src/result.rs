pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// Checks a caller-supplied argument, returning `InvalidArgument` naming the
/// failed condition.
#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_arg(result, stringify!($name), stringify!($expr))?;
    }};
}

/// Checks a property of persisted or downloaded data, returning `InvalidFormat`.
#[macro_export]
macro_rules! verify_data {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_data(result, stringify!($name), stringify!($expr))?;
    }};
}

#[inline]
pub fn verify_arg(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_arg(name, condition)
    }
}

#[inline]
pub fn verify_data(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_format(name, condition)
    }
}

#[cold]
pub fn invalid_arg(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidArgument {
        name: name.to_string(),
        message: format!("expected `{condition}`"),
    }
    .into())
}

#[cold]
pub fn invalid_format(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidFormat {
        element: name.to_string(),
        message: format!("expected `{condition}`"),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    fn check_header(magic: &[u8]) -> crate::Result<()> {
        verify_data!(magic, magic == b"XTHT");
        Ok(())
    }

    fn check_interval(secs: u64) -> crate::Result<()> {
        verify_arg!(update_interval, secs > 0);
        Ok(())
    }

    #[test]
    fn test_verify_macros() {
        assert!(check_header(b"XTHT").is_ok());
        match check_header(b"ABCD").unwrap_err().into_kind() {
            ErrorKind::InvalidFormat { element, message } => {
                assert_eq!(element, "magic");
                assert!(message.contains("magic == b\"XTHT\""));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }

        assert!(check_interval(60).is_ok());
        match check_interval(0).unwrap_err().into_kind() {
            ErrorKind::InvalidArgument { name, .. } => assert_eq!(name, "update_interval"),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
