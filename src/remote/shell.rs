// ABOUTME: POSIX shell quoting for paths and tags embedded in remote commands.
// ABOUTME: Wraps values in single quotes, escaping embedded quotes.

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_and_embedded_quotes() {
        assert_eq!(shell_quote("/opt/scion"), "'/opt/scion'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
