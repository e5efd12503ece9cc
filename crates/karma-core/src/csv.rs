//! Row codec for bulk transfer.
//!
//! One record per row, three ordered fields: `name,added,subtracted`.
//! Fields containing a delimiter, quote, or line break are wrapped in
//! double quotes with embedded quotes doubled. Field order and the
//! integer parse of the counters are part of the contract.

use crate::error::{CoreError, Result};

/// Encode one record as a row, including the trailing newline.
pub fn write_row(name: &str, added: u64, subtracted: u64) -> String {
    format!("{},{},{}\n", quote_field(name), added, subtracted)
}

/// Parse a single row into `(name, added, subtracted)`.
pub fn parse_row(row: &str) -> Result<(String, u64, u64)> {
    let mut rows = parse_rows(row)?;
    if rows.len() != 1 {
        return Err(CoreError::MalformedRow(format!(
            "expected one row, found {}",
            rows.len()
        )));
    }
    Ok(rows.remove(0))
}

/// Parse a whole export into records.
///
/// Quoted fields may span physical lines, so this walks the full text
/// rather than splitting on newlines. A trailing newline is fine;
/// blank rows between records are not.
pub fn parse_rows(text: &str) -> Result<Vec<(String, u64, u64)>> {
    let mut records = Vec::new();
    let mut chars = text.chars().peekable();

    while chars.peek().is_some() {
        let fields = parse_record(&mut chars)?;
        if fields.len() != 3 {
            return Err(CoreError::MalformedRow(format!(
                "expected 3 fields, found {}",
                fields.len()
            )));
        }
        let added = parse_count(&fields[1])?;
        let subtracted = parse_count(&fields[2])?;
        records.push((fields[0].clone(), added, subtracted));
    }

    Ok(records)
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn parse_count(field: &str) -> Result<u64> {
    field
        .parse::<u64>()
        .map_err(|_| CoreError::MalformedRow(format!("not a count: {:?}", field)))
}

/// Parse one record's fields, consuming the row terminator.
fn parse_record(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Vec<String>> {
    let mut fields = Vec::new();

    loop {
        let field = if chars.peek() == Some(&'"') {
            chars.next();
            parse_quoted(chars)?
        } else {
            parse_bare(chars)
        };
        fields.push(field);

        match chars.next() {
            Some(',') => continue,
            Some('\n') | None => break,
            Some('\r') => {
                // Consume the LF of a CRLF terminator.
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                break;
            }
            Some(c) => {
                return Err(CoreError::MalformedRow(format!(
                    "unexpected character after field: {:?}",
                    c
                )))
            }
        }
    }

    Ok(fields)
}

fn parse_bare(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut field = String::new();
    while let Some(&c) = chars.peek() {
        if c == ',' || c == '\n' || c == '\r' {
            break;
        }
        field.push(c);
        chars.next();
    }
    field
}

fn parse_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String> {
    let mut field = String::new();
    loop {
        match chars.next() {
            Some('"') => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    return Ok(field);
                }
            }
            Some(c) => field.push(c),
            None => {
                return Err(CoreError::MalformedRow(
                    "unterminated quoted field".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_round_trip() {
        let row = write_row("foo", 3, 1);
        assert_eq!(row, "foo,3,1\n");
        assert_eq!(parse_row(&row).unwrap(), ("foo".to_string(), 3, 1));
    }

    #[test]
    fn test_comma_in_name_is_quoted() {
        let row = write_row("foo, bar", 2, 0);
        assert_eq!(row, "\"foo, bar\",2,0\n");
        assert_eq!(parse_row(&row).unwrap(), ("foo, bar".to_string(), 2, 0));
    }

    #[test]
    fn test_quote_in_name_is_doubled() {
        let row = write_row("the \"best\"", 1, 1);
        assert_eq!(row, "\"the \"\"best\"\"\",1,1\n");
        assert_eq!(parse_row(&row).unwrap(), ("the \"best\"".to_string(), 1, 1));
    }

    #[test]
    fn test_newline_in_name_spans_lines() {
        let row = write_row("two\nlines", 5, 2);
        assert_eq!(parse_row(&row).unwrap(), ("two\nlines".to_string(), 5, 2));
    }

    #[test]
    fn test_multiple_rows() {
        let text = format!("{}{}", write_row("foo", 3, 1), write_row("bar", 0, 2));
        let rows = parse_rows(&text).unwrap();
        assert_eq!(
            rows,
            vec![("foo".to_string(), 3, 1), ("bar".to_string(), 0, 2)]
        );
    }

    #[test]
    fn test_crlf_rows_accepted() {
        let rows = parse_rows("foo,3,1\r\nbar,0,2\r\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, "bar");
    }

    #[test]
    fn test_malformed_rows_rejected() {
        assert!(parse_rows("foo,3\n").is_err());
        assert!(parse_rows("foo,3,1,9\n").is_err());
        assert!(parse_rows("foo,three,1\n").is_err());
        assert!(parse_rows("foo,-1,1\n").is_err());
        assert!(parse_rows("\"unterminated,3,1\n").is_err());
    }

    proptest! {
        #[test]
        fn prop_row_round_trip(
            name in "\\PC{0,30}",
            added in 0u64..1_000_000,
            subtracted in 0u64..1_000_000,
        ) {
            let row = write_row(&name, added, subtracted);
            let parsed = parse_row(&row).unwrap();
            prop_assert_eq!(parsed, (name, added, subtracted));
        }

        #[test]
        fn prop_parse_never_panics(text in ".*") {
            let _ = parse_rows(&text);
        }
    }
}
