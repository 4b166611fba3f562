/// One row of a `code,consumer_player` pool file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRow {
    pub code: String,
    /// Player who already redeemed the code, if any.
    pub consumer: Option<String>,
}

pub const MAX_CODE_LEN: usize = 64;

/// Codes are short tokens: ASCII letters, digits, `-` and `_`.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
        .trim()
}

/// Parse a pool CSV. The `code,consumer_player` header is optional, blank
/// lines are ignored and anything after the second column is dropped.
/// Rows are returned in file order, including ones with an invalid code;
/// callers decide whether to skip them.
pub fn parse_pool_csv(text: &str) -> Vec<PoolRow> {
    let mut rows = Vec::new();
    let mut first = true;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let code = unquote(fields.next().unwrap_or_default());
        let consumer = fields.next().map(unquote).filter(|c| !c.is_empty());

        if first {
            first = false;
            if code.eq_ignore_ascii_case("code") {
                continue;
            }
        }

        rows.push(PoolRow {
            code: code.to_string(),
            consumer: consumer.map(str::to_string),
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_header_and_reads_consumers() {
        let rows = parse_pool_csv("code,consumer_player\nABC123,\nDEF456,player1");
        assert_eq!(
            rows,
            vec![
                PoolRow { code: "ABC123".into(), consumer: None },
                PoolRow { code: "DEF456".into(), consumer: Some("player1".into()) },
            ]
        );
    }

    #[test]
    fn headerless_files_keep_their_first_row() {
        let rows = parse_pool_csv("ABC123\r\n\r\nDEF456,\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "ABC123");
        assert_eq!(rows[1].consumer, None);
    }

    #[test]
    fn strips_quotes_and_whitespace() {
        let rows = parse_pool_csv("\"Code\",\"Consumer_Player\"\n \"XYZ-1\" , \"bob\" ");
        assert_eq!(rows, vec![PoolRow { code: "XYZ-1".into(), consumer: Some("bob".into()) }]);
    }

    #[test]
    fn code_validation() {
        assert!(is_valid_code("ABC_123-x"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code("has space"));
        assert!(!is_valid_code(&"a".repeat(MAX_CODE_LEN + 1)));
    }
}
