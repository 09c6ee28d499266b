//! Identifier quoting for SQLite.

/// Wraps `name` in double quotes, doubling any embedded quote.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Replaces bare references to `table` in `sql` with its quoted form.
///
/// This is a narrow, best-effort substitution for one known table name, not
/// an identifier-aware rewrite. Matching is ASCII case-insensitive on whole
/// words; occurrences inside string literals or quoted identifiers, and
/// occurrences qualified by a schema prefix (`main.users`), are left alone.
/// Aliases or other spellings of the table are not recognised.
pub fn qualify_table(sql: &str, table: &str) -> String {
    if table.is_empty() {
        return sql.to_owned();
    }

    let bytes = sql.as_bytes();
    let needle = table.as_bytes();
    let quoted = quote_identifier(table);
    let mut out = String::with_capacity(sql.len() + 2);
    let mut copied_up_to = 0;
    let mut closing: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];

        if let Some(close) = closing {
            if byte == close {
                closing = None;
            }
            i += 1;
            continue;
        }

        match byte {
            b'\'' | b'"' | b'`' => {
                closing = Some(byte);
                i += 1;
                continue;
            }
            b'[' => {
                closing = Some(b']');
                i += 1;
                continue;
            }
            _ => {}
        }

        let at_word_start = i == 0 || !is_ident_byte(bytes[i - 1]);
        let prefixed = i > 0 && bytes[i - 1] == b'.';
        let end = i + needle.len();
        if at_word_start
            && !prefixed
            && end <= bytes.len()
            && bytes[i..end].eq_ignore_ascii_case(needle)
            && (end == bytes.len() || !is_ident_byte(bytes[end]))
        {
            out.push_str(&sql[copied_up_to..i]);
            out.push_str(&quoted);
            copied_up_to = end;
            i = end;
            continue;
        }

        i += 1;
    }

    out.push_str(&sql[copied_up_to..]);
    out
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}
