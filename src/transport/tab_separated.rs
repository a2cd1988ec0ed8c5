/// Splits a TabSeparated body into rows of unescaped fields.
pub fn parse(body: &str) -> Vec<Vec<String>> {
    body.lines()
        .map(|line| line.split('\t').map(unescape).collect())
        .collect()
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_rows_and_fields() {
        assert_eq!(
            parse("1\tfoo\n2\tbar\n"),
            vec![vec!["1", "foo"], vec!["2", "bar"]]
        );
    }

    #[test]
    fn empty_body_has_no_rows() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn unescapes_special_characters() {
        assert_eq!(
            parse("a\\tb\tline\\nbreak\tit\\'s\tback\\\\slash\n"),
            vec![vec!["a\tb", "line\nbreak", "it's", "back\\slash"]]
        );
    }

    #[test]
    fn escaped_backslash_before_letter_stays_literal() {
        assert_eq!(parse("C:\\\\new\n"), vec![vec!["C:\\new"]]);
    }
}
