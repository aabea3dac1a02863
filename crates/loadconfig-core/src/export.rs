//! Shell export of a configuration
//!
//! Each top-level key becomes one `export KEY="value"` line that a POSIX
//! shell can `eval`.
//!
//! `"` and `\` inside a value are backslash-escaped, so a value can never
//! close its own quotes. `$` is passed through untouched and still expands
//! when the line is evaluated.

use crate::odict::Odict;
use crate::value::Value;

/// Render every top-level key as an `export` line.
///
/// Keys are upper-cased with spaces turned into underscores. Sequences are
/// flattened and each element shell-quoted; mappings use their flow YAML
/// form. There is no trailing newline.
pub fn export(map: &Odict) -> String {
    map.iter()
        .map(|(key, value)| {
            format!(
                "export {}=\"{}\"",
                key.to_uppercase().replace(' ', "_"),
                escape(&export_value(value))
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn export_value(value: &Value) -> String {
    match value {
        Value::Sequence(_) | Value::Set(_) => {
            let mut flat = Vec::new();
            flatten(value, &mut flat);
            flat.iter()
                .map(|item| shell_quote(item))
                .collect::<Vec<_>>()
                .join(" ")
        }
        other => other.to_string(),
    }
}

fn flatten(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Sequence(items) => items.iter().for_each(|item| flatten(item, out)),
        Value::Set(items) => out.extend(items.iter().cloned()),
        other => out.push(other.to_string()),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Quote a string for a POSIX shell.
///
/// Strings made only of safe characters are returned unchanged; anything
/// else is wrapped in single quotes.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r#"'"'"'"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalar() {
        let d = Odict::parse("activity: hanggliding").unwrap();
        assert_eq!(export(&d), r#"export ACTIVITY="hanggliding""#);
    }

    #[test]
    fn test_list_is_flattened_and_quoted() {
        let d = Odict::parse(r#"Outdoor activity: [hike, bike, "scuba dive", run]"#).unwrap();
        assert_eq!(
            export(&d),
            r#"export OUTDOOR_ACTIVITY="hike bike 'scuba dive' run""#
        );

        let d = Odict::parse("tools: [a, [b, [c d]], 3]").unwrap();
        assert_eq!(export(&d), r#"export TOOLS="a b 'c d' 3""#);
    }

    #[test]
    fn test_mapping_uses_flow_form() {
        let d = Odict::parse("Outdoor activity: {mountain: bike, ocean: scuba dive}").unwrap();
        assert_eq!(
            export(&d),
            r#"export OUTDOOR_ACTIVITY="{mountain: bike, ocean: scuba dive}""#
        );
    }

    #[test]
    fn test_blank_and_typed_values() {
        let d = Odict::parse("a:\nb: ''\nc: true\nd: 1.5\ne: 7").unwrap();
        assert_eq!(
            export(&d),
            [
                r#"export A="""#,
                r#"export B="""#,
                r#"export C="true""#,
                r#"export D="1.5""#,
                r#"export E="7""#,
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_escapes_double_quotes() {
        let mut d = Odict::new();
        d.set("greeting", r#"say "hi" \o/"#);
        assert_eq!(export(&d), r#"export GREETING="say \"hi\" \\o/""#);
    }

    #[test]
    fn test_dollar_is_left_alone() {
        let d = Odict::parse("data_file: $data_path/data.txt").unwrap();
        assert_eq!(export(&d), r#"export DATA_FILE="$data_path/data.txt""#);
    }

    #[test]
    fn test_empty() {
        assert_eq!(export(&Odict::new()), "");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-file_1.txt"), "plain-file_1.txt");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("scuba dive"), "'scuba dive'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
    }
}
