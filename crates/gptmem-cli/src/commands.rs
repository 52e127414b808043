use anyhow::{Context, Result};
use colored::Colorize;
use gptmem_db::{LogUpdate, MemorySummary};
use serde_json::Value;

const TEXT_WIDTH: usize = 50;

/// Parses `"0.1, 0.2 0.3"` into an embedding. An empty string is an empty
/// vector.
pub fn parse_embedding(raw: &str) -> Result<Vec<f64>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("invalid embedding value {token:?}"))
        })
        .collect()
}

/// Reads a command-line value as JSON, keeping it as a plain string when it
/// does not parse. A missing value is `null`.
pub fn parse_json_arg(raw: Option<&str>) -> Value {
    match raw {
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        None => Value::Null,
    }
}

/// Builds a log update from `field=value` pairs. Field names are checked
/// against the log allow-list.
pub fn build_log_update(assignments: &[String]) -> Result<LogUpdate> {
    let mut update = LogUpdate::new();
    for assignment in assignments {
        let (name, raw) = assignment
            .split_once('=')
            .with_context(|| format!("expected FIELD=VALUE, got {assignment:?}"))?;
        let name = name.trim();
        let value = if name == "ts" || name == "feedback" {
            Value::String(raw.to_string())
        } else {
            parse_json_arg(Some(raw))
        };
        update = update.set(name, value)?;
    }
    Ok(update)
}

pub fn field_list(update: &LogUpdate) -> String {
    update
        .fields()
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_summary_table(summaries: &[MemorySummary]) {
    println!(
        "{}",
        format!(
            "{:<5} {:<20} {:<10} {:<10} {:<50}",
            "MID", "ts", "role", "continued", "Text"
        )
        .bold()
    );
    if summaries.is_empty() {
        println!("  (no records)");
    }
    for s in summaries {
        println!(
            "{:<5} {:<20} {:<10} {:<10} {:<50}",
            s.id,
            s.ts,
            s.role,
            u8::from(s.continued),
            truncate(&s.text, TEXT_WIDTH)
        );
    }
}

fn truncate(text: &str, width: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= width {
        return flat;
    }
    let mut out: String = flat.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::{build_log_update, parse_embedding, parse_json_arg, truncate};
    use gptmem_common::Error;
    use gptmem_db::LogField;
    use serde_json::{Value, json};

    #[test]
    fn embedding_accepts_commas_and_spaces() {
        assert_eq!(
            parse_embedding("0.1, 0.2 -3").expect("parse should succeed"),
            vec![0.1, 0.2, -3.0]
        );
        assert!(parse_embedding("").expect("parse should succeed").is_empty());
        assert!(parse_embedding("0.1, abc").is_err());
    }

    #[test]
    fn json_args_fall_back_to_strings() {
        assert_eq!(parse_json_arg(Some("[1, 2]")), json!([1, 2]));
        assert_eq!(parse_json_arg(Some("plain words")), json!("plain words"));
        assert_eq!(parse_json_arg(None), Value::Null);
    }

    #[test]
    fn log_update_from_assignments() {
        let update = build_log_update(&[
            "feedback=42".to_string(),
            "decay_weights={\"a\": 0.5}".to_string(),
        ])
        .expect("known fields should build");

        assert_eq!(update.feedback.as_deref(), Some("42"));
        assert_eq!(update.decay_weights, Some(json!({"a": 0.5})));
        assert_eq!(update.fields(), vec![LogField::DecayWeights, LogField::Feedback]);
    }

    #[test]
    fn log_update_rejects_unknown_fields() {
        let err = build_log_update(&["id=3".to_string()]).expect_err("id is not updatable");
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownField(_))
        ));

        assert!(build_log_update(&["feedback".to_string()]).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo wörld, long text", 10), "héllo w...");
        assert_eq!(truncate("a\nb", 10), "a b");
    }
}
