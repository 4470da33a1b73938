//! Plan display

use crate::ui;
use colored::{ColoredString, Colorize};
use declarative::{Action, DiffSummary, FieldChange, ResourceDiff, group_by_type};
use serde_json::Value;

/// Longest attribute value shown inline
const MAX_VALUE_LEN: usize = 60;

/// Display the diffs that change something
pub fn display_diff<'a>(diffs: impl IntoIterator<Item = &'a ResourceDiff>) {
    let diffs: Vec<&ResourceDiff> = diffs
        .into_iter()
        .filter(|d| d.action() != Action::NoOp)
        .collect();

    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (resource_type, type_diffs) in group_by_type(diffs.iter().copied()) {
        println!("│ {}", resource_type.bold());

        for diff in type_diffs {
            let action = diff.action();
            let name = diff.address.split_once('.').map_or(diff.address.as_str(), |(_, n)| n);
            let note = match action {
                Action::Replace => "(replace)".red().to_string(),
                Action::Delete => diff.id.clone().unwrap_or_default().dimmed().to_string(),
                _ => String::new(),
            };
            println!("│   {} {:<30} {}", symbol(action), name, note);

            if action != Action::Delete {
                for change in &diff.changes {
                    println!("│       {}", describe_change(change));
                }
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs.iter().copied());
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Summary: {}", describe_summary(&summary));
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Print the resources that failed to plan
pub fn display_errors(errors: &[(String, String)]) {
    println!();
    for (address, message) in errors {
        ui::error(&format!("{}: {}", address.bold(), message));
    }
}

fn symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => action.symbol().green(),
        Action::Update => action.symbol().yellow(),
        Action::Replace => action.symbol().red(),
        Action::Delete => action.symbol().red(),
        Action::NoOp => action.symbol().dimmed(),
    }
}

fn describe_change(change: &FieldChange) -> String {
    let new = if change.computed {
        "(known after apply)".dimmed().to_string()
    } else {
        render(change.new.as_ref(), change.sensitive)
    };
    let line = match &change.old {
        Some(_) => format!(
            "{}: {} → {}",
            change.path,
            render(change.old.as_ref(), change.sensitive).dimmed(),
            new
        ),
        None => format!("{}: {}", change.path, new),
    };
    if change.force_new {
        format!("{line} {}", "# forces replacement".red())
    } else {
        line
    }
}

fn render(value: Option<&Value>, sensitive: bool) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(_) if sensitive => "(sensitive value)".to_string(),
        Some(Value::String(s)) => format!("{:?}", ui::truncate(s, MAX_VALUE_LEN)),
        Some(other) => ui::truncate(&other.to_string(), MAX_VALUE_LEN),
    }
}

fn describe_summary(summary: &DiffSummary) -> String {
    let mut parts = Vec::new();
    if summary.additions > 0 {
        parts.push(format!("{} to add", summary.additions).green().to_string());
    }
    if summary.modifications > 0 {
        parts.push(format!("{} to change", summary.modifications).yellow().to_string());
    }
    if summary.replacements > 0 {
        parts.push(format!("{} to replace", summary.replacements).red().to_string());
    }
    if summary.removals > 0 {
        parts.push(format!("{} to destroy", summary.removals).red().to_string());
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(path: &str, old: Option<Value>, new: Option<Value>) -> FieldChange {
        FieldChange {
            path: path.to_string(),
            old,
            new,
            computed: false,
            sensitive: false,
            force_new: false,
        }
    }

    #[test]
    fn test_sensitive_values_hidden() {
        let mut c = change("administrator_login_password", Some(json!("old")), Some(json!("new")));
        c.sensitive = true;
        colored::control::set_override(false);
        let line = describe_change(&c);
        assert!(!line.contains("old"));
        assert!(!line.contains("new"));
        assert!(line.contains("(sensitive value)"));
    }

    #[test]
    fn test_describe_change_forms() {
        colored::control::set_override(false);
        assert_eq!(
            describe_change(&change("limit_value", Some(json!(10)), Some(json!(20)))),
            "limit_value: 10 → 20"
        );
        assert_eq!(describe_change(&change("display_name", None, Some(json!("Echo")))), "display_name: \"Echo\"");

        let mut computed = change("is_current", None, None);
        computed.computed = true;
        assert_eq!(describe_change(&computed), "is_current: (known after apply)");

        let mut replace = change("location", Some(json!("westeurope")), Some(json!("northeurope")));
        replace.force_new = true;
        assert!(describe_change(&replace).ends_with("# forces replacement"));
    }

    #[test]
    fn test_describe_summary() {
        colored::control::set_override(false);
        let summary = DiffSummary {
            additions: 2,
            removals: 1,
            modifications: 0,
            replacements: 1,
        };
        assert_eq!(describe_summary(&summary), "2 to add, 1 to replace, 1 to destroy");
    }
}
