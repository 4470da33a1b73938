//! `resources` - list supported resource types and their fields

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{Field, ResourceKind, Schema};

use crate::Context;
use crate::resource;
use crate::ui;

pub fn run(_ctx: &Context, resource_type: Option<&str>) -> Result<()> {
    let registry = resource::registry()?;

    let Some(resource_type) = resource_type else {
        ui::header("Resource types");
        for kind in registry.iter() {
            println!("  {:<45} {}", kind.type_name().bold(), kind.description());
        }
        println!();
        ui::dim(&format!("{} types; run `armsync resources <type>` for fields", registry.len()));
        return Ok(());
    };

    let Some(kind) = registry.get(resource_type) else {
        bail!("unknown resource type: {resource_type}");
    };
    describe(kind.as_ref());
    Ok(())
}

fn describe(kind: &dyn ResourceKind) {
    ui::header(kind.type_name());
    ui::kv("description", kind.description());
    ui::kv("api-version", kind.api_version());
    ui::kv("id", &kind.id_pattern().example());

    ui::section("Fields");
    print_fields(kind.schema(), 1);
}

fn print_fields(schema: &Schema, depth: usize) {
    let indent = "  ".repeat(depth);
    let width = 40usize.saturating_sub(indent.len());
    for field in schema.fields() {
        println!(
            "{indent}{:<width$} {:<18} {}",
            field.name,
            field.ty.describe().cyan(),
            flags(field).join(", ").dimmed()
        );
        if let Some(block) = field.block_schema() {
            print_fields(block, depth + 1);
        }
    }
}

fn flags(field: &Field) -> Vec<String> {
    let mut flags = Vec::new();
    if field.required {
        flags.push("required".to_string());
    } else if field.optional {
        flags.push("optional".to_string());
    }
    if field.computed {
        flags.push("computed".to_string());
    }
    if field.sensitive {
        flags.push("sensitive".to_string());
    }
    if field.force_new {
        flags.push("forces replacement".to_string());
    }
    if let Some(default) = &field.default {
        flags.push(format!("default {default}"));
    }
    if let Some(max) = field.max_items {
        flags.push(format!("max {max}"));
    }
    if !field.conflicts_with.is_empty() {
        flags.push(format!("conflicts with {}", field.conflicts_with.join(", ")));
    }
    if !field.required_with.is_empty() {
        flags.push(format!("requires {}", field.required_with.join(", ")));
    }
    flags
}
