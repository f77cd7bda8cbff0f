//! Console-style formatting of captured argument lists.
//!
//! Pure functions: they take value snapshots and return display text, with
//! no access to the isolate that produced them.

mod stack;
mod table;

pub use stack::format_trace_stack;
pub use table::build_table_output;

use crate::runtime::js_value::{number_to_string, JsValue};
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[sdifoOc%]").expect("placeholder pattern is valid"));

/// Format a single value the way the output panel shows it.
///
/// Strings pass through, errors render their stack (or message), everything
/// else is pretty-printed as JSON with a fallback to string coercion.
pub fn format_output_value(value: &JsValue) -> String {
    match value {
        JsValue::String(text) => text.clone(),
        JsValue::Error(error) => match &error.stack {
            Some(stack) if !stack.is_empty() => stack.clone(),
            _ if !error.message.is_empty() => error.message.clone(),
            _ => value.coerce_to_string(),
        },
        other => match other.to_json() {
            Ok(Some(json)) => json,
            Ok(None) | Err(_) => other.coerce_to_string(),
        },
    }
}

/// Format a console call's argument list into one line of text.
pub fn format_output_args(args: &[JsValue]) -> String {
    let Some(first) = args.first() else {
        return String::new();
    };

    if let JsValue::String(format) = first {
        let rest = &args[1..];
        let (text, used) = format_with_placeholders(format, rest);
        let trailing = rest
            .iter()
            .skip(used)
            .map(format_output_value)
            .collect::<Vec<_>>()
            .join(" ");
        return if trailing.is_empty() {
            text
        } else {
            format!("{text} {trailing}").trim().to_string()
        };
    }

    args.iter()
        .map(format_output_value)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substitute printf-style placeholders left to right. Returns the text and
/// the number of arguments the placeholders consumed.
fn format_with_placeholders(format: &str, args: &[JsValue]) -> (String, usize) {
    let mut result = String::with_capacity(format.len());
    let mut last = 0;
    let mut used = 0;

    for found in PLACEHOLDER.find_iter(format) {
        result.push_str(&format[last..found.start()]);
        last = found.end();

        let token = found.as_str();
        if token == "%%" {
            result.push('%');
            continue;
        }

        let value = args.get(used).unwrap_or(&JsValue::Undefined);
        used += 1;

        match token {
            "%s" => result.push_str(&value.coerce_to_string()),
            "%d" | "%i" | "%f" => result.push_str(&number_to_string(value.to_number())),
            "%o" | "%O" => result.push_str(&format_output_value(value)),
            "%c" => {}
            _ => result.push_str(token),
        }
    }

    result.push_str(&format[last..]);
    (result, used)
}
