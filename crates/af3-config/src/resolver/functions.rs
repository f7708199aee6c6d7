//! Built-in resolver functions
//!
//! Integer arithmetic helpers used by the training configs to derive
//! batch and device dependent values, plus the time formatter.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::value::Value;

/// Format `now` with a strftime `pattern`.
pub(crate) fn format_time(now: &DateTime<Local>, pattern: &str) -> Result<String, String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid time format `{pattern}`"));
    }
    Ok(now.format_with_items(items.iter()).to_string())
}

/// Evaluate the named resolver, or `None` if no such resolver exists.
pub(crate) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "add" => binary(args, |x, y| {
            x.checked_add(y)
                .map(Value::Integer)
                .ok_or_else(|| overflow(x, "+", y))
        }),
        "subtract" => binary(args, |x, y| {
            x.checked_sub(y)
                .map(Value::Integer)
                .ok_or_else(|| overflow(x, "-", y))
        }),
        "multiply" => binary(args, |x, y| {
            x.checked_mul(y)
                .map(Value::Integer)
                .ok_or_else(|| overflow(x, "*", y))
        }),
        "divide" => binary(args, |x, y| {
            if y == 0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float(x as f64 / y as f64))
        }),
        "int_divide" => binary(args, |x, y| {
            if y == 0 {
                return Err("division by zero".to_string());
            }
            match x.checked_rem(y) {
                Some(0) => x
                    .checked_div(y)
                    .map(Value::Integer)
                    .ok_or_else(|| overflow(x, "/", y)),
                Some(_) => Err(format!("{x} is not divisible by {y}")),
                None => Err(overflow(x, "/", y)),
            }
        }),
        "validate_gradient_accumulation_factor" => {
            integers(args, 3).and_then(|v| gradient_accumulation_world_size(v[0], v[1], v[2]))
        }
        _ => return None,
    };
    Some(result)
}

/// World size used for gradient accumulation, provided it evenly divides
/// the batch size.
fn gradient_accumulation_world_size(
    batch_size: i64,
    devices: i64,
    num_nodes: i64,
) -> Result<Value, String> {
    let world_size = devices
        .checked_mul(num_nodes)
        .ok_or_else(|| overflow(devices, "*", num_nodes))?;
    if world_size <= 0 {
        return Err(format!("world size must be positive, got {world_size}"));
    }
    if batch_size % world_size != 0 {
        return Err(format!(
            "batch size ({batch_size}) must be divisible by the distributed device world size ({world_size})"
        ));
    }
    Ok(Value::Integer(world_size))
}

fn binary(
    args: &[Value],
    op: impl FnOnce(i64, i64) -> Result<Value, String>,
) -> Result<Value, String> {
    let values = integers(args, 2)?;
    op(values[0], values[1])
}

fn integers(args: &[Value], expected: usize) -> Result<Vec<i64>, String> {
    if args.len() != expected {
        return Err(format!(
            "expected {expected} arguments, got {}",
            args.len()
        ));
    }
    args.iter().map(to_integer).collect()
}

fn to_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("`{s}` is not an integer")),
        other => Err(format!("cannot convert a {} to an integer", other.kind())),
    }
}

fn overflow(x: i64, op: &str, y: i64) -> String {
    format!("integer overflow in {x} {op} {y}")
}
