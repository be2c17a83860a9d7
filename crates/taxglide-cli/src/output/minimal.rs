use serde_json::Value;

/// Print just the key answer: the recommended deduction for `optimize`, the
/// total tax for `calc`, and so on.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // JSON pointers into the result, most specific first
    let priority_paths = [
        "/sweet_spot/deduction",
        "/total",
        "/valid",
        "/new_income",
    ];

    for path in &priority_paths {
        if let Some(val) = result_obj.pointer(path) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        // An optimization without a sweet spot still has a base total
        if map.contains_key("sweet_spot") {
            println!("none");
            return;
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    if let Value::Array(rows) = result_obj {
        println!("{} rows", rows.len());
        return;
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
