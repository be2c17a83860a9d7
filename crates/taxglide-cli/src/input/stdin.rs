use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Deserialize a schedule or policy piped on stdin. A document opening with
/// `{` is read as JSON, anything else as YAML. `Ok(None)` when stdin is a
/// terminal or the pipe is empty.
pub fn read_piped<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin().lock().read_to_string(&mut buffer)?;
    parse_document(&buffer)
}

fn parse_document<T: DeserializeOwned>(text: &str) -> Result<Option<T>, Box<dyn std::error::Error>> {
    let body = text.trim();
    if body.is_empty() {
        return Ok(None);
    }
    let document = if body.starts_with('{') {
        serde_json::from_str(body).map_err(|e| format!("Invalid JSON on stdin: {e}"))?
    } else {
        serde_yaml::from_str(body).map_err(|e| format!("Invalid YAML on stdin: {e}"))?
    };
    tracing::debug!(bytes = body.len(), "document read from stdin");
    Ok(Some(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_json_and_yaml_documents() {
        let json: Value = parse_document(r#"{"enabled": false}"#).unwrap().unwrap();
        assert_eq!(json["enabled"], Value::Bool(false));
        let yaml: Value = parse_document("enabled: false\nmin_income_for_retry: 40000\n")
            .unwrap()
            .unwrap();
        assert_eq!(yaml["enabled"], Value::Bool(false));
    }

    #[test]
    fn test_empty_pipe_is_none() {
        assert!(parse_document::<Value>("  \n").unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_reported() {
        let err = parse_document::<Value>("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON on stdin"));
    }
}
