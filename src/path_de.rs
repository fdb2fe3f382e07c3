//! Deserialization helpers that report the JSON path of the offending node.
use serde::de::DeserializeOwned;

fn describe(err: serde_path_to_error::Error<serde_json::Error>) -> String {
    let path = err.path().to_string();
    if path == "." {
        err.into_inner().to_string()
    } else {
        format!("at {path} → {}", err.into_inner())
    }
}

/// Deserialize JSON text with path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(describe)
}

/// Deserialize an already-parsed document (e.g. converted from YAML).
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(describe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        inner: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        count: u32,
    }

    #[test]
    fn error_names_the_failing_path() {
        let err = from_str_with_path::<Outer>(r#"{"inner": [{"count": 1}, {"count": "x"}]}"#)
            .unwrap_err();
        assert!(err.contains("inner[1].count"), "{err}");

        let err = from_value_with_path::<Outer>(serde_json::json!({"inner": [{}]})).unwrap_err();
        assert!(err.contains("inner[0]"), "{err}");
    }
}
