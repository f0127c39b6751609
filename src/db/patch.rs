use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Partial update applied to a task record with shallow field overwrite.
///
/// Values that fail to serialize are replaced by a stable placeholder so the
/// rest of the update is still written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                let placeholder = unserializable_placeholder::<T>();
                warn!(
                    "Field '{}' is not serializable ({}), storing {}",
                    key, e, placeholder
                );
                Value::String(placeholder)
            }
        };
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn set_null(mut self, key: &str) -> Self {
        self.fields.insert(key.to_string(), Value::Null);
        self
    }

    /// Adds every field of `other`, overriding keys already present
    pub fn extend(mut self, other: Patch) -> Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overwrites the patched keys of `target`, leaving every other key intact
    pub fn apply_to(&self, target: &mut Map<String, Value>) {
        for (key, value) in &self.fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

pub fn unserializable_placeholder<T: ?Sized>() -> String {
    format!("<unserializable:{}>", std::any::type_name::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;
    use serde_json::json;

    struct LiveHandle;

    impl Serialize for LiveHandle {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("live handles cannot be serialized"))
        }
    }

    #[test]
    fn unserializable_values_become_placeholders() {
        let patch = Patch::new()
            .set("status", "planning")
            .set("engine", &LiveHandle);

        assert_eq!(patch.get("status"), Some(&json!("planning")));
        let placeholder = patch.get("engine").and_then(|v| v.as_str()).unwrap();
        assert!(placeholder.starts_with("<unserializable:"));
        assert!(placeholder.contains("LiveHandle"));
    }

    #[test]
    fn apply_overwrites_only_patched_keys() {
        let mut target = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        Patch::new().set("b", &3).set_null("c").apply_to(&mut target);
        assert_eq!(Value::Object(target), json!({"a": 1, "b": 3, "c": null}));
    }
}
