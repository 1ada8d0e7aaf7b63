use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A stored (or to-be-stored) employee document. Shape is owned by the JSON store.
pub type EmployeeRecord = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

/// Text fields of one multipart submission, keyed by form field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldSet {
    fields: BTreeMap<String, FieldValue>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeated names collect into a list; `courses[]` style names are always lists.
    pub fn insert(&mut self, name: &str, value: String) {
        let (key, force_list) = match name.strip_suffix("[]") {
            Some(bare) => (bare, true),
            None => (name, false),
        };

        match self.fields.remove(key) {
            None if force_list => {
                self.fields.insert(key.to_string(), FieldValue::List(vec![value]));
            }
            None => {
                self.fields.insert(key.to_string(), FieldValue::Text(value));
            }
            Some(FieldValue::Text(existing)) => {
                self.fields.insert(key.to_string(), FieldValue::List(vec![existing, value]));
            }
            Some(FieldValue::List(mut values)) => {
                values.push(value);
                self.fields.insert(key.to_string(), FieldValue::List(values));
            }
        }
    }

    /// Overwrites whatever is stored under `name` with a single text value.
    pub fn set(&mut self, name: &str, value: String) {
        self.fields.insert(name.to_string(), FieldValue::Text(value));
    }

    #[cfg(test)]
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldValue::Text(value) => Some(value.as_str()),
            FieldValue::List(values) => values.first().map(String::as_str),
        }
    }

    pub fn list(&self, name: &str) -> Vec<&str> {
        match self.fields.get(name) {
            None => Vec::new(),
            Some(FieldValue::Text(value)) => vec![value.as_str()],
            Some(FieldValue::List(values)) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn to_record(&self) -> EmployeeRecord {
        self.fields
            .iter()
            .map(|(name, value)| {
                let json = match value {
                    FieldValue::Text(text) => Value::String(text.clone()),
                    FieldValue::List(values) => {
                        Value::Array(values.iter().cloned().map(Value::String).collect())
                    }
                };
                (name.clone(), json)
            })
            .collect()
    }
}

/// Field name to message, kept in the order the rules were evaluated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationErrorSet {
    entries: Vec<(&'static str, String)>,
}

impl ValidationErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: String) {
        self.entries.push((field, message));
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }
}

impl Serialize for ValidationErrorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, message) in &self.entries {
            map.serialize_entry(field, message)?;
        }
        map.end()
    }
}

/// Result of running the employee validation gate over one submission.
#[derive(Debug, PartialEq)]
pub enum GateOutcome {
    Accepted(EmployeeRecord),
    Rejected(ValidationErrorSet),
}
