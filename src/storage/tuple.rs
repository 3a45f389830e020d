use serde::{Deserialize, Serialize};

/// A single column value.
///
/// Variants are totally ordered so values can serve directly as index keys.
/// `Null` sorts before everything else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A row of values, stored in table pages as a bincode payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn value(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.values)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        Ok(Self {
            values: bincode::deserialize(bytes)?,
        })
    }
}

/// Column names for a table. Types are dynamic (a `Value` carries its own),
/// so the schema only resolves names to positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> &str {
        &self.columns[index]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_round_trip() {
        let tuple = Tuple::new(vec![
            Value::Integer(42),
            Value::Text("widget".to_string()),
            Value::Boolean(true),
            Value::Null,
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Null < Value::Boolean(false));
        assert!(Value::Integer(1) < Value::Integer(2));
        assert!(Value::Text("a".into()) < Value::Text("b".into()));
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec!["id".into(), "name".into()]);
        assert_eq!(schema.column_index("name"), Some(1));
        assert_eq!(schema.column_index("missing"), None);
        assert_eq!(schema.column_count(), 2);
    }
}
