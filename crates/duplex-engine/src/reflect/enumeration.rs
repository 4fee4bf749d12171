//! Enumeration descriptors

/// Named integer constants declared inside a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: String,
    values: Vec<(String, i64)>,
}

impl EnumDescriptor {
    /// Create from `(name, value)` pairs, keeping their order
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = (S, i64)>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Enum name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All values in declaration order
    pub fn values(&self) -> &[(String, i64)] {
        &self.values
    }

    /// Value of a named constant
    pub fn value(&self, name: &str) -> Option<i64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// First constant carrying `value`
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}
