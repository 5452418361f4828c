use serde_json::Value;

/// Ordered field -> new value payload for partial modification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set_map: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self {
            set_map: Vec::new(),
        }
    }

    /// Set a field; setting the same field twice keeps its first position
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.set_map.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.set_map.push((field, value)),
        }
        self
    }

    /// Drop a field from the payload, returning its value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let position = self.set_map.iter().position(|(name, _)| name == field)?;
        Some(self.set_map.remove(position).1)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.set_map
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.set_map
    }

    pub fn is_empty(&self) -> bool {
        self.set_map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set_map.len()
    }
}
