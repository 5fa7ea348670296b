//! Changed-field tracking

/// Ordered, de-duplicated set of field names assigned since the last reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    changed: Vec<String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write to `field`; repeated writes keep the first position
    pub fn record(&mut self, field: &str) {
        if !self.contains(field) {
            self.changed.push(field.to_string());
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changed.iter().any(|f| f == field)
    }

    pub fn fields(&self) -> &[String] {
        &self.changed
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changed.len()
    }

    pub fn reset(&mut self) {
        self.changed.clear();
    }
}
