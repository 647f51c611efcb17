//! Write-once context fields.

/// Misuse of a write-once pipeline field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("pipeline field `{field}` already written")]
    AlreadyWritten { field: &'static str },
    #[error("pipeline field `{field}` read before it was written")]
    Unset { field: &'static str },
}

/// A named context field that can be written exactly once per request.
#[derive(Debug)]
pub struct Slot<T> {
    name: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }

    /// Creates a slot already holding `value` (request-seeded fields).
    #[must_use]
    pub const fn seeded(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: Some(value),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stores `value`.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::AlreadyWritten`] if the slot already holds a
    /// value; the stored value is left untouched.
    pub fn set(&mut self, value: T) -> Result<(), SlotError> {
        if self.value.is_some() {
            return Err(SlotError::AlreadyWritten { field: self.name });
        }
        self.value = Some(value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Value of a field an earlier stage must have written.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Unset`] if nothing was written.
    pub fn require(&self) -> Result<&T, SlotError> {
        self.value.as_ref().ok_or(SlotError::Unset { field: self.name })
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Consumes the slot, returning its value.
    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}
