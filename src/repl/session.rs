//! Session state
//!
//! The current namespace plus the values behind `*1`, `*2`, `*3` and `*e`.
//! Owned by the driver; only changed after a top-level evaluation.

use crate::compiler::USER_NS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    current_ns: String,
    /// Most recent first
    last_values: [Option<String>; 3],
    last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current_ns: USER_NS.to_string(),
            last_values: [None, None, None],
            last_error: None,
        }
    }

    pub fn current_ns(&self) -> &str {
        &self.current_ns
    }

    pub fn set_current_ns(
        &mut self,
        ns: impl Into<String>,
    ) {
        self.current_ns = ns.into();
    }

    /// Shift the result slots and store `value` as `*1`
    pub fn record_success(
        &mut self,
        value: impl Into<String>,
    ) {
        self.last_values.rotate_right(1);
        self.last_values[0] = Some(value.into());
    }

    /// Store `error` as `*e`
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
    ) {
        self.last_error = Some(error.into());
    }

    /// The value of `*n` for `n` in 1..=3
    pub fn last_value(
        &self,
        n: usize,
    ) -> Option<&str> {
        self.last_values.get(n.checked_sub(1)?)?.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
