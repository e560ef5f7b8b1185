//! Engine configuration

use mess_types::DEFAULT_LOCATION;

/// Default number of code generations tried before a mint gives up
pub const DEFAULT_CODE_ATTEMPTS: u32 = 3;

/// Lifecycle engine configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Attempts at minting a batch when generated codes collide
    pub code_attempts: u32,
    /// Location recorded when a terminal does not send one
    pub default_location: String,
}

impl LedgerConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self {
            code_attempts: DEFAULT_CODE_ATTEMPTS,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }

    /// Set the number of mint attempts (at least one)
    pub fn with_code_attempts(mut self, attempts: u32) -> Self {
        self.code_attempts = attempts.max(1);
        self
    }

    /// Set the fallback redemption location
    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }

    /// Resolve the location for a redemption
    pub fn location_or_default(&self, location: Option<&str>) -> String {
        match location.map(str::trim) {
            Some(loc) if !loc.is_empty() => loc.to_string(),
            _ => self.default_location.clone(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new()
    }
}
