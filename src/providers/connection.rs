//! Connection string sources for providers.

use std::fmt;

/// Supplies the connection string used for every queue a provider sets up
pub trait ConnectionStringProvider: Send + Sync {
    fn connection_string(&self) -> String;
}

/// Fixed connection string
#[derive(Clone, PartialEq, Eq)]
pub struct StaticConnectionString(String);

impl StaticConnectionString {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self(connection_string.into())
    }
}

impl ConnectionStringProvider for StaticConnectionString {
    fn connection_string(&self) -> String {
        self.0.clone()
    }
}

// Connection strings may carry keys
impl fmt::Debug for StaticConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticConnectionString").field(&"***").finish()
    }
}
