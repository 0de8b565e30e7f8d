use serde::{Deserialize, Serialize};

/// Tunables for the plan compiler.
///
/// Every field has a default, so a partial JSON document such as
/// `{"max_limit": 500}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Upper bound applied to every `LIMIT`
    pub max_limit: u64,
    /// Limit applied when a SELECT has no `LIMIT` clause
    pub default_limit: Option<u64>,
    /// Deepest expression nesting the parser accepts
    pub max_expression_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            max_limit: 10_000,
            default_limit: None,
            max_expression_depth: 64,
        }
    }
}

impl CompilerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Effective row limit: the requested one (or the default) clamped into
    /// `1..=max_limit`.
    pub fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        let ceiling = self.max_limit.max(1);
        requested
            .or(self.default_limit)
            .map(|n| n.clamp(1, ceiling))
    }
}
