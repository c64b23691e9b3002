#![forbid(unsafe_code)]

//! Document configuration.

use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Smallest history capacity accepted by [`DocumentConfig::validated`].
pub const MIN_HISTORY_CAPACITY: usize = 1;
/// Largest history capacity accepted by [`DocumentConfig::validated`].
pub const MAX_HISTORY_CAPACITY: usize = 10_000;

/// Whether the document is edited as a drawing or a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DocumentMode {
    TwoD,
    #[default]
    ThreeD,
}

impl DocumentMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TwoD => "2d",
            Self::ThreeD => "3d",
        }
    }

    /// Parse `2d` / `3d`, case-insensitive.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("2d") {
            Some(Self::TwoD)
        } else if text.eq_ignore_ascii_case("3d") {
            Some(Self::ThreeD)
        } else {
            None
        }
    }
}

/// Settings applied when a [`crate::Document`] is created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DocumentConfig {
    /// Undo records kept before the oldest is evicted.
    /// Default: 50.
    pub history_capacity: usize,

    /// Default: 3D.
    pub mode: DocumentMode,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            mode: DocumentMode::default(),
        }
    }
}

impl DocumentConfig {
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DocumentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Load config from environment variables.
    ///
    /// Reads:
    /// - `CADGRAPH_HISTORY_CAPACITY`: undo records kept
    /// - `CADGRAPH_DOCUMENT_MODE`: `2d` or `3d`
    ///
    /// Values are clamped to valid ranges; unparsable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`DocumentConfig::from_env`], reading through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("CADGRAPH_HISTORY_CAPACITY")
            && let Ok(capacity) = val.trim().parse::<usize>()
        {
            config.history_capacity = capacity;
        }

        if let Some(val) = lookup("CADGRAPH_DOCUMENT_MODE")
            && let Some(mode) = DocumentMode::parse(&val)
        {
            config.mode = mode;
        }

        config.validated()
    }

    /// Clamp `history_capacity` to 1-10000.
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.history_capacity = self
            .history_capacity
            .clamp(MIN_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY);
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        (MIN_HISTORY_CAPACITY..=MAX_HISTORY_CAPACITY).contains(&self.history_capacity)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = DocumentConfig::default();
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.mode, DocumentMode::ThreeD);
        assert!(config.is_valid());
    }

    #[test]
    fn validated_clamps_capacity() {
        assert_eq!(
            DocumentConfig::default()
                .with_history_capacity(0)
                .validated()
                .history_capacity,
            1
        );
        assert_eq!(
            DocumentConfig::default()
                .with_history_capacity(1_000_000)
                .validated()
                .history_capacity,
            MAX_HISTORY_CAPACITY
        );
        assert!(!DocumentConfig::default().with_history_capacity(0).is_valid());
    }

    #[test]
    fn lookup_reads_values() {
        let config = DocumentConfig::from_lookup(lookup(&[
            ("CADGRAPH_HISTORY_CAPACITY", " 7 "),
            ("CADGRAPH_DOCUMENT_MODE", "2D"),
        ]));
        assert_eq!(config.history_capacity, 7);
        assert_eq!(config.mode, DocumentMode::TwoD);
    }

    #[test]
    fn lookup_ignores_garbage() {
        let config = DocumentConfig::from_lookup(lookup(&[
            ("CADGRAPH_HISTORY_CAPACITY", "many"),
            ("CADGRAPH_DOCUMENT_MODE", "4d"),
        ]));
        assert_eq!(config, DocumentConfig::default());
    }

    #[test]
    fn mode_strings() {
        assert_eq!(DocumentMode::parse("3d"), Some(DocumentMode::ThreeD));
        assert_eq!(DocumentMode::TwoD.as_str(), "2d");
    }
}
