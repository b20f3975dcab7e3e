use std::time::Duration;

/// Failures that can affect a single globe slot. None of them are fatal to the
/// presentation; the worst outcome is a sparser globe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("failed to load '{uri}': {reason}")]
    LoadFailed { uri: String, reason: String },

    #[error("'{uri}' did not become ready within {waited:?}")]
    LoadTimedOut { uri: String, waited: Duration },

    #[error("playback of '{uri}' was blocked: {reason}")]
    PlaybackBlocked { uri: String, reason: String },

    #[error("load of '{uri}' finished after teardown")]
    Cancelled { uri: String },
}

impl LoadError {
    pub fn failed(uri: impl Into<String>, reason: impl ToString) -> Self {
        LoadError::LoadFailed { uri: uri.into(), reason: reason.to_string() }
    }

    pub fn uri(&self) -> &str {
        match self {
            LoadError::LoadFailed { uri, .. }
            | LoadError::LoadTimedOut { uri, .. }
            | LoadError::PlaybackBlocked { uri, .. }
            | LoadError::Cancelled { uri } => uri,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_constructor_keeps_uri_and_reason() {
        let err = LoadError::failed("photos/a.jpg", "404");
        assert_eq!(err.uri(), "photos/a.jpg");
        assert_eq!(err.to_string(), "failed to load 'photos/a.jpg': 404");
        assert!(!err.is_cancelled());
    }
}
