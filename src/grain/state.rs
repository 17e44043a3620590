//! In-memory grain state held by an activation across storage calls.

use crate::error::StorageError;

/// A grain's state value together with its optimistic concurrency token.
///
/// Built once per activation, then filled and updated in place by
/// [`VersionedGrainStore`](crate::VersionedGrainStore) calls. A failed call
/// never modifies it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrainState<T> {
    /// The deserialized application value.
    pub state: T,
    /// Decimal string of the last version the store returned, `None` if the
    /// state has never been read from or written to the store.
    pub etag: Option<String>,
    /// Whether a stored payload is known to exist.
    pub record_exists: bool,
}

impl<T> GrainState<T> {
    /// Wrap a value that has not been persisted yet.
    pub fn new(state: T) -> Self {
        Self {
            state,
            etag: None,
            record_exists: false,
        }
    }

    /// The version to send as the write/clear precondition.
    ///
    /// A missing, empty or whitespace-only ETag means "no prior version".
    pub fn expected_version(&self) -> Result<Option<i64>, StorageError> {
        match self.etag.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(etag) => match etag.parse::<i64>() {
                Ok(version) if version >= 0 => Ok(Some(version)),
                _ => Err(StorageError::InvalidETag(etag.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_no_version() {
        let state = GrainState::new(5u32);
        assert_eq!(state.state, 5);
        assert!(!state.record_exists);
        assert_eq!(state.expected_version().unwrap(), None);
    }

    #[test]
    fn test_blank_etag_means_no_version() {
        let mut state = GrainState::new(());
        state.etag = Some("  ".into());
        assert_eq!(state.expected_version().unwrap(), None);
    }

    #[test]
    fn test_etag_parses_to_version() {
        let mut state = GrainState::new(());
        state.etag = Some("17".into());
        assert_eq!(state.expected_version().unwrap(), Some(17));
    }

    #[test]
    fn test_invalid_etags_rejected() {
        for bad in ["abc", "-1", "1.5", "0x10"] {
            let mut state = GrainState::new(());
            state.etag = Some(bad.into());
            assert!(
                matches!(state.expected_version(), Err(StorageError::InvalidETag(_))),
                "{bad} should be rejected"
            );
        }
    }
}
