//! Configuration types for conversion-state synchronization.
//!
//! All tracker and poller behaviour is controlled through [`SyncConfig`],
//! built via its [`SyncConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, serialise them for logging, and
//! diff two runs to understand why their views differ.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a synchronization session.
///
/// Built via [`SyncConfig::builder()`] or using [`SyncConfig::default()`].
///
/// # Example
/// ```rust
/// use readsai_sync::SyncConfig;
///
/// let config = SyncConfig::builder()
///     .poll_interval_ms(2_000)
///     .stall_after_secs(Some(300))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Milliseconds between reconciliation ticks. Minimum: 100. Default: 5000.
    ///
    /// Conversion of a full book takes minutes; polling storage listings more
    /// often than every few seconds only burns requests without shortening the
    /// wait. Lower it in tests, raise it for metered storage backends.
    pub poll_interval_ms: u64,

    /// Seconds after which a still-unconverted tracked document is reported
    /// as [`crate::tracker::ConversionStatus::Stalled`] instead of `Pending`.
    /// `None` disables stall detection. Default: 600.
    ///
    /// There is no server-side failure signal in blob-inference mode, so a
    /// conversion that silently dies would otherwise stay "in progress"
    /// forever. Ten minutes comfortably covers normal conversion time for
    /// book-length inputs.
    pub stall_after_secs: Option<u64>,

    /// File extension (without dot) identifying source documents. Default: "epub".
    pub source_extension: String,

    /// File extension (without dot) of derived audio artifacts. Default: "mp3".
    pub artifact_extension: String,

    /// Number of concurrent artifact-presence checks per reconcile. Default: 8.
    ///
    /// Checks are independent per document, so they are issued concurrently
    /// and merged behind a wait-for-all barrier. The cap keeps a library with
    /// hundreds of uploads from opening hundreds of simultaneous requests.
    pub check_concurrency: usize,

    /// Replace an existing document object on upload. Default: false.
    ///
    /// When false, re-uploading a name that already exists in the documents
    /// bucket surfaces `AlreadyExists` instead of clobbering the original.
    pub overwrite_uploads: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            stall_after_secs: Some(600),
            source_extension: "epub".to_string(),
            artifact_extension: "mp3".to_string(),
            check_concurrency: 8,
            overwrite_uploads: false,
        }
    }
}

impl SyncConfig {
    /// Create a new builder for `SyncConfig`.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder {
            config: Self::default(),
        }
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stall threshold as a [`Duration`], if stall detection is enabled.
    pub fn stall_after(&self) -> Option<Duration> {
        self.stall_after_secs.map(Duration::from_secs)
    }
}

/// Builder for [`SyncConfig`].
#[derive(Debug)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(100);
        self
    }

    pub fn stall_after_secs(mut self, secs: Option<u64>) -> Self {
        self.config.stall_after_secs = secs;
        self
    }

    pub fn source_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.source_extension = ext.into();
        self
    }

    pub fn artifact_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.artifact_extension = ext.into();
        self
    }

    pub fn check_concurrency(mut self, n: usize) -> Self {
        self.config.check_concurrency = n.max(1);
        self
    }

    pub fn overwrite_uploads(mut self, v: bool) -> Self {
        self.config.overwrite_uploads = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SyncConfig, SyncError> {
        let c = &self.config;
        if c.poll_interval_ms < 100 {
            return Err(SyncError::InvalidConfig(format!(
                "poll interval must be ≥ 100 ms, got {}",
                c.poll_interval_ms
            )));
        }
        if c.check_concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "check concurrency must be ≥ 1".into(),
            ));
        }
        for (label, ext) in [
            ("source", &c.source_extension),
            ("artifact", &c.artifact_extension),
        ] {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(SyncError::InvalidConfig(format!(
                    "{label} extension must be non-empty and written without a leading dot, got '{ext}'"
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::builder().build().unwrap();
        assert_eq!(config.poll_interval_ms, 5_000);
        assert_eq!(config.source_extension, "epub");
        assert_eq!(config.artifact_extension, "mp3");
        assert_eq!(config.stall_after(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn interval_is_clamped() {
        let config = SyncConfig::builder().poll_interval_ms(1).build().unwrap();
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn concurrency_is_clamped() {
        let config = SyncConfig::builder().check_concurrency(0).build().unwrap();
        assert_eq!(config.check_concurrency, 1);
    }

    #[test]
    fn dotted_extension_rejected() {
        let err = SyncConfig::builder()
            .source_extension(".epub")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("leading dot"));
    }

    #[test]
    fn stall_detection_can_be_disabled() {
        let config = SyncConfig::builder()
            .stall_after_secs(None)
            .build()
            .unwrap();
        assert_eq!(config.stall_after(), None);
    }
}
