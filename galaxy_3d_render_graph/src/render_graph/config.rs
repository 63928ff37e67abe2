/// Graph compilation and runtime configuration

use crate::error::{Error, Result};

/// Render graph configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Number of frames that may be in flight at once (frame slots)
    pub frames_in_flight: u32,
    /// Maximum number of recording threads, also the number of descriptor slot spaces
    pub thread_count: u32,
    /// Reject write states combined with other states and conflicting states inside one pass
    pub validate_hazards: bool,
    /// Emit BEGIN_ONLY / END_ONLY barrier pairs when passes separate producer and consumer
    pub split_barriers: bool,
}

impl GraphConfig {
    /// Check the configuration
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when `frames_in_flight` or `thread_count` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::InitializationFailed("frames_in_flight must be at least 1".to_string()));
        }
        if self.thread_count == 0 {
            return Err(Error::InitializationFailed("thread_count must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            thread_count: 1,
            validate_hazards: cfg!(debug_assertions),
            split_barriers: true,
        }
    }
}
