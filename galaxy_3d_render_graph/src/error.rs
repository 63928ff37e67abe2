//! Error types for the Galaxy3D render graph
//!
//! This module defines the error type shared by graph declaration,
//! compilation, per-frame execution and the device backends.

use std::fmt;

/// Result type for Galaxy3D render graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D render graph errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (D3D12, Vulkan, mock device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid native resource (missing handle, descriptor mismatch, etc.)
    InvalidResource(String),

    /// Initialization failed (invalid configuration, device setup)
    InitializationFailed(String),

    /// Structural error in the graph declaration, detected at compile time
    DeclarationError {
        /// Pass that carries the faulty declaration (empty for graph-level errors)
        pass: String,
        /// Resource or section involved
        resource: String,
        /// Human readable description
        message: String,
    },

    /// A pass asked its context for a resource or descriptor it did not declare
    LookupError {
        /// Pass that performed the lookup
        pass: String,
        /// Resource that was not found
        resource: String,
    },

    /// The section dependency graph contains a cycle (section names on the cycle)
    DependencyCycle(Vec<String>),

    /// Invalid use of the frame scheduler (over-release, unreleased sections)
    SchedulingError(String),
}

impl Error {
    /// Shorthand for a `DeclarationError`
    pub(crate) fn declaration(pass: &str, resource: &str, message: impl Into<String>) -> Self {
        Error::DeclarationError {
            pass: pass.to_string(),
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a `LookupError`
    pub(crate) fn lookup(pass: &str, resource: &str) -> Self {
        Error::LookupError {
            pass: pass.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::DeclarationError { pass, resource, message } => {
                if pass.is_empty() {
                    write!(f, "Declaration error on '{}': {}", resource, message)
                } else {
                    write!(f, "Declaration error in pass '{}' on '{}': {}", pass, resource, message)
                }
            }
            Error::LookupError { pass, resource } => {
                write!(f, "Lookup error: pass '{}' did not declare '{}'", pass, resource)
            }
            Error::DependencyCycle(sections) => {
                write!(f, "Dependency cycle between sections: {}", sections.join(" -> "))
            }
            Error::SchedulingError(msg) => write!(f, "Scheduling error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR message and build a `BackendError` from it
///
/// # Example
///
/// ```no_run
/// # use galaxy_3d_render_graph::engine_err;
/// let err = engine_err!("galaxy3d::RenderGraph", "Section '{}' has no queue", "compute");
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return early with a `BackendError`
///
/// # Example
///
/// ```no_run
/// # use galaxy_3d_render_graph::engine_bail;
/// # fn check(ok: bool) -> galaxy_3d_render_graph::galaxy3d::Result<()> {
/// if !ok {
///     engine_bail!("galaxy3d::RenderGraph", "Unexpected state");
/// }
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
