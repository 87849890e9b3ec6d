//! Error types for vbitext.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VbitextError {
    // Input-structure errors: fatal at stage entry.
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Unknown device profile: {name}")]
    UnknownProfile { name: String },

    #[error("Invalid profile value for {field}: {message}")]
    InvalidProfile { field: String, message: String },

    #[error("Failed to parse profile file: {0}")]
    ProfileParse(#[from] toml::de::Error),

    // Resource errors: terminate the pipeline.
    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    #[error("Capture device error on {device}: {message}")]
    CaptureDevice { device: String, message: String },

    // Internal invariant violations: abort with frame diagnostics.
    #[error("Internal error at frame {frame_index}: {message}")]
    Internal { frame_index: u64, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VbitextError>;

impl VbitextError {
    /// Process exit code for this error per the CLI contract.
    ///
    /// 2 = malformed input, 3 = unknown device profile, 1 = everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            VbitextError::MalformedInput { .. } => 2,
            VbitextError::UnknownProfile { .. } => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_malformed_input_display() {
        let error = VbitextError::MalformedInput {
            message: "length 43 is not a multiple of 42".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Malformed input: length 43 is not a multiple of 42"
        );
    }

    #[test]
    fn test_unknown_profile_display() {
        let error = VbitextError::UnknownProfile {
            name: "bt9x9".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown device profile: bt9x9");
    }

    #[test]
    fn test_invalid_profile_display() {
        let error = VbitextError::InvalidProfile {
            field: "sample_rate".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid profile value for sample_rate: must be positive"
        );
    }

    #[test]
    fn test_internal_display_names_frame() {
        let error = VbitextError::Internal {
            frame_index: 1234,
            message: "row 40 out of range".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Internal error at frame 1234: row 40 out of range"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            VbitextError::MalformedInput {
                message: String::new()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            VbitextError::UnknownProfile {
                name: String::new()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            VbitextError::Pipeline {
                message: String::new()
            }
            .exit_code(),
            1
        );
        let io_error = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(VbitextError::from(io_error).exit_code(), 1);
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VbitextError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VbitextError>();
        assert_sync::<VbitextError>();
    }
}
