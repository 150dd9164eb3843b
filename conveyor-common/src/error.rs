use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn bad_mode(op: impl Into<String>) -> Error {
        Error(ErrorKind::BadMode { op: op.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// Builds an `Io` error from a raw platform error code, as latched by
    /// a background worker.
    pub fn io_code(context: impl Into<String>, code: i32) -> Error {
        Error::io(context, std::io::Error::from_raw_os_error(code))
    }

    /// Returns the raw platform error code when this is an I/O error that
    /// carries one.
    pub fn os_code(&self) -> Option<i32> {
        match self.kind() {
            ErrorKind::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns `true` when the operation was rejected by the access mode.
    pub fn is_bad_mode(&self) -> bool {
        matches!(self.kind(), ErrorKind::BadMode { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("operation {op} not permitted by the access mode")]
    BadMode { op: String },

    #[error("I/O error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error(Box::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_code_roundtrip() {
        let err = Error::io_code("flush", 5);
        assert_eq!(err.os_code(), Some(5));
        assert!(!err.is_bad_mode());
    }

    #[test]
    fn bad_mode_has_no_code() {
        let err = Error::bad_mode("write");
        assert_eq!(err.os_code(), None);
        assert!(err.is_bad_mode());
    }
}
