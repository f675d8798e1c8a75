use thiserror::Error;

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the package parser.
///
/// Every message is safe to show to the uploader verbatim; the underlying
/// cause is kept as the error source for logging.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse the supplied APK file!")]
    Unreadable(#[source] Cause),

    #[error("The supplied APK file is not valid!")]
    Invalid(String),

    #[error("Failed to extract the app's metadata from the supplied APK file!")]
    Metadata(String),

    #[error("Failed to get the supplied APK's size!")]
    FileSize(#[source] std::io::Error),

    #[error("Failed to extract the app's icon from the supplied APK file!")]
    Icon(#[source] Cause),
}

impl ParseError {
    pub(crate) fn unreadable(err: impl Into<Cause>) -> Self {
        Self::Unreadable(err.into())
    }

    pub(crate) fn icon(err: impl Into<Cause>) -> Self {
        Self::Icon(err.into())
    }

    /// What actually went wrong, for the logs; the display text stays
    /// generic.
    pub fn detail(&self) -> String {
        match self {
            Self::Invalid(detail) | Self::Metadata(detail) => detail.clone(),
            Self::Unreadable(cause) | Self::Icon(cause) => cause.to_string(),
            Self::FileSize(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_kept_apart_from_the_message() {
        let err = ParseError::Invalid("AndroidManifest.xml is missing".into());
        assert_eq!(err.to_string(), "The supplied APK file is not valid!");
        assert_eq!(err.detail(), "AndroidManifest.xml is missing");

        let err = ParseError::icon("no launcher icon");
        assert_eq!(err.detail(), "no launcher icon");
    }
}
