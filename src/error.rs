use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{manifest::MfErr, xliff::XliffErr};

#[derive(Error, Debug)]
pub enum PackError {
    #[error("a media file or a remote video URL is required")]
    MissingUpload,
    #[error("a SCORM version must be selected (1.2 or 2004)")]
    MissingVersion,
    #[error("unknown SCORM version '{0}', expected 1.2 or 2004")]
    UnknownVersion(String),
    #[error("invalid duration '{0}', expected HH:MM:SS")]
    InvalidDuration(String),
    #[error("duration of {0} seconds exceeds the 86400 second limit")]
    DurationOutOfRange(u32),
    #[error("remote video URL '{0}' must start with http:// or https://")]
    InvalidRemoteUrl(String),
    #[error("score threshold must be between 1 and 100, got '{0}'")]
    InvalidThreshold(String),
    #[error("unsupported subtitle file '{0}', expected .srt or .vtt")]
    UnsupportedSubtitle(String),
    #[error("subtitle file '{0}' is not valid UTF-8")]
    SubtitleEncoding(String),
    #[error("upload is not a readable zip archive: {0}")]
    InvalidArchive(String),
    #[error("archive rejected: {0}")]
    ArchiveTooLarge(String),
    #[error("invalid form data: {0}")]
    Multipart(String),
    #[error("manifest references '{0}' which is not in the package")]
    MissingPayloadFile(String),
    #[error(transparent)]
    Manifest(#[from] MfErr),
    #[error(transparent)]
    Xliff(#[from] XliffErr),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("packaging task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, PackError>;

impl PackError {
    /// Errors caused by what the user submitted, as opposed to the host.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingUpload
                | Self::MissingVersion
                | Self::UnknownVersion(_)
                | Self::InvalidDuration(_)
                | Self::DurationOutOfRange(_)
                | Self::InvalidThreshold(_)
                | Self::InvalidRemoteUrl(_)
                | Self::UnsupportedSubtitle(_)
                | Self::SubtitleEncoding(_)
                | Self::InvalidArchive(_)
                | Self::ArchiveTooLarge(_)
                | Self::Multipart(_)
                | Self::Manifest(_)
                | Self::Xliff(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        if self.is_user_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for PackError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        Self::Multipart(e.body_text())
    }
}

impl IntoResponse for PackError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
        } else {
            tracing::debug!(error = %self, "rejected request");
        }
        (status, self.to_string()).into_response()
    }
}
