use crate::muxing::domain::container_library::LibraryError;
use crate::shared::media_type::MediaType;

/// Which latch made the session refuse further work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Failed,
    Finished,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Failed => write!(f, "failed"),
            TerminalState::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("format not found")]
    FormatNotFound,

    #[error("neither audio nor video codec was found")]
    NoUsableCodec,

    #[error("could not create the muxer context")]
    WriterCreate(#[source] LibraryError),

    #[error("no {0} stream succeeded - invalid codec?")]
    ExpectedStreamMissing(MediaType),

    #[error("could not open '{url}'")]
    OutputOpen {
        url: String,
        #[source]
        source: LibraryError,
    },

    #[error("could not write header")]
    HeaderWrite(#[source] LibraryError),

    #[error("an earlier attempt to write the header failed")]
    HeaderStartFailed,

    #[error("{}: encoder not found", .0.log_prefix())]
    EncoderNotFound(MediaType),

    /// No encoder for this media type and none was asked for.
    #[error("{}: no {} stream wanted for this output", .0.log_prefix(), .0)]
    NoStream(MediaType),

    #[error("{}: a {} stream already exists", .0.log_prefix(), .0)]
    StreamExists(MediaType),

    #[error("streams cannot be added once the header was written")]
    HeaderAlreadyStarted,

    #[error("frames cannot be written before the header")]
    HeaderNotStarted,

    #[error("{}: could not allocate the {} stream", .media.log_prefix(), .media)]
    StreamAlloc {
        media: MediaType,
        #[source]
        source: LibraryError,
    },

    #[error("unable to open {0} encoder (see above for the cause)")]
    CodecOpen(MediaType, #[source] LibraryError),

    #[error("called write_frame on the wrong stream: {media} stream is {expected}, packet targets {actual}")]
    WrongStream {
        media: MediaType,
        expected: usize,
        actual: usize,
    },

    #[error("could not write frame")]
    Write(#[source] LibraryError),

    #[error("called a function on a {0} encoding context")]
    Terminated(TerminalState),

    #[error("session freed without finish")]
    FreedWithoutFinish,
}

impl SessionError {
    /// Status code of the underlying library failure, if there is one.
    pub fn library_code(&self) -> Option<i32> {
        match self {
            SessionError::WriterCreate(e)
            | SessionError::HeaderWrite(e)
            | SessionError::CodecOpen(_, e)
            | SessionError::Write(e)
            | SessionError::OutputOpen { source: e, .. }
            | SessionError::StreamAlloc { source: e, .. } => Some(e.code()),
            _ => None,
        }
    }
}

/// Renders `error` followed by its source chain, `: `-separated.
pub fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
