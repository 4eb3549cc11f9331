//! Error taxonomy shared by the name server, storage server, and client.
//!
//! Each variant group mirrors the taxonomy laid out in the specification's
//! error handling section. Every variant carries the integer wire code it
//! maps to via [`ScriptoriumError::code`]; the dispatcher uses that code to
//! fill the `error_code` field of an `ERROR`-typed reply frame.

use thiserror::Error;

/// Result alias used throughout the crate for operations that can fail with
/// a [`ScriptoriumError`].
pub type Result<T> = std::result::Result<T, ScriptoriumError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScriptoriumError {
    // --- Existence (101-109) ---
    #[error("file not found")]
    FileNotFound,
    #[error("folder not found")]
    FolderNotFound,
    #[error("file already exists")]
    FileExists,
    #[error("folder already exists")]
    FolderExists,
    #[error("checkpoint not found")]
    CheckpointNotFound,
    #[error("checkpoint already exists")]
    CheckpointExists,
    #[error("access request not found")]
    RequestNotFound,
    #[error("access request already exists")]
    RequestExists,
    #[error("user not found")]
    UserNotFound,

    // --- Authorization (110-114) ---
    #[error("permission denied")]
    PermissionDenied,
    #[error("caller is not the owner")]
    NotOwner,
    #[error("caller already has the requested access")]
    AlreadyHasAccess,
    #[error("username already connected")]
    UsernameTaken,
    #[error("storage server id already registered")]
    SSExists,

    // --- Validation (115-120) ---
    #[error("invalid command")]
    InvalidCommand,
    #[error("invalid index")]
    InvalidIndex,
    #[error("invalid sentence index")]
    InvalidSentence,
    #[error("invalid word index")]
    InvalidWord,
    #[error("invalid path")]
    InvalidPath,
    #[error("invalid filename")]
    InvalidFilename,

    // --- Concurrency (121-122) ---
    #[error("sentence is locked by another user")]
    SentenceLocked,
    #[error("no undo snapshot available")]
    UndoNotAvailable,

    // --- Resource / environment (123-127) ---
    #[error("storage server unavailable")]
    SSUnavailable,
    #[error("storage server disconnected")]
    SSDisconnected,
    #[error("network error")]
    NetworkError,
    #[error("file operation failed")]
    FileOperationFailed,
    #[error("file is empty")]
    FileEmpty,
}

impl ScriptoriumError {
    /// The integer wire code for this error, as assigned by the
    /// specification's error handling section (range 101-124 plus the
    /// three extra resource/environment codes this implementation adds).
    pub const fn code(self) -> u16 {
        use ScriptoriumError::*;
        match self {
            FileNotFound => 101,
            FolderNotFound => 102,
            FileExists => 103,
            FolderExists => 104,
            CheckpointNotFound => 105,
            CheckpointExists => 106,
            RequestNotFound => 107,
            RequestExists => 108,
            UserNotFound => 109,
            PermissionDenied => 110,
            NotOwner => 111,
            AlreadyHasAccess => 112,
            UsernameTaken => 113,
            SSExists => 114,
            InvalidCommand => 115,
            InvalidIndex => 116,
            InvalidSentence => 117,
            InvalidWord => 118,
            InvalidPath => 119,
            InvalidFilename => 120,
            SentenceLocked => 121,
            UndoNotAvailable => 122,
            SSUnavailable => 123,
            SSDisconnected => 124,
            NetworkError => 125,
            FileOperationFailed => 126,
            FileEmpty => 127,
        }
    }

    /// Recover a [`ScriptoriumError`] from a wire error code, if recognized.
    pub fn from_code(code: u16) -> Option<Self> {
        use ScriptoriumError::*;
        Some(match code {
            101 => FileNotFound,
            102 => FolderNotFound,
            103 => FileExists,
            104 => FolderExists,
            105 => CheckpointNotFound,
            106 => CheckpointExists,
            107 => RequestNotFound,
            108 => RequestExists,
            109 => UserNotFound,
            110 => PermissionDenied,
            111 => NotOwner,
            112 => AlreadyHasAccess,
            113 => UsernameTaken,
            114 => SSExists,
            115 => InvalidCommand,
            116 => InvalidIndex,
            117 => InvalidSentence,
            118 => InvalidWord,
            119 => InvalidPath,
            120 => InvalidFilename,
            121 => SentenceLocked,
            122 => UndoNotAvailable,
            123 => SSUnavailable,
            124 => SSDisconnected,
            125 => NetworkError,
            126 => FileOperationFailed,
            127 => FileEmpty,
            _ => return None,
        })
    }
}

impl From<std::io::Error> for ScriptoriumError {
    fn from(_: std::io::Error) -> Self {
        ScriptoriumError::FileOperationFailed
    }
}
