//! Game Photo Upload Common Library
//!
//! CLIとHTTPサーバで共有される型とユーティリティ（通信は行わない）

pub mod error;
pub mod games;
pub mod rpc;
pub mod staging;
pub mod types;

pub use error::{Error, Result};
pub use games::{join_games, sort_games, team_display_name};
pub use rpc::{
    decode_response, describe_failure, GamesPayload, RawCall, RemoteFailure, RpcCall,
    RemoteId, RpcEnvelope, TeamsPayload, UploadParams, UploadReceipt,
};
pub use staging::{validate_file, Staging, StagingLimits};
pub use types::{
    BatchOutcome, BatchResult, FilePayload, GameRecord, ItemId, MediaItem, MediaKind,
    SubmissionRequest, SubmissionResult, SubmissionStatus, TeamAssociation,
};
