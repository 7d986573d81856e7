//! Remote store seam

use crate::error::RemoteError;
use crate::types::{ProgressReport, SelectionPayload};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// Authoritative remote store
///
/// GET methods return the raw JSON body; validation happens in
/// [`crate::validate`] so a malformed body never reaches session state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// `GET /learning/selections?userId=<id>`
    ///
    /// # Errors
    /// `RemoteError` on network or HTTP failure
    async fn fetch_selections(&self, user_id: &str) -> Result<Value, RemoteError>;

    /// `POST /learning/selections`
    ///
    /// # Errors
    /// `RemoteError` on network or HTTP failure
    async fn save_selections(&self, payload: &SelectionPayload) -> Result<(), RemoteError>;

    /// `GET /progress`
    ///
    /// # Errors
    /// `RemoteError` on network or HTTP failure
    async fn fetch_progress(&self) -> Result<Value, RemoteError>;

    /// `POST /progress/save`
    ///
    /// # Errors
    /// `RemoteError` on network or HTTP failure
    async fn save_progress(&self, report: &ProgressReport) -> Result<(), RemoteError>;
}
