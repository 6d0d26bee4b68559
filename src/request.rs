//! Messages between the reader service and its loader worker.

use crate::progress::ProgressPayload;
use crate::source::{SourceError, TocResponse, WindowResponse};

/// Identifies one fetch so late responses can be matched or discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug)]
pub enum LoadRequest {
    Toc,

    Progress,

    Window {
        id: RequestId,
        index: usize,
        buffer: usize,
    },

    SaveProgress(ProgressPayload),

    /// Last write of a closing session.
    Beacon(ProgressPayload),

    Shutdown,
}

#[derive(Debug)]
pub enum LoadResponse {
    Toc(Result<TocResponse, SourceError>),

    Progress(Result<Option<ProgressPayload>, SourceError>),

    Window {
        id: RequestId,
        result: Result<WindowResponse, SourceError>,
    },

    Saved(Result<(), SourceError>),

    /// The beacon was handed to the source; nothing follows it.
    BeaconSent,
}
