//! Loader worker - runs the book source on a dedicated thread

use flume::{Receiver, Sender};
use log::debug;

use crate::request::{LoadRequest, LoadResponse};
use crate::source::BookSource;

/// Serves requests in arrival order until `Shutdown` or until the service
/// hangs up.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn load_worker<S: BookSource>(
    mut source: S,
    requests: Receiver<LoadRequest>,
    responses: Sender<LoadResponse>,
) {
    for request in requests {
        let response = match request {
            LoadRequest::Toc => LoadResponse::Toc(source.fetch_toc()),

            LoadRequest::Progress => LoadResponse::Progress(source.fetch_progress()),

            LoadRequest::Window { id, index, buffer } => LoadResponse::Window {
                id,
                result: source.fetch_window(index, buffer),
            },

            LoadRequest::SaveProgress(payload) => {
                LoadResponse::Saved(source.save_progress(&payload))
            }

            LoadRequest::Beacon(payload) => {
                source.send_beacon(&payload);
                LoadResponse::BeaconSent
            }

            LoadRequest::Shutdown => break,
        };

        if responses.send(response).is_err() {
            debug!("Service hung up, stopping loader worker");
            break;
        }
    }
    debug!("Loader worker for {} stopped", source.book_id());
}
