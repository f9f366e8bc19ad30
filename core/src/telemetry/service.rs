// Copyright 2025 aftsim Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The gNMI Subscribe RPC. Each accepted subscription receives the
//! full forwarding-state snapshot, a sync marker, and then the live
//! delta stream from its broadcaster egress queue.

use super::broadcast::{Broadcaster, SUBSCRIBER_QUEUE_DEPTH};
use super::encode;
use super::proto::subscribe_request;
use super::proto::subscribe_response::Response as SubscribeResponseKind;
use super::proto::subscription_list::Mode;
use super::proto::{SubscribeRequest, SubscribeResponse};
use crate::fib::Fib;
use crate::types::AftUpdate;
use crate::{debug, info};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

pub struct GnmiService {
    fib: Arc<Fib>,
    broadcaster: Arc<Broadcaster>,
}

impl GnmiService {
    pub fn new(fib: Arc<Fib>, broadcaster: Arc<Broadcaster>) -> Self {
        GnmiService { fib, broadcaster }
    }
}

#[tonic::async_trait]
impl super::proto::g_nmi_server::GNmi for GnmiService {
    type SubscribeStream =
        Pin<Box<dyn Stream<Item = Result<SubscribeResponse, Status>> + Send + 'static>>;

    async fn subscribe(
        &self,
        request: Request<Streaming<SubscribeRequest>>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let mut requests = request.into_inner();

        let first = requests
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("expected an initial subscribe request"))?;
        let subscription = match first.request {
            Some(subscribe_request::Request::Subscribe(list)) => list,
            _ => {
                return Err(Status::invalid_argument(
                    "first request must carry a subscription list",
                ))
            }
        };
        // Paths and sample intervals are accepted but not filtered on:
        // every subscriber observes the full AFT change feed.
        if subscription.mode() != Mode::Stream {
            return Err(Status::unimplemented("only STREAM mode is supported"));
        }

        let (id, egress) = self.broadcaster.register().await;
        let (response_tx, response_rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);

        let fib = Arc::clone(&self.fib);
        let broadcaster = Arc::clone(&self.broadcaster);
        tokio::spawn(async move {
            stream_session(id, fib, requests, egress, &response_tx).await;
            broadcaster.unregister(id).await;
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(response_rx))))
    }
}

/// Snapshot, sync marker, then live updates. Returning from here ends
/// the response stream; the caller deregisters on every exit path.
async fn stream_session(
    id: u64,
    fib: Arc<Fib>,
    mut requests: Streaming<SubscribeRequest>,
    mut egress: mpsc::Receiver<AftUpdate>,
    response_tx: &mpsc::Sender<Result<SubscribeResponse, Status>>,
) {
    let snapshot = fib.get_snapshot().await;
    let entries = snapshot.len();
    for update in &snapshot {
        if send_update(response_tx, update).await.is_err() {
            return;
        }
    }

    let sync = SubscribeResponse {
        response: Some(SubscribeResponseKind::SyncResponse(true)),
    };
    if response_tx.send(Ok(sync)).await.is_err() {
        return;
    }
    info!("subscriber synchronized", "id" => id, "entries" => entries);

    let mut requests_done = false;
    loop {
        tokio::select! {
            update = egress.recv() => match update {
                Some(update) => {
                    if send_update(response_tx, &update).await.is_err() {
                        return;
                    }
                }
                // Broadcaster shut down: end the stream cleanly.
                None => return,
            },
            request = requests.message(), if !requests_done => match request {
                // Subsequent requests carry no meaning for a stream
                // subscription; polls are ignored.
                Ok(Some(_)) => {}
                // Half-close: the client is done talking but still
                // listening. Keep streaming.
                Ok(None) => requests_done = true,
                Err(status) => {
                    debug!("subscriber request stream failed",
                        "id" => id, "error" => status.to_string());
                    return;
                }
            },
        }
    }
}

async fn send_update(
    tx: &mpsc::Sender<Result<SubscribeResponse, Status>>,
    update: &AftUpdate,
) -> Result<(), ()> {
    let response = SubscribeResponse {
        response: Some(SubscribeResponseKind::Update(encode::notification(update))),
    };
    tx.send(Ok(response)).await.map_err(|_| ())
}
