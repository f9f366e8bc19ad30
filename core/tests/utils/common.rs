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

//! Common test utilities: an in-process pipeline with a gNMI endpoint
//! on an ephemeral port, plus decoding helpers for the AFT paths.

#![allow(dead_code)]

use aftsim::fib::Fib;
use aftsim::rib::Rib;
use aftsim::telemetry::proto::g_nmi_client::GNmiClient;
use aftsim::telemetry::proto::g_nmi_server::GNmiServer;
use aftsim::telemetry::proto::subscribe_response::Response as ResponseKind;
use aftsim::telemetry::proto::{
    subscribe_request, typed_value, Notification, SubscribeRequest, SubscribeResponse,
    SubscriptionList,
};
use aftsim::telemetry::{Broadcaster, GnmiService};
use aftsim::types::{Action, RibUpdate};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::{Status, Streaming};

const QUEUE_DEPTH: usize = 1024;

/// A running RIB/FIB/broadcaster pipeline serving gNMI on an
/// ephemeral port. Routes are injected through `rib_tx`.
pub struct TestPipeline {
    pub rib_tx: mpsc::Sender<RibUpdate>,
    pub fib: Arc<Fib>,
    pub shutdown: CancellationToken,
    pub grpc_addr: String,
}

pub async fn start_pipeline() -> TestPipeline {
    let (rib_tx, rib_rx) = mpsc::channel(QUEUE_DEPTH);
    let (fib_tx, fib_rx) = mpsc::channel(QUEUE_DEPTH);
    let (aft_tx, aft_rx) = mpsc::channel(QUEUE_DEPTH);

    let rib = Arc::new(Rib::new());
    let fib = Arc::new(Fib::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let shutdown = CancellationToken::new();

    {
        let rib = Arc::clone(&rib);
        let token = shutdown.clone();
        tokio::spawn(async move { rib.run(rib_rx, fib_tx, token).await });
    }
    {
        let fib = Arc::clone(&fib);
        let token = shutdown.clone();
        tokio::spawn(async move { fib.run(fib_rx, aft_tx, token).await });
    }
    {
        let broadcaster = Arc::clone(&broadcaster);
        let token = shutdown.clone();
        tokio::spawn(async move { broadcaster.run(aft_rx, token).await });
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let grpc_addr = format!("http://{}", listener.local_addr().unwrap());
    let service = GnmiService::new(Arc::clone(&fib), Arc::clone(&broadcaster));
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(GNmiServer::new(service))
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(listener),
                    token.cancelled_owned(),
                )
                .await
                .unwrap();
        });
    }

    TestPipeline {
        rib_tx,
        fib,
        shutdown,
        grpc_addr,
    }
}

/// Connect with bounded retries; the server socket is already bound,
/// but the acceptor task may not have been polled yet.
pub async fn connect_client(addr: &str) -> GNmiClient<Channel> {
    for _ in 0..50 {
        match GNmiClient::connect(addr.to_string()).await {
            Ok(client) => return client,
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    panic!("failed to connect to gNMI server at {}", addr);
}

pub fn subscription_request(mode: i32) -> SubscribeRequest {
    SubscribeRequest {
        request: Some(subscribe_request::Request::Subscribe(SubscriptionList {
            mode,
            ..Default::default()
        })),
    }
}

/// Open a Subscribe RPC with the given initial request. The returned
/// sender keeps the client side of the stream alive.
pub async fn open_subscription(
    client: &mut GNmiClient<Channel>,
    initial: SubscribeRequest,
) -> Result<(mpsc::Sender<SubscribeRequest>, Streaming<SubscribeResponse>), Status> {
    let (request_tx, request_rx) = mpsc::channel(8);
    request_tx.send(initial).await.unwrap();
    let response = client.subscribe(ReceiverStream::new(request_rx)).await?;
    Ok((request_tx, response.into_inner()))
}

/// Open a subscription expecting the server to refuse it, wherever in
/// the handshake the status surfaces.
pub async fn expect_subscribe_error(
    client: &mut GNmiClient<Channel>,
    initial: SubscribeRequest,
) -> Status {
    match open_subscription(client, initial).await {
        Err(status) => status,
        Ok((_request_tx, mut stream)) => match stream.message().await {
            Err(status) => status,
            Ok(message) => panic!("expected subscribe failure, got {:?}", message),
        },
    }
}

pub fn add(protocol: &str, prefix: &str, next_hop: &str, metric: u32, ad: u8) -> RibUpdate {
    RibUpdate {
        action: Action::Add,
        protocol: protocol.to_string(),
        prefix: prefix.parse().unwrap(),
        next_hop: next_hop.parse().unwrap(),
        metric,
        admin_distance: ad,
    }
}

pub fn del(protocol: &str, prefix: &str) -> RibUpdate {
    RibUpdate {
        action: Action::Delete,
        protocol: protocol.to_string(),
        prefix: prefix.parse().unwrap(),
        next_hop: Ipv4Addr::UNSPECIFIED,
        metric: 0,
        admin_distance: 0,
    }
}

/// Poll the FIB until it holds the expected number of routes.
pub async fn wait_for_route_count(fib: &Fib, expected: usize) {
    for _ in 0..200 {
        if fib.route_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "FIB never reached {} routes (at {})",
        expected,
        fib.route_count().await
    );
}

/// A decoded AFT notification, reduced to the fields the tests assert
/// on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    NextHopAdd { index: String },
    NextHopDelete { index: String },
    NextHopGroupAdd { id: u64, member: String },
    NextHopGroupDelete { id: u64 },
    PrefixAdd { prefix: String, group: u64 },
    PrefixDelete { prefix: String },
}

pub fn decode(notification: &Notification) -> Record {
    if let Some(update) = notification.update.first() {
        let path = update.path.as_ref().expect("update without path");
        match path.elem[3].name.as_str() {
            "next-hops" => Record::NextHopAdd {
                index: path.elem[4].key["index"].clone(),
            },
            "next-hop-groups" => Record::NextHopGroupAdd {
                id: path.elem[4].key["id"].parse().unwrap(),
                member: path.elem[6].key["index"].clone(),
            },
            "ipv4-unicast" => {
                let group = match &update.val.as_ref().expect("prefix update without value").value
                {
                    Some(typed_value::Value::UintVal(group)) => *group,
                    other => panic!("prefix update with non-uint value: {:?}", other),
                };
                Record::PrefixAdd {
                    prefix: path.elem[4].key["prefix"].clone(),
                    group,
                }
            }
            other => panic!("unexpected AFT subtree: {}", other),
        }
    } else {
        let path = notification.delete.first().expect("empty notification");
        match path.elem[3].name.as_str() {
            "next-hops" => Record::NextHopDelete {
                index: path.elem[4].key["index"].clone(),
            },
            "next-hop-groups" => Record::NextHopGroupDelete {
                id: path.elem[4].key["id"].parse().unwrap(),
            },
            "ipv4-unicast" => Record::PrefixDelete {
                prefix: path.elem[4].key["prefix"].clone(),
            },
            other => panic!("unexpected AFT subtree: {}", other),
        }
    }
}

/// Read responses until the sync marker, returning the decoded
/// snapshot records.
pub async fn collect_until_sync(stream: &mut Streaming<SubscribeResponse>) -> Vec<Record> {
    let mut records = Vec::new();
    loop {
        match next_response(stream).await {
            ResponseKind::Update(notification) => records.push(decode(&notification)),
            ResponseKind::SyncResponse(true) => return records,
            other => panic!("unexpected response before sync: {:?}", other),
        }
    }
}

/// Read the next decoded AFT record, skipping nothing.
pub async fn next_record(stream: &mut Streaming<SubscribeResponse>) -> Record {
    match next_response(stream).await {
        ResponseKind::Update(notification) => decode(&notification),
        other => panic!("expected an update, got {:?}", other),
    }
}

async fn next_response(stream: &mut Streaming<SubscribeResponse>) -> ResponseKind {
    tokio::time::timeout(Duration::from_secs(5), stream.message())
        .await
        .expect("timed out waiting for a subscribe response")
        .expect("subscribe stream failed")
        .expect("subscribe stream ended unexpectedly")
        .response
        .expect("subscribe response without payload")
}

/// Every group add must follow the add of its member next-hop, and
/// every prefix add the add of its group.
pub fn assert_dependency_order(records: &[Record]) {
    let mut next_hops: HashSet<&str> = HashSet::new();
    let mut groups: HashMap<u64, &str> = HashMap::new();
    for record in records {
        match record {
            Record::NextHopAdd { index } => {
                next_hops.insert(index);
            }
            Record::NextHopGroupAdd { id, member } => {
                assert!(
                    next_hops.contains(member.as_str()),
                    "group {} published before its next-hop {}",
                    id,
                    member
                );
                groups.insert(*id, member.as_str());
            }
            Record::PrefixAdd { prefix, group } => {
                assert!(
                    groups.contains_key(group),
                    "prefix {} published before its group {}",
                    prefix,
                    group
                );
            }
            _ => {}
        }
    }
}
