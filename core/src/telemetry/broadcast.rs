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

//! Fans forwarding-state deltas out to every subscriber's bounded
//! egress queue. Sends never block: a full queue drops the update for
//! that subscriber alone, so one stalled client cannot hold back the
//! FIB or its peers.

use crate::types::AftUpdate;
use crate::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Egress queue capacity per subscriber.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 100;

struct Subscriber {
    tx: mpsc::Sender<AftUpdate>,
    dropped: AtomicU64,
}

pub struct Broadcaster {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Broadcaster {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate an id and egress queue for a new subscriber.
    pub async fn register(&self) -> (u64, mpsc::Receiver<AftUpdate>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                tx,
                dropped: AtomicU64::new(0),
            },
        );
        info!("subscriber registered", "id" => id);
        (id, rx)
    }

    /// Remove a subscriber. Safe to call while `run` is fanning out;
    /// the entry is reaped under the write lock and cannot leak.
    pub async fn unregister(&self, id: u64) {
        if let Some(subscriber) = self.subscribers.write().await.remove(&id) {
            let dropped = subscriber.dropped.load(Ordering::Relaxed);
            info!("subscriber unregistered", "id" => id, "dropped" => dropped);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Updates dropped so far for a subscriber, if it is registered.
    pub async fn dropped(&self, id: u64) -> Option<u64> {
        self.subscribers
            .read()
            .await
            .get(&id)
            .map(|s| s.dropped.load(Ordering::Relaxed))
    }

    /// Fan updates out until the FIB output closes or the token is
    /// cancelled, then close every egress queue so the subscriber
    /// sessions drain whatever is left and finish their streams.
    pub async fn run(&self, mut rx: mpsc::Receiver<AftUpdate>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                update = rx.recv() => match update {
                    Some(update) => self.fan_out(update).await,
                    None => break,
                },
            }
        }
        self.subscribers.write().await.clear();
        debug!("broadcaster stopped");
    }

    async fn fan_out(&self, update: AftUpdate) {
        let subscribers = self.subscribers.read().await;
        for (id, subscriber) in subscribers.iter() {
            match subscriber.tx.try_send(update) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = subscriber.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!("subscriber queue full, dropping update",
                        "id" => id, "dropped" => dropped);
                }
                // Session is tearing down; unregister will reap it.
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}
