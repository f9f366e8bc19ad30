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

//! Forwarding Information Base: normalizes committed best paths into
//! reference-counted Next-Hop, Next-Hop-Group, and Prefix entries and
//! publishes the resulting deltas in dependency-safe order (NH before
//! NHG before Prefix on add, the reverse on delete).

use crate::types::{AftUpdate, FibUpdate, Ipv4Net};
use crate::{debug, info};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Deterministic id for the group containing `next_hop`. FNV-1a over
/// the member address bytes, so equal groups keep equal ids across
/// restarts and resubscribing collectors observe stable keys.
pub fn nhg_id(next_hop: Ipv4Addr) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in next_hop.octets() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A next-hop group and the prefixes referencing it. The member
/// address is stored here so snapshots need no reverse lookup, and so
/// the entry generalizes to multi-member groups.
struct NhgEntry {
    refs: u64,
    next_hop: Ipv4Addr,
}

#[derive(Default)]
struct FibState {
    active: HashMap<Ipv4Net, Ipv4Addr>,
    nh_refs: HashMap<Ipv4Addr, u64>,
    nhg_refs: HashMap<u64, NhgEntry>,
}

pub struct Fib {
    state: RwLock<FibState>,
}

impl Default for Fib {
    fn default() -> Self {
        Self::new()
    }
}

impl Fib {
    pub fn new() -> Self {
        Fib {
            state: RwLock::new(FibState::default()),
        }
    }

    /// Consume best-path changes until the queue closes or the token
    /// is cancelled. The telemetry sender is owned here, so every exit
    /// path closes the downstream queue.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<FibUpdate>,
        tx: mpsc::Sender<AftUpdate>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                update = rx.recv() => match update {
                    Some(update) => self.apply(update, &tx).await,
                    None => break,
                },
            }
        }
        debug!("FIB stopped");
    }

    async fn apply(&self, update: FibUpdate, tx: &mpsc::Sender<AftUpdate>) {
        let mut state = self.state.write().await;
        match update {
            FibUpdate::Add { prefix, next_hop } => {
                match state.active.get(&prefix).copied() {
                    Some(old) if old == next_hop => {
                        // Same forwarding entry re-committed: refcounts
                        // are untouched, only the prefix record is
                        // re-published.
                        let id = nhg_id(next_hop);
                        emit(tx, AftUpdate::PrefixAdd { prefix, next_hop_group: id }).await;
                        return;
                    }
                    Some(old) => remove_route(&mut state, prefix, old, tx).await,
                    None => {}
                }

                state.active.insert(prefix, next_hop);

                let nh_installed = {
                    let count = state.nh_refs.entry(next_hop).or_insert(0);
                    *count += 1;
                    *count == 1
                };
                if nh_installed {
                    emit(tx, AftUpdate::NextHopAdd { address: next_hop }).await;
                }

                let id = nhg_id(next_hop);
                let nhg_installed = {
                    let group = state
                        .nhg_refs
                        .entry(id)
                        .or_insert(NhgEntry { refs: 0, next_hop });
                    group.refs += 1;
                    group.refs == 1
                };
                if nhg_installed {
                    emit(tx, AftUpdate::NextHopGroupAdd { id, next_hop }).await;
                }

                emit(tx, AftUpdate::PrefixAdd { prefix, next_hop_group: id }).await;
                info!("route installed",
                    "prefix" => prefix.to_string(),
                    "next_hop" => next_hop.to_string(),
                    "nhg" => id);
            }
            FibUpdate::Delete { prefix } => {
                if let Some(next_hop) = state.active.get(&prefix).copied() {
                    remove_route(&mut state, prefix, next_hop, tx).await;
                    info!("route removed", "prefix" => prefix.to_string());
                }
            }
        }
    }

    /// The entire committed state as ADD records: all next-hops, then
    /// all groups, then all prefixes. New subscribers replay this
    /// sequence before receiving deltas, so the section order is the
    /// recovery contract.
    pub async fn get_snapshot(&self) -> Vec<AftUpdate> {
        let state = self.state.read().await;
        let mut snapshot =
            Vec::with_capacity(state.nh_refs.len() + state.nhg_refs.len() + state.active.len());

        for address in state.nh_refs.keys() {
            snapshot.push(AftUpdate::NextHopAdd { address: *address });
        }
        for (id, group) in &state.nhg_refs {
            snapshot.push(AftUpdate::NextHopGroupAdd {
                id: *id,
                next_hop: group.next_hop,
            });
        }
        for (prefix, next_hop) in &state.active {
            snapshot.push(AftUpdate::PrefixAdd {
                prefix: *prefix,
                next_hop_group: nhg_id(*next_hop),
            });
        }

        snapshot
    }

    /// Number of committed forwarding entries.
    pub async fn route_count(&self) -> usize {
        self.state.read().await.active.len()
    }
}

/// Release one forwarding entry: prefix record first, then the group
/// and next-hop records when their last reference goes away.
async fn remove_route(
    state: &mut FibState,
    prefix: Ipv4Net,
    next_hop: Ipv4Addr,
    tx: &mpsc::Sender<AftUpdate>,
) {
    state.active.remove(&prefix);
    emit(tx, AftUpdate::PrefixDelete { prefix }).await;

    let id = nhg_id(next_hop);
    let group = state
        .nhg_refs
        .get_mut(&id)
        .unwrap_or_else(|| panic!("next-hop group refcount underflow: {}", id));
    group.refs -= 1;
    if group.refs == 0 {
        state.nhg_refs.remove(&id);
        emit(tx, AftUpdate::NextHopGroupDelete { id }).await;
    }

    let count = state
        .nh_refs
        .get_mut(&next_hop)
        .unwrap_or_else(|| panic!("next-hop refcount underflow: {}", next_hop));
    *count -= 1;
    if *count == 0 {
        state.nh_refs.remove(&next_hop);
        emit(tx, AftUpdate::NextHopDelete { address: next_hop }).await;
    }
}

async fn emit(tx: &mpsc::Sender<AftUpdate>, update: AftUpdate) {
    if tx.send(update).await.is_err() {
        debug!("telemetry queue closed, discarding update");
    }
}
