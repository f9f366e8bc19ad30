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

//! Routing Information Base: stores every candidate route per prefix
//! and advertises the single best path to the FIB.
//!
//! Best-path election is the argmin over (admin distance, metric);
//! remaining ties go to the earliest entry in the per-prefix list. The
//! list is appended for new protocols and updated in place on re-add,
//! so the tie-break is stable across recalculations.

use crate::types::{is_valid_unicast, Action, FibUpdate, Ipv4Net, RibUpdate};
use crate::{debug, info, warn};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// A single candidate route from one protocol. A (prefix, protocol)
/// pair identifies at most one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub protocol: String,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
    pub admin_distance: u8,
}

#[derive(Default)]
struct RibState {
    routes: HashMap<Ipv4Net, Vec<RouteEntry>>,
    // Last best next-hop advertised downstream, per prefix. Updates
    // that do not change the winner are suppressed against this map.
    advertised: HashMap<Ipv4Net, Ipv4Addr>,
}

pub struct Rib {
    state: RwLock<RibState>,
}

impl Default for Rib {
    fn default() -> Self {
        Self::new()
    }
}

impl Rib {
    pub fn new() -> Self {
        Rib {
            state: RwLock::new(RibState::default()),
        }
    }

    /// Consume updates until the ingress queue closes or the token is
    /// cancelled. The FIB sender is owned here, so every exit path
    /// closes the downstream queue.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<RibUpdate>,
        tx: mpsc::Sender<FibUpdate>,
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
        debug!("RIB stopped");
    }

    async fn apply(&self, update: RibUpdate, tx: &mpsc::Sender<FibUpdate>) {
        if let Err(reason) = validate(&update) {
            warn!("dropping malformed RIB update",
                "prefix" => update.prefix.to_string(),
                "protocol" => &update.protocol,
                "reason" => reason);
            return;
        }
        match update.action {
            Action::Add => self.add_route(update, tx).await,
            Action::Delete => self.delete_route(update, tx).await,
        }
    }

    /// Add or update the (prefix, protocol) candidate, then re-elect.
    async fn add_route(&self, update: RibUpdate, tx: &mpsc::Sender<FibUpdate>) {
        let mut state = self.state.write().await;

        let entry = RouteEntry {
            protocol: update.protocol,
            next_hop: update.next_hop,
            metric: update.metric,
            admin_distance: update.admin_distance,
        };

        let entries = state.routes.entry(update.prefix).or_default();
        match entries.iter_mut().find(|e| e.protocol == entry.protocol) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }

        advertise_best(&mut state, update.prefix, tx).await;
    }

    /// Remove every candidate matching the protocol. An emptied prefix
    /// is withdrawn from the FIB; otherwise the survivors are
    /// re-elected.
    async fn delete_route(&self, update: RibUpdate, tx: &mpsc::Sender<FibUpdate>) {
        let mut state = self.state.write().await;

        let Some(entries) = state.routes.get_mut(&update.prefix) else {
            return;
        };
        entries.retain(|e| e.protocol != update.protocol);

        if entries.is_empty() {
            state.routes.remove(&update.prefix);
            state.advertised.remove(&update.prefix);
            info!("prefix withdrawn", "prefix" => update.prefix.to_string());
            send(tx, FibUpdate::Delete { prefix: update.prefix }).await;
            return;
        }

        advertise_best(&mut state, update.prefix, tx).await;
    }

    /// Best next-hop currently advertised for a prefix, if any.
    /// Read-only; does not block the writer task beyond the lock.
    pub async fn advertised_next_hop(&self, prefix: Ipv4Net) -> Option<Ipv4Addr> {
        self.state.read().await.advertised.get(&prefix).copied()
    }

    /// Number of prefixes with at least one candidate route.
    pub async fn prefix_count(&self) -> usize {
        self.state.read().await.routes.len()
    }
}

fn validate(update: &RibUpdate) -> Result<(), &'static str> {
    if !update.prefix.is_valid() {
        return Err("invalid prefix length");
    }
    if update.protocol.is_empty() {
        return Err("empty protocol tag");
    }
    if update.action == Action::Add && !is_valid_unicast(update.next_hop) {
        return Err("next hop is not unicast");
    }
    Ok(())
}

fn best_entry(entries: &[RouteEntry]) -> &RouteEntry {
    let mut best = &entries[0];
    for entry in &entries[1..] {
        if (entry.admin_distance, entry.metric) < (best.admin_distance, best.metric) {
            best = entry;
        }
    }
    best
}

/// Re-elect the best path for `prefix` and notify the FIB only when
/// the winning next-hop differs from the last one advertised.
async fn advertise_best(state: &mut RibState, prefix: Ipv4Net, tx: &mpsc::Sender<FibUpdate>) {
    let Some(entries) = state.routes.get(&prefix) else {
        return;
    };
    let best = best_entry(entries);

    if state.advertised.get(&prefix) == Some(&best.next_hop) {
        return;
    }

    info!("best path changed",
        "prefix" => prefix.to_string(),
        "next_hop" => best.next_hop.to_string(),
        "protocol" => &best.protocol,
        "admin_distance" => best.admin_distance,
        "metric" => best.metric);

    let next_hop = best.next_hop;
    state.advertised.insert(prefix, next_hop);
    send(tx, FibUpdate::Add { prefix, next_hop }).await;
}

async fn send(tx: &mpsc::Sender<FibUpdate>, update: FibUpdate) {
    if tx.send(update).await.is_err() {
        debug!("FIB queue closed, discarding update");
    }
}
