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

//! Synthetic route source: loads a configurable number of prefixes,
//! then churns them at a fixed rate with occasional withdrawals.

use super::RouteInstaller;
use crate::config::MockInstallerConfig;
use crate::info;
use crate::types::{Action, Ipv4Net, RibUpdate, PROTOCOL_MOCK};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const NEXT_HOPS: [Ipv4Addr; 4] = [
    Ipv4Addr::new(192, 168, 1, 1),
    Ipv4Addr::new(192, 168, 1, 2),
    Ipv4Addr::new(192, 168, 1, 3),
    Ipv4Addr::new(192, 168, 1, 4),
];

const DELETE_FRACTION: f32 = 0.1;

pub struct MockInstaller {
    config: MockInstallerConfig,
}

impl MockInstaller {
    pub fn new(config: MockInstallerConfig) -> Self {
        MockInstaller { config }
    }

    fn route(prefix: Ipv4Net, next_hop: Ipv4Addr, action: Action) -> RibUpdate {
        RibUpdate {
            action,
            protocol: PROTOCOL_MOCK.to_string(),
            prefix,
            next_hop,
            metric: 10,
            admin_distance: 1,
        }
    }
}

impl RouteInstaller for MockInstaller {
    async fn run(self, rib_tx: mpsc::Sender<RibUpdate>, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("mock installer disabled");
            return;
        }

        info!("mock installer starting",
            "route_count" => self.config.route_count,
            "churn_rate" => self.config.churn_rate);

        let prefixes = generate_prefixes(self.config.route_count);
        for (i, prefix) in prefixes.iter().enumerate() {
            let update = Self::route(*prefix, NEXT_HOPS[i % NEXT_HOPS.len()], Action::Add);
            tokio::select! {
                _ = shutdown.cancelled() => return,
                result = rib_tx.send(update) => {
                    if result.is_err() {
                        return;
                    }
                }
            }
        }
        info!("mock installer initial load complete", "count" => prefixes.len());

        if prefixes.is_empty() {
            shutdown.cancelled().await;
            return;
        }

        let period = if self.config.churn_rate == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(1) / self.config.churn_rate
        };
        let mut ticker = tokio::time::interval(period);
        let mut rng = StdRng::from_entropy();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let prefix = prefixes[rng.gen_range(0..prefixes.len())];
                    let next_hop = NEXT_HOPS[rng.gen_range(0..NEXT_HOPS.len())];
                    let action = if rng.gen::<f32>() < DELETE_FRACTION {
                        Action::Delete
                    } else {
                        Action::Add
                    };
                    if rib_tx.send(Self::route(prefix, next_hop, action)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// 10.x.y.0/24 prefixes with index-derived middle octets. Wraps past
/// 65536 entries, which is plenty for a synthetic table.
fn generate_prefixes(count: usize) -> Vec<Ipv4Net> {
    (0..count)
        .map(|i| Ipv4Net {
            address: Ipv4Addr::new(10, ((i >> 8) & 0xFF) as u8, (i & 0xFF) as u8, 0),
            prefix_length: 24,
        })
        .collect()
}
