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

//! Route installers inject candidate routes into the RIB.

pub mod mock;

pub use mock::MockInstaller;

use crate::types::RibUpdate;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A source of route updates. An installer emits updates on `rib_tx`
/// until cancelled, then returns. Installers never close the RIB
/// ingress queue themselves; the supervisor drops the sender once the
/// installer has returned.
pub trait RouteInstaller: Send + 'static {
    fn run(
        self,
        rib_tx: mpsc::Sender<RibUpdate>,
        shutdown: CancellationToken,
    ) -> impl Future<Output = ()> + Send;
}
