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

//! gNMI telemetry: fan-out of forwarding-state deltas to streaming
//! subscribers, wire encoding, and the Subscribe RPC implementation.

pub mod broadcast;
mod encode;
pub mod service;

pub mod proto {
    tonic::include_proto!("gnmi");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("gnmi_descriptor");
}

pub use broadcast::{Broadcaster, SUBSCRIBER_QUEUE_DEPTH};
pub use service::GnmiService;
