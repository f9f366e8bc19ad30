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

//! Shared data model for the routing pipeline: prefix keys, the update
//! records exchanged between stages, and the normalized forwarding
//! deltas published to telemetry subscribers.

use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Network instance name used in all telemetry paths.
pub const DEFAULT_NETWORK_INSTANCE: &str = "DEFAULT";

/// Protocol tag used by the mock route installer.
pub const PROTOCOL_MOCK: &str = "MOCK";

/// An IPv4 destination prefix. Used as a map key throughout the
/// pipeline; two prefixes are equal iff address and length match.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Ipv4Net {
    pub address: Ipv4Addr,
    pub prefix_length: u8,
}

impl Ipv4Net {
    pub fn new(address: Ipv4Addr, prefix_length: u8) -> Result<Self, PrefixError> {
        if prefix_length > 32 {
            return Err(PrefixError::InvalidLength(prefix_length));
        }
        Ok(Ipv4Net {
            address,
            prefix_length,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.prefix_length <= 32
    }
}

impl Display for Ipv4Net {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_length)
    }
}

impl FromStr for Ipv4Net {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| PrefixError::Malformed(s.to_string()))?;
        let address: Ipv4Addr = addr
            .parse()
            .map_err(|_| PrefixError::Malformed(s.to_string()))?;
        let prefix_length: u8 = len
            .parse()
            .map_err(|_| PrefixError::Malformed(s.to_string()))?;
        Ipv4Net::new(address, prefix_length)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PrefixError {
    InvalidLength(u8),
    Malformed(String),
}

impl Display for PrefixError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefixError::InvalidLength(len) => write!(f, "invalid prefix length: {}", len),
            PrefixError::Malformed(s) => write!(f, "malformed prefix: {}", s),
        }
    }
}

impl std::error::Error for PrefixError {}

/// Validates that an IPv4 address is a usable unicast next-hop.
/// Returns false for 0.0.0.0, 255.255.255.255, and multicast
/// (224.0.0.0/4).
pub fn is_valid_unicast(addr: Ipv4Addr) -> bool {
    let ip = u32::from(addr);
    !(ip == 0 || ip == 0xFFFFFFFF || (ip & 0xF0000000) == 0xE0000000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Delete,
}

/// An update submitted by a route installer to the RIB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RibUpdate {
    pub action: Action,
    pub protocol: String,
    pub prefix: Ipv4Net,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
    pub admin_distance: u8,
}

/// A best-path change emitted by the RIB toward the FIB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FibUpdate {
    Add { prefix: Ipv4Net, next_hop: Ipv4Addr },
    Delete { prefix: Ipv4Net },
}

/// A normalized forwarding-state delta published by the FIB. Each
/// variant carries exactly the fields its entry type needs, so the
/// telemetry encoder's dispatch is exhaustive and illegal field
/// combinations cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AftUpdate {
    NextHopAdd { address: Ipv4Addr },
    NextHopDelete { address: Ipv4Addr },
    NextHopGroupAdd { id: u64, next_hop: Ipv4Addr },
    NextHopGroupDelete { id: u64 },
    PrefixAdd { prefix: Ipv4Net, next_hop_group: u64 },
    PrefixDelete { prefix: Ipv4Net },
}
