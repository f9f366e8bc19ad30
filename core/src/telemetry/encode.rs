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

//! Maps forwarding-state deltas onto the OpenConfig AFT subtree of the
//! gNMI schema. Adds set the characteristic leaf of the entry; deletes
//! address the list element itself.

use super::proto::{typed_value, Notification, Path, PathElem, TypedValue, Update};
use crate::types::{AftUpdate, Ipv4Net, DEFAULT_NETWORK_INSTANCE};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::SystemTime;

fn elem(name: &str) -> PathElem {
    PathElem {
        name: name.to_string(),
        key: HashMap::new(),
    }
}

fn keyed_elem(name: &str, key: &str, value: String) -> PathElem {
    PathElem {
        name: name.to_string(),
        key: HashMap::from([(key.to_string(), value)]),
    }
}

/// Common stem: network-instances/network-instance[name=DEFAULT]/afts.
fn afts_stem() -> Vec<PathElem> {
    vec![
        elem("network-instances"),
        keyed_elem(
            "network-instance",
            "name",
            DEFAULT_NETWORK_INSTANCE.to_string(),
        ),
        elem("afts"),
    ]
}

fn next_hop_entry(address: Ipv4Addr) -> Vec<PathElem> {
    let mut elems = afts_stem();
    elems.push(elem("next-hops"));
    elems.push(keyed_elem("next-hop", "index", address.to_string()));
    elems
}

fn next_hop_group_entry(id: u64) -> Vec<PathElem> {
    let mut elems = afts_stem();
    elems.push(elem("next-hop-groups"));
    elems.push(keyed_elem("next-hop-group", "id", id.to_string()));
    elems
}

fn ipv4_entry(prefix: &Ipv4Net) -> Vec<PathElem> {
    let mut elems = afts_stem();
    elems.push(elem("ipv4-unicast"));
    elems.push(keyed_elem("ipv4-entry", "prefix", prefix.to_string()));
    elems
}

fn uint_val(value: u64) -> TypedValue {
    TypedValue {
        value: Some(typed_value::Value::UintVal(value)),
    }
}

fn string_val(value: String) -> TypedValue {
    TypedValue {
        value: Some(typed_value::Value::StringVal(value)),
    }
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn update_notification(elems: Vec<PathElem>, val: TypedValue) -> Notification {
    Notification {
        timestamp: unix_nanos(),
        update: vec![Update {
            path: Some(Path {
                elem: elems,
                ..Default::default()
            }),
            val: Some(val),
            duplicates: 0,
        }],
        ..Default::default()
    }
}

fn delete_notification(elems: Vec<PathElem>) -> Notification {
    Notification {
        timestamp: unix_nanos(),
        delete: vec![Path {
            elem: elems,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Encode one forwarding-state delta as a gNMI notification. The
/// timestamp is taken here, at construction.
pub fn notification(update: &AftUpdate) -> Notification {
    match *update {
        AftUpdate::NextHopAdd { address } => {
            let mut elems = next_hop_entry(address);
            elems.push(elem("state"));
            elems.push(elem("ip-address"));
            update_notification(elems, string_val(address.to_string()))
        }
        AftUpdate::NextHopDelete { address } => delete_notification(next_hop_entry(address)),
        AftUpdate::NextHopGroupAdd { id, next_hop } => {
            let mut elems = next_hop_group_entry(id);
            elems.push(elem("next-hops"));
            elems.push(keyed_elem("next-hop", "index", next_hop.to_string()));
            elems.push(elem("state"));
            elems.push(elem("weight"));
            update_notification(elems, uint_val(1))
        }
        AftUpdate::NextHopGroupDelete { id } => delete_notification(next_hop_group_entry(id)),
        AftUpdate::PrefixAdd { prefix, next_hop_group } => {
            let mut elems = ipv4_entry(&prefix);
            elems.push(elem("state"));
            elems.push(elem("next-hop-group"));
            update_notification(elems, uint_val(next_hop_group))
        }
        AftUpdate::PrefixDelete { prefix } => delete_notification(ipv4_entry(&prefix)),
    }
}
