//! Process-wide directory of live connections and their broadcast groups.
//!
//! The registry is the single source of truth for fan-out targeting. It is
//! constructed once at the composition root and handed to every session —
//! there is no hidden global.
//!
//! All mutations run under one synchronous `RwLock` write guard, so each
//! register/unregister is atomic with respect to every other task on the
//! runtime. Sends collect their targets under the read guard and deliver
//! after releasing it; a connection unregistered in between simply drops the
//! message, which is the documented lossy-fan-out behavior.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::{ConnectionId, Partition};
use tracing::{debug, warn};

use super::connection::Connection;

#[derive(Default)]
struct Inner {
    /// Live connections by id.
    connections: HashMap<ConnectionId, Entry>,
    /// Group name → member ids, in registration order.
    groups: HashMap<String, Vec<ConnectionId>>,
}

struct Entry {
    conn: Arc<Connection>,
    groups: Vec<String>,
}

/// Directory of live connections and group memberships.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) a connection and add it to `groups`.
    ///
    /// Re-registering an id first removes the old memberships, so the call
    /// is idempotent per connection id.
    pub fn register(&self, conn: Arc<Connection>, groups: &[String]) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.connections.remove(&conn.id) {
            remove_memberships(&mut inner, &conn.id, &old.groups);
        }

        let mut joined: Vec<String> = Vec::with_capacity(groups.len());
        for group in groups {
            if joined.contains(group) {
                continue;
            }
            let members = inner.groups.entry(group.clone()).or_default();
            members.push(conn.id.clone());
            joined.push(group.clone());
        }

        debug!(conn_id = %conn.id, groups = ?joined, "connection registered");
        let id = conn.id.clone();
        let _ = inner.connections.insert(id, Entry { conn, groups: joined });
    }

    /// Remove a connection and every group membership it held.
    ///
    /// Unknown ids are a no-op; groups left empty are deleted.
    pub fn unregister(&self, id: &ConnectionId) {
        let mut inner = self.inner.write();
        let Some(entry) = inner.connections.remove(id) else {
            return;
        };
        remove_memberships(&mut inner, id, &entry.groups);
        debug!(conn_id = %id, "connection unregistered");
    }

    /// Deliver a message to one connection.
    ///
    /// A missing connection is not an error — clients legitimately
    /// disconnect between a fan-out decision and delivery.
    pub fn send_to(&self, id: &ConnectionId, message: Arc<String>) -> bool {
        let target = self.inner.read().connections.get(id).map(|e| e.conn.clone());
        match target {
            Some(conn) => conn.send(message),
            None => false,
        }
    }

    /// Deliver a message to every member of `group`, in registration order.
    ///
    /// A failed send to one member never blocks delivery to the rest.
    /// Returns the number of successful deliveries.
    pub fn send_to_group(&self, group: &str, message: &Arc<String>) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let inner = self.inner.read();
            match inner.groups.get(group) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| inner.connections.get(id).map(|e| e.conn.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        for conn in targets {
            if conn.send(message.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = %conn.id, group, "dropped group message");
            }
        }
        delivered
    }

    /// Deliver a message to every registered connection.
    pub fn broadcast(&self, message: &Arc<String>) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let inner = self.inner.read();
            inner.connections.values().map(|e| e.conn.clone()).collect()
        };

        let mut delivered = 0;
        for conn in targets {
            if conn.send(message.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = %conn.id, "dropped broadcast message");
            }
        }
        delivered
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.inner.read().groups.len()
    }

    /// Whether a connection id is currently registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.inner.read().connections.contains_key(id)
    }

    /// Member ids of a group, in registration order.
    pub fn members(&self, group: &str) -> Vec<ConnectionId> {
        self.inner
            .read()
            .groups
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Partitions that currently have at least one bound connection,
    /// in no particular order, without duplicates.
    pub fn active_partitions(&self) -> Vec<Partition> {
        let inner = self.inner.read();
        let mut partitions: Vec<Partition> = Vec::new();
        for entry in inner.connections.values() {
            if let Some(p) = entry.conn.partition() {
                if !partitions.contains(p) {
                    partitions.push(p.clone());
                }
            }
        }
        partitions
    }
}

fn remove_memberships(inner: &mut Inner, id: &ConnectionId, groups: &[String]) {
    for group in groups {
        if let Some(members) = inner.groups.get_mut(group) {
            members.retain(|member| member != id);
            if members.is_empty() {
                let _ = inner.groups.remove(group);
            }
        }
    }
}
