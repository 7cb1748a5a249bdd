// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence adapter (C11).
//!
//! Concrete implementation of the §6 key-value persistence contract
//! over an embedded SQLite database, following the teacher's
//! `Mutex<Connection>`/`init_schema` pattern re-specified against
//! node/group/tag/subscription/plugin/user entities instead of DDS
//! samples.
//!
//! ```no_run
//! use gateway_persistence::{NodeRecord, PersistenceStore, SqliteStore};
//!
//! let store = SqliteStore::new("gateway.db")?;
//! store.put_node(&NodeRecord { name: "d1".into(), module_name: "modbus-tcp".into(), is_static: false, is_single: false, state: "stopped".into() })?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::{GroupRecord, NodeRecord, PersistenceStore, SubscriptionRecord, TagRecord, UserRecord};
