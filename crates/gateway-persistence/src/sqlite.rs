// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite persistence backend (§4.11, §6).
//!
//! One table per entity family, "last write wins" via
//! `INSERT ... ON CONFLICT DO UPDATE`. Thread-safe via an internal
//! `Mutex` (SQLite's `Connection` is not `Sync`).

use crate::store::{GroupRecord, NodeRecord, PersistenceStore, SubscriptionRecord, TagRecord, UserRecord};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-based database at `path`.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("failed to open sqlite database at {path}"))?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to create in-memory sqlite database")?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                name TEXT PRIMARY KEY,
                module_name TEXT NOT NULL,
                is_static INTEGER NOT NULL,
                is_single INTEGER NOT NULL,
                state TEXT NOT NULL DEFAULT 'stopped'
            );
            CREATE TABLE IF NOT EXISTS settings (
                node TEXT PRIMARY KEY,
                blob TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS groups (
                driver TEXT NOT NULL,
                name TEXT NOT NULL,
                interval_ms INTEGER NOT NULL,
                PRIMARY KEY (driver, name)
            );
            CREATE TABLE IF NOT EXISTS tags (
                driver TEXT NOT NULL,
                grp TEXT NOT NULL,
                name TEXT NOT NULL,
                tag_json TEXT NOT NULL,
                PRIMARY KEY (driver, grp, name)
            );
            CREATE INDEX IF NOT EXISTS idx_tags_driver_group ON tags(driver, grp);
            CREATE TABLE IF NOT EXISTS subscriptions (
                app TEXT NOT NULL,
                driver TEXT NOT NULL,
                grp TEXT NOT NULL,
                params TEXT,
                static_tags TEXT,
                PRIMARY KEY (app, driver, grp)
            );
            CREATE INDEX IF NOT EXISTS idx_subs_app ON subscriptions(app);
            CREATE TABLE IF NOT EXISTS plugins (
                library_id TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS users (
                name TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl PersistenceStore for SqliteStore {
    fn put_node(&self, node: &NodeRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO nodes (name, module_name, is_static, is_single, state) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET module_name = excluded.module_name, is_static = excluded.is_static, is_single = excluded.is_single, state = excluded.state",
            params![node.name, node.module_name, node.is_static as i64, node.is_single as i64, node.state],
        )?;
        Ok(())
    }

    fn delete_node(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM nodes WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn update_node(&self, name: &str, new_name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE nodes SET name = ?2 WHERE name = ?1", params![name, new_name])?;
        Ok(())
    }

    fn set_node_state(&self, name: &str, state: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE nodes SET state = ?2 WHERE name = ?1", params![name, state])?;
        Ok(())
    }

    fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, module_name, is_static, is_single, state FROM nodes ORDER BY name")?;
        let nodes = stmt
            .query_map([], |row| {
                Ok(NodeRecord {
                    name: row.get(0)?,
                    module_name: row.get(1)?,
                    is_static: row.get::<_, i64>(2)? != 0,
                    is_single: row.get::<_, i64>(3)? != 0,
                    state: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn put_setting(&self, node: &str, blob: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let text = serde_json::to_string(blob)?;
        conn.execute(
            "INSERT INTO settings (node, blob) VALUES (?1, ?2)
             ON CONFLICT(node) DO UPDATE SET blob = excluded.blob",
            params![node, text],
        )?;
        Ok(())
    }

    fn get_setting(&self, node: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().unwrap();
        let text: Option<String> = conn
            .query_row("SELECT blob FROM settings WHERE node = ?1", params![node], |row| row.get(0))
            .ok();
        Ok(match text {
            Some(t) => Some(serde_json::from_str(&t)?),
            None => None,
        })
    }

    fn delete_setting(&self, node: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM settings WHERE node = ?1", params![node])?;
        Ok(())
    }

    fn put_group(&self, driver: &str, group: &GroupRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO groups (driver, name, interval_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(driver, name) DO UPDATE SET interval_ms = excluded.interval_ms",
            params![driver, group.name, group.interval_ms as i64],
        )?;
        Ok(())
    }

    fn update_group(&self, driver: &str, name: &str, group: &GroupRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE groups SET name = ?3, interval_ms = ?4 WHERE driver = ?1 AND name = ?2",
            params![driver, name, group.name, group.interval_ms as i64],
        )?;
        Ok(())
    }

    fn list_groups(&self, driver: &str) -> Result<Vec<GroupRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, interval_ms FROM groups WHERE driver = ?1 ORDER BY name")?;
        let groups = stmt
            .query_map(params![driver], |row| {
                Ok(GroupRecord { name: row.get(0)?, interval_ms: row.get::<_, i64>(1)? as u64 })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    fn delete_group(&self, driver: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM groups WHERE driver = ?1 AND name = ?2", params![driver, name])?;
        conn.execute("DELETE FROM tags WHERE driver = ?1 AND grp = ?2", params![driver, name])?;
        Ok(())
    }

    fn put_tag(&self, driver: &str, group: &str, tag: &TagRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(&tag.tag_json)?;
        conn.execute(
            "INSERT INTO tags (driver, grp, name, tag_json) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(driver, grp, name) DO UPDATE SET tag_json = excluded.tag_json",
            params![driver, group, tag.name, json],
        )?;
        Ok(())
    }

    fn put_tags_batch(&self, driver: &str, group: &str, tags: &[TagRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for tag in tags {
            let json = serde_json::to_string(&tag.tag_json)?;
            tx.execute(
                "INSERT INTO tags (driver, grp, name, tag_json) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(driver, grp, name) DO UPDATE SET tag_json = excluded.tag_json",
                params![driver, group, tag.name, json],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_tags(&self, driver: &str, group: &str) -> Result<Vec<TagRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, tag_json FROM tags WHERE driver = ?1 AND grp = ?2 ORDER BY name")?;
        let tags = stmt
            .query_map(params![driver, group], |row| {
                let json: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, json))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(name, json)| -> Result<TagRecord> { Ok(TagRecord { name, tag_json: serde_json::from_str(&json)? }) })
            .collect::<Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn update_tag(&self, driver: &str, group: &str, tag: &TagRecord) -> Result<()> {
        self.put_tag(driver, group, tag)
    }

    fn delete_tag(&self, driver: &str, group: &str, tag_name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM tags WHERE driver = ?1 AND grp = ?2 AND name = ?3", params![driver, group, tag_name])?;
        Ok(())
    }

    fn put_subscription(&self, sub: &SubscriptionRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO subscriptions (app, driver, grp, params, static_tags) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(app, driver, grp) DO UPDATE SET params = excluded.params, static_tags = excluded.static_tags",
            params![sub.app, sub.driver, sub.group, sub.params, sub.static_tags],
        )?;
        Ok(())
    }

    fn update_subscription(&self, sub: &SubscriptionRecord) -> Result<()> {
        self.put_subscription(sub)
    }

    fn list_subscriptions(&self, app: &str) -> Result<Vec<SubscriptionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT app, driver, grp, params, static_tags FROM subscriptions WHERE app = ?1 ORDER BY driver, grp")?;
        let subs = stmt
            .query_map(params![app], |row| {
                Ok(SubscriptionRecord {
                    app: row.get(0)?,
                    driver: row.get(1)?,
                    group: row.get(2)?,
                    params: row.get(3)?,
                    static_tags: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subs)
    }

    fn delete_subscription(&self, app: &str, driver: &str, group: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM subscriptions WHERE app = ?1 AND driver = ?2 AND grp = ?3", params![app, driver, group])?;
        Ok(())
    }

    fn put_plugin_list(&self, library_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM plugins", [])?;
        for id in library_ids {
            tx.execute("INSERT INTO plugins (library_id) VALUES (?1)", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_plugins(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT library_id FROM plugins ORDER BY library_id")?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn put_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (name, password_hash, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET password_hash = excluded.password_hash, role = excluded.role",
            params![user.name, user.password_hash, user.role],
        )?;
        Ok(())
    }

    fn get_user(&self, name: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row("SELECT name, password_hash, role FROM users WHERE name = ?1", params![name], |row| {
                Ok(UserRecord { name: row.get(0)?, password_hash: row.get(1)?, role: row.get(2)? })
            })
            .ok();
        Ok(user)
    }

    fn list_users(&self) -> Result<Vec<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, password_hash, role FROM users ORDER BY name")?;
        let users = stmt
            .query_map([], |row| Ok(UserRecord { name: row.get(0)?, password_hash: row.get(1)?, role: row.get(2)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn delete_user(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM users WHERE name = ?1", params![name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_node_then_list_roundtrips() {
        let store = SqliteStore::new_in_memory().unwrap();
        let node = NodeRecord { name: "d1".into(), module_name: "modbus-tcp".into(), is_static: false, is_single: false, state: "stopped".into() };
        store.put_node(&node).unwrap();
        assert_eq!(store.list_nodes().unwrap(), vec![node]);
    }

    #[test]
    fn put_node_is_last_write_wins() {
        let store = SqliteStore::new_in_memory().unwrap();
        let node = NodeRecord { name: "d1".into(), module_name: "modbus-tcp".into(), is_static: false, is_single: false, state: "stopped".into() };
        store.put_node(&node).unwrap();
        let updated = NodeRecord { module_name: "modbus-rtu".into(), ..node.clone() };
        store.put_node(&updated).unwrap();
        assert_eq!(store.list_nodes().unwrap(), vec![updated]);
    }

    #[test]
    fn setting_round_trips_through_process_restart_simulation() {
        let store = SqliteStore::new_in_memory().unwrap();
        let node = NodeRecord { name: "d1".into(), module_name: "modbus-tcp".into(), is_static: false, is_single: false, state: "stopped".into() };
        store.put_node(&node).unwrap();
        let setting = serde_json::json!({"host": "10.0.0.5", "port": 502});
        store.put_setting("d1", &setting).unwrap();

        assert_eq!(store.list_nodes().unwrap(), vec![node]);
        assert_eq!(store.get_setting("d1").unwrap(), Some(setting));
    }

    #[test]
    fn delete_group_cascades_to_its_tags() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.put_group("d1", &GroupRecord { name: "g1".into(), interval_ms: 1000 }).unwrap();
        store
            .put_tag("d1", "g1", &TagRecord { name: "t1".into(), tag_json: serde_json::json!({"area": "HR"}) })
            .unwrap();

        store.delete_group("d1", "g1").unwrap();
        assert!(store.list_groups("d1").unwrap().is_empty());
        assert!(store.list_tags("d1", "g1").unwrap().is_empty());
    }

    #[test]
    fn subscriptions_are_keyed_by_app_driver_group() {
        let store = SqliteStore::new_in_memory().unwrap();
        let sub = SubscriptionRecord { app: "a1".into(), driver: "d1".into(), group: "g1".into(), params: None, static_tags: None };
        store.put_subscription(&sub).unwrap();
        assert_eq!(store.list_subscriptions("a1").unwrap(), vec![sub.clone()]);

        store.delete_subscription("a1", "d1", "g1").unwrap();
        assert!(store.list_subscriptions("a1").unwrap().is_empty());
    }
}
