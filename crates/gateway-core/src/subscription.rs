// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription registry (C3).
//!
//! Generalizes the discovery registry's `topic_index`/`domain_index`
//! secondary-index pattern to a `(driver, group) -> [app]` forward index
//! plus an `app -> [(driver, group)]` reverse index for cascading
//! `unsub_all`.

use crate::error::GatewayError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Subscription {
    pub app: String,
    pub driver: String,
    pub group: String,
    pub params: Option<String>,
    pub static_tags: Option<String>,
    pub app_addr: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Key {
    driver: String,
    group: String,
    app: String,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    subs: HashMap<Key, Subscription>,
    by_driver_group: HashMap<(String, String), HashSet<String>>,
    by_app: HashMap<String, HashSet<(String, String)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sub(
        &mut self,
        driver: impl Into<String>,
        app: impl Into<String>,
        group: impl Into<String>,
        params: Option<String>,
        static_tags: Option<String>,
        app_addr: impl Into<String>,
    ) -> Result<(), GatewayError> {
        let driver = driver.into();
        let app = app.into();
        let group = group.into();
        let key = Key { driver: driver.clone(), group: group.clone(), app: app.clone() };
        if self.subs.contains_key(&key) {
            return Err(GatewayError::AlreadySubscribed { driver, group, app });
        }
        self.by_driver_group
            .entry((driver.clone(), group.clone()))
            .or_default()
            .insert(app.clone());
        self.by_app
            .entry(app.clone())
            .or_default()
            .insert((driver.clone(), group.clone()));
        self.subs.insert(
            key,
            Subscription { app, driver, group, params, static_tags, app_addr: app_addr.into() },
        );
        Ok(())
    }

    pub fn unsub(&mut self, driver: &str, app: &str, group: &str) -> Result<(), GatewayError> {
        let key = Key { driver: driver.to_string(), group: group.to_string(), app: app.to_string() };
        if self.subs.remove(&key).is_none() {
            return Err(GatewayError::NotSubscribed {
                driver: driver.to_string(),
                group: group.to_string(),
                app: app.to_string(),
            });
        }
        if let Some(set) = self.by_driver_group.get_mut(&(driver.to_string(), group.to_string())) {
            set.remove(app);
        }
        if let Some(set) = self.by_app.get_mut(app) {
            set.remove(&(driver.to_string(), group.to_string()));
        }
        Ok(())
    }

    pub fn update_params(
        &mut self,
        app: &str,
        driver: &str,
        group: &str,
        params: Option<String>,
        static_tags: Option<String>,
    ) -> Result<(), GatewayError> {
        let key = Key { driver: driver.to_string(), group: group.to_string(), app: app.to_string() };
        let sub = self.subs.get_mut(&key).ok_or_else(|| GatewayError::NotSubscribed {
            driver: driver.to_string(),
            group: group.to_string(),
            app: app.to_string(),
        })?;
        sub.params = params;
        sub.static_tags = static_tags;
        Ok(())
    }

    /// Apps subscribed to a `(driver, group)`.
    pub fn find(&self, driver: &str, group: &str) -> Vec<&Subscription> {
        self.by_driver_group
            .get(&(driver.to_string(), group.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|app| {
                self.subs.get(&Key { driver: driver.to_string(), group: group.to_string(), app: app.clone() })
            })
            .collect()
    }

    pub fn find_by_driver(&self, driver: &str) -> Vec<&Subscription> {
        self.subs.values().filter(|s| s.driver == driver).collect()
    }

    pub fn get(&self, app: &str, driver: Option<&str>, group: Option<&str>) -> Vec<&Subscription> {
        self.by_app
            .get(app)
            .into_iter()
            .flatten()
            .filter(|(d, g)| driver.map(|want| d.contains(want)).unwrap_or(true) && group.map(|want| g.contains(want)).unwrap_or(true))
            .filter_map(|(d, g)| self.subs.get(&Key { driver: d.clone(), group: g.clone(), app: app.to_string() }))
            .collect()
    }

    pub fn update_app_name(&mut self, old: &str, new: &str) {
        if let Some(pairs) = self.by_app.remove(old) {
            for (driver, group) in &pairs {
                if let Some(mut sub) = self.subs.remove(&Key { driver: driver.clone(), group: group.clone(), app: old.to_string() }) {
                    sub.app = new.to_string();
                    self.subs.insert(Key { driver: driver.clone(), group: group.clone(), app: new.to_string() }, sub);
                    if let Some(set) = self.by_driver_group.get_mut(&(driver.clone(), group.clone())) {
                        set.remove(old);
                        set.insert(new.to_string());
                    }
                }
            }
            self.by_app.insert(new.to_string(), pairs);
        }
    }

    pub fn update_driver_name(&mut self, old: &str, new: &str) {
        let affected: Vec<Key> = self.subs.keys().filter(|k| k.driver == old).cloned().collect();
        for key in affected {
            if let Some(mut sub) = self.subs.remove(&key) {
                sub.driver = new.to_string();
                let app = sub.app.clone();
                let group = sub.group.clone();
                if let Some(set) = self.by_driver_group.remove(&(old.to_string(), group.clone())) {
                    self.by_driver_group.entry((new.to_string(), group.clone())).or_default().extend(set);
                }
                if let Some(set) = self.by_app.get_mut(&app) {
                    set.remove(&(old.to_string(), group.clone()));
                    set.insert((new.to_string(), group.clone()));
                }
                self.subs.insert(Key { driver: new.to_string(), group, app }, sub);
            }
        }
    }

    pub fn update_group_name(&mut self, driver: &str, old: &str, new: &str) {
        if let Some(apps) = self.by_driver_group.remove(&(driver.to_string(), old.to_string())) {
            for app in &apps {
                if let Some(mut sub) = self.subs.remove(&Key { driver: driver.to_string(), group: old.to_string(), app: app.clone() }) {
                    sub.group = new.to_string();
                    self.subs.insert(Key { driver: driver.to_string(), group: new.to_string(), app: app.clone() }, sub);
                    if let Some(set) = self.by_app.get_mut(app) {
                        set.remove(&(driver.to_string(), old.to_string()));
                        set.insert((driver.to_string(), new.to_string()));
                    }
                }
            }
            self.by_driver_group.insert((driver.to_string(), new.to_string()), apps);
        }
    }

    /// Drop all subscriptions for `driver` (and `group`, if given). Used
    /// on node deletion cascades.
    pub fn remove(&mut self, driver: &str, group: Option<&str>) {
        let victims: Vec<Key> = self
            .subs
            .keys()
            .filter(|k| k.driver == driver && group.map(|g| g == k.group).unwrap_or(true))
            .cloned()
            .collect();
        for key in victims {
            self.subs.remove(&key);
            if let Some(set) = self.by_driver_group.get_mut(&(key.driver.clone(), key.group.clone())) {
                set.remove(&key.app);
            }
            if let Some(set) = self.by_app.get_mut(&key.app) {
                set.remove(&(key.driver.clone(), key.group.clone()));
            }
        }
    }

    pub fn unsub_all(&mut self, app: &str) {
        if let Some(pairs) = self.by_app.remove(app) {
            for (driver, group) in pairs {
                self.subs.remove(&Key { driver: driver.clone(), group: group.clone(), app: app.to_string() });
                if let Some(set) = self.by_driver_group.get_mut(&(driver, group)) {
                    set.remove(app);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_then_find() {
        let mut reg = SubscriptionRegistry::new();
        reg.sub("d1", "a1", "g1", None, None, "addr1").unwrap();
        assert_eq!(reg.find("d1", "g1").len(), 1);
    }

    #[test]
    fn duplicate_sub_rejected() {
        let mut reg = SubscriptionRegistry::new();
        reg.sub("d1", "a1", "g1", None, None, "addr1").unwrap();
        assert!(reg.sub("d1", "a1", "g1", None, None, "addr1").is_err());
    }

    #[test]
    fn unsub_then_sub_roundtrip_restores_empty_index() {
        let mut reg = SubscriptionRegistry::new();
        reg.sub("d1", "a1", "g1", None, None, "addr1").unwrap();
        reg.unsub("d1", "a1", "g1").unwrap();
        assert!(reg.find("d1", "g1").is_empty());
        assert!(reg.get("a1", None, None).is_empty());
    }

    #[test]
    fn node_delete_cascades_removes_all_driver_subs() {
        let mut reg = SubscriptionRegistry::new();
        reg.sub("d1", "a1", "g1", None, None, "addr1").unwrap();
        reg.sub("d1", "a2", "g1", None, None, "addr2").unwrap();
        reg.remove("d1", None);
        assert!(reg.find("d1", "g1").is_empty());
        assert!(reg.get("a1", None, None).is_empty());
        assert!(reg.get("a2", None, None).is_empty());
    }

    #[test]
    fn get_matches_driver_and_group_by_substring() {
        let mut reg = SubscriptionRegistry::new();
        reg.sub("plc-north", "a1", "line-1-temps", None, None, "addr1").unwrap();
        assert_eq!(reg.get("a1", Some("north"), None).len(), 1);
        assert_eq!(reg.get("a1", None, Some("temps")).len(), 1);
        assert!(reg.get("a1", Some("south"), None).is_empty());
    }

    #[test]
    fn unsub_all_drops_only_that_app() {
        let mut reg = SubscriptionRegistry::new();
        reg.sub("d1", "a1", "g1", None, None, "addr1").unwrap();
        reg.sub("d1", "a2", "g1", None, None, "addr2").unwrap();
        reg.unsub_all("a1");
        assert_eq!(reg.find("d1", "g1").len(), 1);
        assert_eq!(reg.find("d1", "g1")[0].app, "a2");
    }
}
