//! Application state management
//!
//! Central state container for the gateway: the area directory served by
//! the demo routes and process uptime.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{Area, AreaInput};

/// Central application state
#[derive(Debug)]
pub struct AppState {
    /// Areas keyed by id
    areas: HashMap<u64, Area>,
    /// Area codes already registered
    codes: HashMap<String, u64>,
    /// Application start time
    start_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new() -> Self {
        info!("Initializing application state");
        Self {
            areas: HashMap::new(),
            codes: HashMap::new(),
            start_time: Utc::now(),
        }
    }

    /// Register a new area under `id`.
    ///
    /// Fails when the parent does not exist or the area code is taken.
    pub fn add_area(&mut self, id: u64, input: AreaInput) -> AppResult<Area> {
        if let Some(existing) = self.codes.get(&input.area_code) {
            return Err(AppError::Conflict(format!(
                "Area code {} already registered as area {}",
                input.area_code, existing
            )));
        }

        let (parent_name, rule_id) = match input.parent_id {
            Some(parent_id) => {
                let parent = self.areas.get(&parent_id).ok_or_else(|| {
                    AppError::BadRequest(format!("Parent area {} does not exist", parent_id))
                })?;
                (Some(parent.name.clone()), format!("{}/{}", parent.rule_id, id))
            }
            None => (None, id.to_string()),
        };

        let area = Area {
            id,
            name: input.name,
            parent_id: input.parent_id,
            parent_name,
            area_code: input.area_code,
            zip_code: input.zip_code,
            rule_id,
        };

        debug!(area_id = id, rule_id = %area.rule_id, "Adding area to state");

        self.codes.insert(area.area_code.clone(), id);
        self.areas.insert(id, area.clone());
        Ok(area)
    }

    /// Get an area by id
    pub fn get_area(&self, id: u64) -> Option<&Area> {
        self.areas.get(&id)
    }

    /// Direct children of an area, ordered by area code
    pub fn children_of(&self, parent_id: u64) -> Vec<&Area> {
        let mut children: Vec<&Area> = self
            .areas
            .values()
            .filter(|a| a.parent_id == Some(parent_id))
            .collect();
        children.sort_by(|a, b| a.area_code.cmp(&b.area_code));
        children
    }

    /// All descendants of an area, found through the rule id prefix
    pub fn descendants_of(&self, id: u64) -> Vec<&Area> {
        let Some(area) = self.areas.get(&id) else {
            return Vec::new();
        };
        let prefix = format!("{}/", area.rule_id);

        let mut descendants: Vec<&Area> = self
            .areas
            .values()
            .filter(|a| a.rule_id.starts_with(&prefix))
            .collect();
        descendants.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        descendants
    }

    /// Number of registered areas
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.start_time).num_seconds().max(0) as u64
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
