use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::ingest::{DepthSensor, SyntheticSensor};

use super::backends::StubEngine;
use super::engine::PoseEngine;

/// Creates a fresh engine instance. Every detector owns its own instance.
pub type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn PoseEngine>> + Send + Sync>;

/// Opens a depth-sensor handle (not yet bound to a device index).
pub type SensorFactory = Box<dyn Fn() -> Result<Box<dyn DepthSensor>> + Send + Sync>;

/// Registry of engine and sensor factories, looked up by name.
pub struct EngineRegistry {
    engines: HashMap<String, EngineFactory>,
    default_name: Option<String>,
    sensor: Option<SensorFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            default_name: None,
            sensor: None,
        }
    }

    /// Registry with the in-process `stub` engine and the synthetic sensor.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", || Ok(Arc::new(StubEngine::new()) as Arc<dyn PoseEngine>));
        registry.register_sensor(|| Ok(Box::new(SyntheticSensor::default()) as Box<dyn DepthSensor>));
        registry
    }

    /// Register an engine factory. The first registered engine becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn PoseEngine>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.engines.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_sensor<F>(&mut self, factory: F)
    where
        F: Fn() -> Result<Box<dyn DepthSensor>> + Send + Sync + 'static,
    {
        self.sensor = Some(Box::new(factory));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(anyhow!("engine '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Create a new instance of the named engine.
    pub fn create(&self, name: &str) -> Result<Arc<dyn PoseEngine>> {
        let factory = self
            .engines
            .get(name)
            .ok_or_else(|| anyhow!("engine '{}' not registered", name))?;
        factory()
    }

    pub fn create_default(&self) -> Result<Arc<dyn PoseEngine>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no engine registered"))?;
        self.create(name)
    }

    pub fn create_sensor(&self) -> Result<Box<dyn DepthSensor>> {
        let factory = self
            .sensor
            .as_ref()
            .ok_or_else(|| anyhow!("no depth sensor registered"))?;
        factory()
    }

    /// List registered engine names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
