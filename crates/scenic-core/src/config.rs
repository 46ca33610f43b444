//! Render configuration.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_GROWTH_FACTOR;
use crate::error::{Error, Result};

/// How indirect draw commands are buffered across frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandBuffering {
    /// One command buffer, read and written in place.
    #[default]
    Single,
    /// Two command buffers; writes land in the next one and are published
    /// by a swap at the end of each update phase.
    Double,
}

/// Configuration for GPU batches and the per-frame system pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Initial vertex slots per batch.
    pub initial_vertex_capacity: u32,
    /// Initial index slots per batch.
    pub initial_index_capacity: u32,
    /// Initial draw command slots per batch.
    pub initial_command_capacity: u32,
    /// Initial per-instance slots per batch.
    pub initial_instance_capacity: u32,
    /// Geometric growth factor applied when a buffer runs out of capacity.
    pub growth_factor: f32,
    /// Command buffer strategy.
    pub command_buffering: CommandBuffering,
    /// Maximum components adopted per system per tick (0 = unbounded).
    pub adoption_budget: usize,
    /// Frames in flight; retired GPU storage is kept alive this long.
    pub frames_in_flight: usize,
    /// Draw the debug bounds overlay.
    pub debug_overlay: bool,
    /// Maximum main-thread completions run per frame (0 = unbounded).
    pub dispatcher_budget: usize,
    /// Texture decodes that may wait for the background worker.
    pub texture_queue_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            initial_vertex_capacity: 64 * 1024,
            initial_index_capacity: 192 * 1024,
            initial_command_capacity: 256,
            initial_instance_capacity: 256,
            growth_factor: MIN_GROWTH_FACTOR,
            command_buffering: CommandBuffering::Single,
            adoption_budget: 64,
            frames_in_flight: 2,
            debug_overlay: false,
            dispatcher_budget: 32,
            texture_queue_capacity: 64,
        }
    }
}

impl RenderConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the buffers rely on.
    pub fn validate(&self) -> Result<()> {
        if !(self.growth_factor >= MIN_GROWTH_FACTOR) {
            return Err(Error::Config(format!(
                "growth_factor must be at least {MIN_GROWTH_FACTOR}, got {}",
                self.growth_factor
            )));
        }
        if self.frames_in_flight == 0 {
            return Err(Error::Config("frames_in_flight must be at least 1".to_string()));
        }
        if self.texture_queue_capacity == 0 {
            return Err(Error::Config(
                "texture_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set every initial buffer capacity at once.
    pub fn with_initial_capacities(
        mut self,
        vertices: u32,
        indices: u32,
        commands: u32,
        instances: u32,
    ) -> Self {
        self.initial_vertex_capacity = vertices;
        self.initial_index_capacity = indices;
        self.initial_command_capacity = commands;
        self.initial_instance_capacity = instances;
        self
    }

    /// Set the command buffering strategy.
    pub fn with_command_buffering(mut self, buffering: CommandBuffering) -> Self {
        self.command_buffering = buffering;
        self
    }

    /// Set the per-tick adoption budget.
    pub fn with_adoption_budget(mut self, budget: usize) -> Self {
        self.adoption_budget = budget;
        self
    }

    /// Enable or disable the debug overlay.
    pub fn with_debug_overlay(mut self, enabled: bool) -> Self {
        self.debug_overlay = enabled;
        self
    }

    /// Set the main-thread completion budget.
    pub fn with_dispatcher_budget(mut self, budget: usize) -> Self {
        self.dispatcher_budget = budget;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RenderConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_toml() {
        let config = RenderConfig::from_toml_str(
            r#"
            command_buffering = "double"
            adoption_budget = 8
            debug_overlay = true
            "#,
        )
        .unwrap();

        assert_eq!(config.command_buffering, CommandBuffering::Double);
        assert_eq!(config.adoption_budget, 8);
        assert!(config.debug_overlay);
        assert_eq!(config.initial_command_capacity, 256);
    }

    #[test]
    fn reject_small_growth_factor() {
        let err = RenderConfig::from_toml_str("growth_factor = 1.1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn reject_zero_texture_queue() {
        let err = RenderConfig::from_toml_str("texture_queue_capacity = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let config = RenderConfig::default().with_dispatcher_budget(0);
        assert_eq!(config.dispatcher_budget, 0);
        config.validate().unwrap();
    }

    #[test]
    fn reject_zero_frames_in_flight() {
        let config = RenderConfig::default().with_frames_in_flight(0);
        assert!(config.validate().is_err());
    }
}
