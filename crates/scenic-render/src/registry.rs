//! System factories keyed by kind.

use hashbrown::HashMap;
use scenic_core::RenderConfig;
use scenic_gpu::BufferBackend;
use scenic_scene::SystemKind;

use crate::system::System;
use crate::systems::{
    CameraSystem, CullingSystem, DebugBoundsSystem, PrimitiveSystem, TransformSystem,
};

/// Builds a system on first use.
pub type SystemFactory<B> = fn(&RenderConfig) -> Box<dyn System<B>>;

/// Explicit table of system factories.
pub struct SystemRegistry<B: BufferBackend + 'static> {
    factories: HashMap<SystemKind, SystemFactory<B>>,
}

impl<B: BufferBackend + 'static> SystemRegistry<B> {
    /// Registry with no factories.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in system.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(SystemKind::Transform, |_| Box::new(TransformSystem::new()));
        registry.register(SystemKind::Camera, |_| Box::new(CameraSystem::new()));
        registry.register(SystemKind::Culling, |_| Box::new(CullingSystem::new()));
        registry.register(SystemKind::Primitive, |config| {
            Box::new(PrimitiveSystem::<B>::new(config))
        });
        registry.register(SystemKind::DebugBounds, |config| {
            Box::new(DebugBoundsSystem::<B>::new(config))
        });
        registry
    }

    /// Register or replace the factory for `kind`.
    pub fn register(&mut self, kind: SystemKind, factory: SystemFactory<B>) {
        self.factories.insert(kind, factory);
    }

    pub fn contains(&self, kind: SystemKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn create(&self, kind: SystemKind, config: &RenderConfig) -> Option<Box<dyn System<B>>> {
        self.factories.get(&kind).map(|factory| factory(config))
    }
}

impl<B: BufferBackend + 'static> Default for SystemRegistry<B> {
    fn default() -> Self {
        Self::with_defaults()
    }
}
