/// Opaque handle to a renderable node owned by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAsset {
    pub node: NodeHandle,
    /// Skin joint names including the root, or `None` for static meshes.
    pub bones: Option<Vec<String>>,
}

impl LoadedAsset {
    pub fn new(node: NodeHandle) -> Self {
        Self { node, bones: None }
    }

    pub fn skinned(node: NodeHandle, bones: Vec<String>) -> Self {
        Self {
            node,
            bones: Some(bones),
        }
    }
}

/// Instantiates assets by server path. Rendering and GPU upload are the loader's business.
pub trait ResourceLoader {
    fn load(&mut self, filepath: &str) -> Option<LoadedAsset>;

    fn destroy(&mut self, node: NodeHandle);

    /// Frees resources no longer referenced by any live node.
    fn reclaim_unused(&mut self);
}
