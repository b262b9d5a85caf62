//! glTF-backed resource loader.
//!
//! Documents are parsed once per path and shared by every node created from them. Nodes
//! here are bookkeeping only; drawing them is left to whatever renderer embeds the viewer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use replay::scene::{LoadedAsset, NodeHandle, ResourceLoader};

#[derive(Debug)]
pub struct AssetInfo {
    pub mesh_count: usize,
    /// Skin joints with the skeleton root first, if the asset has a skin.
    pub bones: Option<Vec<String>>,
}

impl AssetInfo {
    fn from_document(document: &gltf::Document) -> Self {
        let bones = document.skins().next().map(|skin| {
            let mut names: Vec<String> = skin.joints().map(|joint| node_name(&joint)).collect();
            if let Some(root) = skin.skeleton() {
                if !skin.joints().any(|joint| joint.index() == root.index()) {
                    names.insert(0, node_name(&root));
                }
            }
            names
        });

        Self {
            mesh_count: document.meshes().count(),
            bones,
        }
    }
}

fn node_name(node: &gltf::Node) -> String {
    node.name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node_{}", node.index()))
}

pub struct GltfLoader {
    root: PathBuf,
    documents: HashMap<String, Arc<AssetInfo>>,
    nodes: HashMap<NodeHandle, String>,
    next_node: u64,
}

impl GltfLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            documents: HashMap::new(),
            nodes: HashMap::new(),
            next_node: 1,
        }
    }

    fn parse(&self, filepath: &str) -> Result<AssetInfo> {
        let path = resolve(&self.root, filepath);
        let gltf = gltf::Gltf::open(&path)
            .with_context(|| format!("Failed to parse GLTF: {}", path.display()))?;
        Ok(AssetInfo::from_document(&gltf.document))
    }

    fn info(&mut self, filepath: &str) -> Result<Arc<AssetInfo>> {
        if let Some(info) = self.documents.get(filepath) {
            return Ok(info.clone());
        }

        let info = Arc::new(self.parse(filepath)?);
        log::debug!(
            "Parsed {} ({} meshes, {} bones)",
            filepath,
            info.mesh_count,
            info.bones.as_ref().map_or(0, Vec::len)
        );
        self.documents.insert(filepath.to_string(), info.clone());
        Ok(info)
    }

    #[cfg(test)]
    fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    fn cached_documents(&self) -> usize {
        self.documents.len()
    }
}

/// Server paths are relative to the asset root; absolute paths are taken as they are.
fn resolve(root: &Path, filepath: &str) -> PathBuf {
    let path = Path::new(filepath);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

impl ResourceLoader for GltfLoader {
    fn load(&mut self, filepath: &str) -> Option<LoadedAsset> {
        let info = match self.info(filepath) {
            Ok(info) => info,
            Err(e) => {
                log::error!("{:#}", e);
                return None;
            }
        };

        let node = NodeHandle(self.next_node);
        self.next_node += 1;
        self.nodes.insert(node, filepath.to_string());

        Some(match &info.bones {
            Some(bones) => LoadedAsset::skinned(node, bones.clone()),
            None => LoadedAsset::new(node),
        })
    }

    fn destroy(&mut self, node: NodeHandle) {
        if self.nodes.remove(&node).is_none() {
            log::warn!("Destroying unknown node {:?}", node);
        }
    }

    fn reclaim_unused(&mut self) {
        let before = self.documents.len();
        let nodes = &self.nodes;
        self.documents
            .retain(|filepath, _| nodes.values().any(|used| used == filepath));
        let freed = before - self.documents.len();
        if freed > 0 {
            log::debug!("Released {} unused assets", freed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SKINNED: &str = r#"{
        "asset": {"version": "2.0"},
        "nodes": [{"name": "armature", "children": [1]}, {"name": "hip", "children": [2]}, {"name": "knee"}],
        "skins": [{"skeleton": 0, "joints": [1, 2]}]
    }"#;

    const STATIC: &str = r#"{"asset": {"version": "2.0"}, "nodes": [{"name": "box"}]}"#;

    fn asset_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("viewer-assets-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("skinned.gltf"), SKINNED).unwrap();
        fs::write(dir.join("static.gltf"), STATIC).unwrap();
        dir
    }

    #[test]
    fn test_skin_bones_include_root() {
        let dir = asset_dir("bones");
        let mut loader = GltfLoader::new(&dir);

        let skinned = loader.load("skinned.gltf").unwrap();
        assert_eq!(
            skinned.bones,
            Some(vec!["armature".to_string(), "hip".to_string(), "knee".to_string()])
        );

        let rigid = loader.load("static.gltf").unwrap();
        assert_eq!(rigid.bones, None);
        assert_ne!(skinned.node, rigid.node);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = asset_dir("missing");
        let mut loader = GltfLoader::new(&dir);
        assert!(loader.load("nowhere.glb").is_none());
        assert_eq!(loader.live_nodes(), 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reclaim_drops_unreferenced_documents() {
        let dir = asset_dir("reclaim");
        let mut loader = GltfLoader::new(&dir);

        let a = loader.load("static.gltf").unwrap();
        let b = loader.load("static.gltf").unwrap();
        loader.load("skinned.gltf").unwrap();
        assert_eq!(loader.cached_documents(), 2);

        loader.destroy(a.node);
        loader.reclaim_unused();
        assert_eq!(loader.cached_documents(), 2);

        loader.destroy(b.node);
        loader.reclaim_unused();
        assert_eq!(loader.cached_documents(), 1);
        assert_eq!(loader.live_nodes(), 1);

        let _ = fs::remove_dir_all(&dir);
    }
}
