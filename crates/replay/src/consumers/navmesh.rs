use glam::Vec3;

use super::{FrameContext, MessageConsumer};
use crate::coords;
use crate::keyframe::Message;

/// Size of the flat plane used until the server sends a navmesh, in meters.
pub const DEFAULT_GROUND_PLANE_SIZE: f32 = 200.0;

/// Triangle soup restricting where the viewer may teleport.
#[derive(Debug, Clone, PartialEq)]
pub struct Navmesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Navmesh {
    /// Builds a mesh from a non-indexed triangle list. Winding from the server is not
    /// reliable, so `double_sided` emits each triangle in both orders.
    pub fn from_triangles(vertices: Vec<Vec3>, double_sided: bool) -> Option<Self> {
        if vertices.len() % 3 != 0 {
            log::error!("Navmesh vertex count {} is not a multiple of 3", vertices.len());
            return None;
        }

        let count = vertices.len() as u32;
        let indices = if double_sided {
            (0..count)
                .step_by(3)
                .flat_map(|i| [i, i + 1, i + 2, i, i + 2, i + 1])
                .collect()
        } else {
            (0..count).collect()
        };

        Some(Self { vertices, indices })
    }

    pub fn ground_plane(size: f32) -> Self {
        let h = size / 2.0;
        let vertices = vec![
            Vec3::new(-h, 0.0, -h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(-h, 0.0, h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(h, 0.0, h),
            Vec3::new(-h, 0.0, h),
        ];
        let indices = vec![0, 1, 2, 0, 2, 1, 3, 4, 5, 3, 5, 4];
        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone)]
pub struct NavmeshConsumer {
    pub mesh: Navmesh,
    pub revision: u32,
}

impl Default for NavmeshConsumer {
    fn default() -> Self {
        Self {
            mesh: Navmesh::ground_plane(DEFAULT_GROUND_PLANE_SIZE),
            revision: 0,
        }
    }
}

impl MessageConsumer for NavmeshConsumer {
    fn process_message(&mut self, message: &Message, _ctx: &FrameContext) {
        let Some(flat) = message.navmesh_vertices.as_deref() else {
            return;
        };
        if flat.is_empty() {
            return;
        }
        if flat.len() % 9 != 0 {
            log::error!(
                "Ignoring navmesh with {} floats, length should be a multiple of 9",
                flat.len()
            );
            return;
        }

        let vertices = flat
            .chunks_exact(3)
            .map(|v| coords::to_render_vector([v[0], v[1], v[2]]))
            .collect();

        if let Some(mesh) = Navmesh::from_triangles(vertices, true) {
            self.mesh = mesh;
            self.revision += 1;
            log::info!("Navmesh updated: {} triangles", self.mesh.triangle_count() / 2);
        }
    }
}
