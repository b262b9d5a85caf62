mod loader;
mod motion;
mod registry;
mod skeleton;

pub use loader::{LoadedAsset, NodeHandle, ResourceLoader};
pub use motion::{
    DEFAULT_KEYFRAME_RATE, MAX_KEYFRAME_RATE, MIN_KEYFRAME_RATE, MotionRecord, keyframe_interval,
};
pub use registry::{SceneInstance, SceneRegistry, TransformMode};
pub use skeleton::{BonePose, Skeleton, SkeletonError};
