//! JSON keyframe shapes as emitted by the simulation server.
//!
//! Every field may be missing or `null`; both decode to the empty/default value so that
//! downstream code only has to deal with one representation of "nothing to do".

use serde::{Deserialize, Deserializer, Serialize};

use crate::coords;

pub const ID_UNDEFINED: i32 = -1;

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeEnvelope {
    #[serde(default, deserialize_with = "nullable")]
    pub keyframes: Vec<Keyframe>,
}

impl KeyframeEnvelope {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed keyframe envelope: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    #[serde(default, deserialize_with = "nullable")]
    pub loads: Vec<Load>,
    #[serde(default, deserialize_with = "nullable")]
    pub creations: Vec<CreationItem>,
    #[serde(default, deserialize_with = "nullable")]
    pub rig_creations: Vec<RigCreation>,
    #[serde(default, deserialize_with = "nullable")]
    pub state_updates: Vec<StateUpdate>,
    #[serde(default, deserialize_with = "nullable")]
    pub rig_updates: Vec<RigUpdate>,
    #[serde(default, deserialize_with = "nullable")]
    pub deletions: Vec<i32>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Load {
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub filepath: String,
    #[serde(default, deserialize_with = "lenient_frame")]
    pub frame: Option<Frame>,
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(default)]
    up: Option<Vec<f32>>,
    #[serde(default)]
    front: Option<Vec<f32>>,
    #[serde(default)]
    origin: Option<Vec<f32>>,
}

/// A frame with a component of the wrong length decodes to the default frame instead of
/// failing the whole envelope.
fn lenient_frame<'de, D>(deserializer: D) -> Result<Option<Frame>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(wire) = Option::<WireFrame>::deserialize(deserializer)? else {
        return Ok(None);
    };

    let defaults = Frame::default();
    let component = |list: &Option<Vec<f32>>, default: [f32; 3]| match list {
        Some(list) => coords::vec3_from_slice(list),
        None => Some(default),
    };

    let frame = match (
        component(&wire.up, defaults.up),
        component(&wire.front, defaults.front),
        component(&wire.origin, defaults.origin),
    ) {
        (Some(up), Some(front), Some(origin)) => Frame { up, front, origin },
        _ => {
            log::warn!(
                "Malformed frame up {:?} front {:?} origin {:?}, using default",
                wire.up,
                wire.front,
                wire.origin
            );
            defaults
        }
    };
    Ok(Some(frame))
}

/// Orientation basis of an asset, expressed in server coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub up: [f32; 3],
    pub front: [f32; 3],
    pub origin: [f32; 3],
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            up: [0.0, 1.0, 0.0],
            front: [0.0, 0.0, 1.0],
            origin: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationItem {
    pub instance_key: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub creation: Creation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creation {
    #[serde(default, deserialize_with = "nullable")]
    pub filepath: String,
    #[serde(default)]
    pub scale: Option<Vec<f32>>,
    #[serde(default = "undefined_id", deserialize_with = "nullable_id")]
    pub rig_id: i32,
}

impl Default for Creation {
    fn default() -> Self {
        Self {
            filepath: String::new(),
            scale: None,
            rig_id: ID_UNDEFINED,
        }
    }
}

impl Creation {
    pub fn rig(&self) -> Option<i32> {
        (self.rig_id != ID_UNDEFINED).then_some(self.rig_id)
    }
}

fn undefined_id() -> i32 {
    ID_UNDEFINED
}

fn nullable_id<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or(ID_UNDEFINED))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbsTransform {
    #[serde(default, deserialize_with = "nullable")]
    pub translation: Vec<f32>,
    #[serde(default, deserialize_with = "nullable")]
    pub rotation: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub instance_key: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub state: StateData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    #[serde(default, deserialize_with = "nullable")]
    pub abs_transform: AbsTransform,
    #[serde(default, deserialize_with = "nullable")]
    pub semantic_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RigCreation {
    pub id: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub bone_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigUpdate {
    pub id: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub pose: Vec<BoneTransform>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneTransform {
    #[serde(default, deserialize_with = "nullable")]
    pub t: Vec<f32>,
    #[serde(default, deserialize_with = "nullable")]
    pub r: Vec<f32>,
}

/// Out-of-band payload riding along with a keyframe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, deserialize_with = "nullable")]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub teleport_avatar_base_position: Option<Vec<f32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub scene_changed: bool,
    /// Non-indexed triangle list, three floats per vertex.
    #[serde(default)]
    pub navmesh_vertices: Option<Vec<f32>>,
    #[serde(default)]
    pub text_message: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub texts: Vec<ScreenText>,
    #[serde(default)]
    pub camera: Option<AbsTransform>,
    #[serde(default)]
    pub server_keyframe_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    #[serde(default, deserialize_with = "nullable")]
    pub t: Vec<f32>,
    #[serde(default = "unit_radius", deserialize_with = "nullable_radius")]
    pub r: f32,
    #[serde(default, deserialize_with = "nullable")]
    pub billboard: bool,
    #[serde(default)]
    pub color: Option<Vec<f32>>,
}

fn unit_radius() -> f32 {
    1.0
}

fn nullable_radius<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(1.0))
}

/// Text anchored in normalized screen coordinates (`[0, 1]` on both axes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenText {
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    #[serde(default, deserialize_with = "nullable")]
    pub position: Vec<f32>,
}
