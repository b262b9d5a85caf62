//! Offline playback of a recorded keyframe envelope.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use replay::scene::ResourceLoader;
use replay::{Keyframe, KeyframeEnvelope, ReplayPlayer};

/// Feeds one recorded keyframe per interval, the first one immediately.
pub struct ReplayFile {
    keyframes: VecDeque<Keyframe>,
    interval: Duration,
    next_at: Option<Instant>,
    played: usize,
}

impl ReplayFile {
    pub fn open(path: &Path, interval: Duration) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay {}", path.display()))?;
        let envelope = KeyframeEnvelope::decode(&text)
            .with_context(|| format!("Failed to decode replay {}", path.display()))?;
        Self::new(envelope, interval)
    }

    pub fn new(envelope: KeyframeEnvelope, interval: Duration) -> Result<Self> {
        if envelope.keyframes.is_empty() {
            bail!("Replay contains no keyframes");
        }
        Ok(Self {
            keyframes: envelope.keyframes.into(),
            interval,
            next_at: None,
            played: 0,
        })
    }

    pub fn update<L: ResourceLoader>(&mut self, player: &mut ReplayPlayer<L>, now: Instant) {
        if self.next_at.is_some_and(|at| now < at) {
            return;
        }
        let Some(keyframe) = self.keyframes.pop_front() else {
            return;
        };

        player.process_keyframe(keyframe, now);
        log::info!("Processed keyframe {}", self.played);
        self.played += 1;
        self.next_at = Some(now + self.interval);
    }

    pub fn is_finished(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn played(&self) -> usize {
        self.played
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay::TransformMode;
    use replay::consumers::ConsumerSet;
    use replay::scene::{LoadedAsset, NodeHandle};

    #[derive(Default)]
    struct NullLoader(u64);

    impl ResourceLoader for NullLoader {
        fn load(&mut self, _filepath: &str) -> Option<LoadedAsset> {
            self.0 += 1;
            Some(LoadedAsset::new(NodeHandle(self.0)))
        }

        fn destroy(&mut self, _node: NodeHandle) {}

        fn reclaim_unused(&mut self) {}
    }

    const RECORDING: &str = r#"{"keyframes":[
        {"loads":[{"type":0,"filepath":"a.glb"}],"creations":[{"instanceKey":1,"creation":{"filepath":"a.glb"}}]},
        {"stateUpdates":[{"instanceKey":1,"state":{"absTransform":{"translation":[0,0,2],"rotation":[1,0,0,0]}}}]},
        {"deletions":[1]}
    ]}"#;

    #[test]
    fn test_steps_one_keyframe_per_interval() {
        let envelope = KeyframeEnvelope::decode(RECORDING).unwrap();
        let mut file = ReplayFile::new(envelope, Duration::from_millis(100)).unwrap();
        let mut player =
            ReplayPlayer::new(NullLoader::default(), ConsumerSet::default(), TransformMode::Immediate);
        let t0 = Instant::now();

        file.update(&mut player, t0);
        assert_eq!(file.played(), 1);
        assert_eq!(player.registry().len(), 1);

        file.update(&mut player, t0 + Duration::from_millis(50));
        assert_eq!(file.played(), 1);

        file.update(&mut player, t0 + Duration::from_millis(100));
        assert_eq!(file.played(), 2);
        assert!(player.registry().get(1).unwrap().is_placed());

        file.update(&mut player, t0 + Duration::from_millis(200));
        assert!(file.is_finished());
        assert!(player.registry().is_empty());

        file.update(&mut player, t0 + Duration::from_millis(300));
        assert_eq!(file.played(), 3);
    }

    #[test]
    fn test_empty_recording_is_rejected() {
        let envelope = KeyframeEnvelope::decode(r#"{"keyframes":[]}"#).unwrap();
        assert!(ReplayFile::new(envelope, Duration::from_millis(100)).is_err());
    }
}
