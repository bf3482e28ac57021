//! Named arm poses used when a plan cannot be obtained from translation.
//!
//! [`preset_from_utterance`] scans free text for pose keywords in a fixed
//! priority order (home, lift, down, right, left).  Korean keywords match as
//! substrings; English keywords must appear as whole words, so "up" does not
//! fire on "cup".

use std::collections::BTreeMap;

/// A named joint-space pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    joints: &'static [(&'static str, f64)],
    korean: &'static [&'static str],
    english: &'static [&'static str],
}

impl Preset {
    /// Joint targets as a name → angle map.
    pub fn targets(&self) -> BTreeMap<String, f64> {
        self.joints
            .iter()
            .map(|(name, angle)| (name.to_string(), *angle))
            .collect()
    }

    fn matches(&self, lowered: &str, words: &[&str]) -> bool {
        self.korean.iter().any(|k| lowered.contains(k))
            || self.english.iter().any(|k| words.contains(k))
    }
}

/// Every preset, in keyword-matching priority order.
pub static PRESETS: [Preset; 5] = [
    Preset {
        name: "home",
        joints: &[
            ("shoulder_pan_joint", 0.0),
            ("shoulder_lift_joint", -1.57),
            ("elbow_joint", 1.57),
            ("wrist_1_joint", -1.57),
            ("wrist_2_joint", 0.0),
            ("wrist_3_joint", 0.0),
        ],
        korean: &["원위치", "홈"],
        english: &["home"],
    },
    Preset {
        name: "lift",
        joints: &[("shoulder_lift_joint", -1.0), ("elbow_joint", 1.5)],
        korean: &["들어올"],
        english: &["lift", "up"],
    },
    Preset {
        name: "down",
        joints: &[("shoulder_lift_joint", -0.6), ("elbow_joint", 1.0)],
        korean: &["내려"],
        english: &["down"],
    },
    Preset {
        name: "right",
        joints: &[("shoulder_pan_joint", 1.0)],
        korean: &["오른쪽"],
        english: &["right"],
    },
    Preset {
        name: "left",
        joints: &[("shoulder_pan_joint", -1.0)],
        korean: &["왼쪽"],
        english: &["left"],
    },
];

/// Look a preset up by its canonical name.
pub fn preset_by_name(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// First preset whose keywords appear in `text`, if any.
pub fn preset_from_utterance(text: &str) -> Option<&'static Preset> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    PRESETS.iter().find(|p| p.matches(&lowered, &words))
}
