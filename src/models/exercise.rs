use serde::{Deserialize, Serialize};

/// Training category of an exercise or a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Strength,
    Cardio,
    Hiit,
    Crossfit,
    Rehab,
}

impl Modality {
    pub const ALL: [Modality; 5] = [
        Modality::Strength,
        Modality::Cardio,
        Modality::Hiit,
        Modality::Crossfit,
        Modality::Rehab,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Strength => "strength",
            Modality::Cardio => "cardio",
            Modality::Hiit => "hiit",
            Modality::Crossfit => "crossfit",
            Modality::Rehab => "rehab",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Warmup,
    #[default]
    Working,
    Cooldown,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Warmup, Section::Working, Section::Cooldown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Warmup => "warmup",
            Section::Working => "working",
            Section::Cooldown => "cooldown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Easy,
    Moderate,
    Hard,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Easy, Intensity::Moderate, Intensity::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Easy => "easy",
            Intensity::Moderate => "moderate",
            Intensity::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossfitFormat {
    #[serde(rename = "AMRAP")]
    Amrap,
    #[serde(rename = "ForTime")]
    ForTime,
    #[serde(rename = "EMOM")]
    Emom,
}

impl CrossfitFormat {
    pub const ALL: [CrossfitFormat; 3] =
        [CrossfitFormat::Amrap, CrossfitFormat::ForTime, CrossfitFormat::Emom];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrossfitFormat::Amrap => "AMRAP",
            CrossfitFormat::ForTime => "ForTime",
            CrossfitFormat::Emom => "EMOM",
        }
    }
}

/// Prescribed reps: a fixed count or an inclusive `[low, high]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepTarget {
    Exact(u32),
    Range(u32, u32),
}

impl RepTarget {
    /// Upper bound of the prescription.
    pub fn high(&self) -> u32 {
        match self {
            RepTarget::Exact(n) => *n,
            RepTarget::Range(_, high) => *high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthTargets {
    pub sets: Option<u32>,
    pub reps: Option<RepTarget>,
    pub load_kg: Option<f64>,
    pub rir: Option<u8>,
    pub rest_sec: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardioTargets {
    pub duration_min: Option<f64>,
    pub intensity: Option<Intensity>,
    pub distance_km: Option<f64>,
}

impl CardioTargets {
    /// A cardio prescription must say how long or how far.
    pub fn has_extent(&self) -> bool {
        self.duration_min.is_some() || self.distance_km.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiitTargets {
    pub rounds: Option<u32>,
    pub work_sec: Option<u32>,
    pub rest_sec: Option<u32>,
    pub modality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossfitTargets {
    pub format: Option<CrossfitFormat>,
    pub duration_min: Option<f64>,
    pub components: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RehabTargets {
    pub sets: Option<u32>,
    pub reps: Option<u32>,
    pub pain_ceiling: Option<u8>,
    pub tempo: Option<String>,
}

/// Per-modality prescription, discriminated by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Targets {
    Strength(StrengthTargets),
    Cardio(CardioTargets),
    Hiit(HiitTargets),
    Crossfit(CrossfitTargets),
    Rehab(RehabTargets),
}

const DEFAULT_STRENGTH_REST_SEC: u32 = 90;
const DEFAULT_HIIT_REST_SEC: u32 = 30;
const DEFAULT_REHAB_REST_SEC: u32 = 60;
const DEFAULT_CARDIO_REST_SEC: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePrescription {
    pub name: String,
    #[serde(default)]
    pub section: Section,
    #[serde(flatten)]
    pub targets: Targets,
}

impl ExercisePrescription {
    pub fn modality(&self) -> Modality {
        match self.targets {
            Targets::Strength(_) => Modality::Strength,
            Targets::Cardio(_) => Modality::Cardio,
            Targets::Hiit(_) => Modality::Hiit,
            Targets::Crossfit(_) => Modality::Crossfit,
            Targets::Rehab(_) => Modality::Rehab,
        }
    }

    /// Number of sets (or rounds) the runner walks through for this exercise.
    pub fn planned_sets(&self) -> u32 {
        match &self.targets {
            Targets::Strength(t) => t.sets.unwrap_or(1).max(1),
            Targets::Rehab(t) => t.sets.unwrap_or(1).max(1),
            Targets::Hiit(t) => t.rounds.unwrap_or(1).max(1),
            Targets::Cardio(_) | Targets::Crossfit(_) => 1,
        }
    }

    /// Rest between consecutive sets of this exercise.
    pub fn rest_seconds(&self) -> u32 {
        match &self.targets {
            Targets::Strength(t) => t.rest_sec.unwrap_or(DEFAULT_STRENGTH_REST_SEC),
            Targets::Hiit(t) => t.rest_sec.unwrap_or(DEFAULT_HIIT_REST_SEC),
            Targets::Rehab(_) => DEFAULT_REHAB_REST_SEC,
            Targets::Cardio(_) | Targets::Crossfit(_) => DEFAULT_CARDIO_REST_SEC,
        }
    }

    pub fn same_name(&self, other: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(other.trim())
    }
}
