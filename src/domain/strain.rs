use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RoomId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrainKind {
    Indica,
    Sativa,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sensitivity {
    Low,
    Med,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrowthStage {
    Veg,
    Flower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneKind {
    Prune,
    Top,
    Defol,
    Feed,
    Harvest,
    Transplant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub day: u32,
    pub phase: GrowthStage,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: MilestoneKind,
    pub description: String,
}

/// Cultivar definition driving growth-curve timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrainProfile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StrainKind,
    pub veg_days: u32,
    pub flower_days: u32,
    pub stretch: Sensitivity,
    pub feed_sensitivity: Sensitivity,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMilestone {
    pub strain_name: String,
    pub milestone: Milestone,
}

/// Strain data handed to the engine at init.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainCatalog {
    pub flower: Vec<StrainProfile>,
    pub veg: StrainProfile,
}

impl StrainCatalog {
    pub fn find_flower(&self, id: &str) -> Option<&StrainProfile> {
        self.flower.iter().find(|s| s.id == id)
    }

    /// House catalog used by the headless runner.
    pub fn house_defaults() -> Self {
        fn milestone(day: u32, phase: GrowthStage, kind: MilestoneKind, title: &str, description: &str) -> Milestone {
            Milestone {
                id: None,
                day,
                phase,
                title: title.to_string(),
                kind,
                description: description.to_string(),
            }
        }

        let flower_sop = vec![
            milestone(1, GrowthStage::Flower, MilestoneKind::Feed, "Flip to 12/12", "Switch lights to generative cues."),
            milestone(10, GrowthStage::Flower, MilestoneKind::Prune, "Day 10 Prune", "Structural pruning."),
            milestone(21, GrowthStage::Flower, MilestoneKind::Defol, "Day 21 Strip", "Heavy defoliation."),
            milestone(22, GrowthStage::Flower, MilestoneKind::Feed, "Generative Steering", "Higher EC and drybacks for stretch control."),
            milestone(42, GrowthStage::Flower, MilestoneKind::Defol, "Wk 6 Defol", "Remove fan leaves blocking lower sites."),
            milestone(43, GrowthStage::Flower, MilestoneKind::Feed, "Vegetative Steering", "Lower EC and drybacks for bulking."),
            milestone(56, GrowthStage::Flower, MilestoneKind::Feed, "Flush Start", "Begin crop steering fade."),
            milestone(63, GrowthStage::Flower, MilestoneKind::Harvest, "Harvest", "Chop and hang."),
        ];
        let veg_sop = vec![
            milestone(1, GrowthStage::Veg, MilestoneKind::Transplant, "Transplant", "Transplant clones to 1 gal blocks."),
            milestone(14, GrowthStage::Veg, MilestoneKind::Top, "Top 1", "Top main stem."),
            milestone(21, GrowthStage::Veg, MilestoneKind::Prune, "Clean Up", "Remove bottom 30% of growth."),
        ];

        Self {
            flower: vec![
                StrainProfile {
                    id: "ATHENA_OG".to_string(),
                    name: "Athena OG (House)".to_string(),
                    kind: StrainKind::Hybrid,
                    veg_days: 14,
                    flower_days: 63,
                    stretch: Sensitivity::Med,
                    feed_sensitivity: Sensitivity::Low,
                    milestones: flower_sop.clone(),
                },
                StrainProfile {
                    id: "MAC_1".to_string(),
                    name: "MAC 1 (Cap Cut)".to_string(),
                    kind: StrainKind::Hybrid,
                    veg_days: 21,
                    flower_days: 70,
                    stretch: Sensitivity::Low,
                    feed_sensitivity: Sensitivity::Med,
                    milestones: flower_sop.into_iter().filter(|m| m.day != 63).collect(),
                },
            ],
            veg: StrainProfile {
                id: "MOTHER_STOCK".to_string(),
                name: "Mother Stock".to_string(),
                kind: StrainKind::Hybrid,
                veg_days: 28,
                flower_days: 0,
                stretch: Sensitivity::Med,
                feed_sensitivity: Sensitivity::Med,
                milestones: veg_sop,
            },
        }
    }
}

/// Archive entry written when a batch is harvested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: String,
    pub room_id: RoomId,
    pub strains: Vec<String>,
    pub veg_start_date: DateTime<Utc>,
    pub flower_start_date: Option<DateTime<Utc>>,
    pub harvest_date: DateTime<Utc>,
    pub total_days: u32,
}
