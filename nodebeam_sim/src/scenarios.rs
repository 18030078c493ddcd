//! Physics and replication scenarios for the deterministic harness.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// NB-001: pinned node pair settles to its static stretch
    NodePairDrop,

    /// NB-002: braked truck comes to rest on bumpy terrain
    TerrainSettle,

    /// NB-003: slack rope carries no stress until taut
    RopeSlack,

    /// NB-004: overloaded beam breaks once and stays broken
    BeamBreak,

    /// NB-005: slide-node rides a sloped rail
    RailSlide,

    /// NB-006: identical results for any worker count
    ThreadDeterminism,

    /// NB-007: mirror follows a source over a lossy link
    NetworkReplay,

    /// NB-008: saved positions restore exactly until topology changes
    PositionRestore,

    /// NB-009: a diverging vehicle is frozen without disturbing others
    FaultRecovery,

    /// NB-010: stacked trucks collide with each other
    TruckPileup,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::NodePairDrop,
            ScenarioId::TerrainSettle,
            ScenarioId::RopeSlack,
            ScenarioId::BeamBreak,
            ScenarioId::RailSlide,
            ScenarioId::ThreadDeterminism,
            ScenarioId::NetworkReplay,
            ScenarioId::PositionRestore,
            ScenarioId::FaultRecovery,
            ScenarioId::TruckPileup,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::NodePairDrop => "node_pair_drop",
            ScenarioId::TerrainSettle => "terrain_settle",
            ScenarioId::RopeSlack => "rope_slack",
            ScenarioId::BeamBreak => "beam_break",
            ScenarioId::RailSlide => "rail_slide",
            ScenarioId::ThreadDeterminism => "thread_determinism",
            ScenarioId::NetworkReplay => "network_replay",
            ScenarioId::PositionRestore => "position_restore",
            ScenarioId::FaultRecovery => "fault_recovery",
            ScenarioId::TruckPileup => "truck_pileup",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::NodePairDrop => "Pinned node pair under gravity settles at 1 + mg/k",
            ScenarioId::TerrainSettle => "Parking-braked lattice truck dropped on a height field comes to rest",
            ScenarioId::RopeSlack => "Pendulum on a slack rope: zero stress while shorter than rest length",
            ScenarioId::BeamBreak => "Weight on an under-strength beam: exactly one break, never re-forms",
            ScenarioId::RailSlide => "Locked slide-node slides down a rail and stays on it",
            ScenarioId::ThreadDeterminism => "Same vehicles on 1 and N workers end bitwise identical",
            ScenarioId::NetworkReplay => "Mirror tracks its source through latency, jitter and 10% loss",
            ScenarioId::PositionRestore => "Save/load restores exactly; refused after a hook toggle",
            ScenarioId::FaultRecovery => "Unstable vehicle faults and freezes, neighbour unaffected, reset revives it",
            ScenarioId::TruckPileup => "Lattice trucks dropped onto each other make contact without faults",
        }
    }

    /// Returns true if the scenario replicates vehicles over the simulated network.
    pub fn uses_network(&self) -> bool {
        matches!(self, ScenarioId::NetworkReplay)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node_pair_drop" | "nodepairdrop" | "nb-001" => Ok(ScenarioId::NodePairDrop),
            "terrain_settle" | "terrainsettle" | "nb-002" => Ok(ScenarioId::TerrainSettle),
            "rope_slack" | "ropeslack" | "nb-003" => Ok(ScenarioId::RopeSlack),
            "beam_break" | "beambreak" | "nb-004" => Ok(ScenarioId::BeamBreak),
            "rail_slide" | "railslide" | "nb-005" => Ok(ScenarioId::RailSlide),
            "thread_determinism" | "threaddeterminism" | "nb-006" => Ok(ScenarioId::ThreadDeterminism),
            "network_replay" | "networkreplay" | "nb-007" => Ok(ScenarioId::NetworkReplay),
            "position_restore" | "positionrestore" | "nb-008" => Ok(ScenarioId::PositionRestore),
            "fault_recovery" | "faultrecovery" | "nb-009" => Ok(ScenarioId::FaultRecovery),
            "truck_pileup" | "truckpileup" | "nb-010" => Ok(ScenarioId::TruckPileup),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("NB-004".parse::<ScenarioId>(), Ok(ScenarioId::BeamBreak));
        assert_eq!("RailSlide".parse::<ScenarioId>(), Ok(ScenarioId::RailSlide));
        assert!("warp_drive".parse::<ScenarioId>().is_err());
    }
}
