//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Honest riders on several buses, fused positions track truth
    MorningCommute,

    /// SIM-002: Riders in cars and riders off the route try to pose as bus riders
    SpeedSpoofers,

    /// SIM-003: Old reports replayed long after they were recorded
    ReplayAttack,

    /// SIM-004: Directory goes down, then slows past the timeout, then recovers
    DirectoryOutage,

    /// SIM-005: Riders board one by one, then all get off
    CrowdSurge,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::MorningCommute,
            ScenarioId::SpeedSpoofers,
            ScenarioId::ReplayAttack,
            ScenarioId::DirectoryOutage,
            ScenarioId::CrowdSurge,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::MorningCommute => "morning_commute",
            ScenarioId::SpeedSpoofers => "speed_spoofers",
            ScenarioId::ReplayAttack => "replay_attack",
            ScenarioId::DirectoryOutage => "directory_outage",
            ScenarioId::CrowdSurge => "crowd_surge",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::MorningCommute => "3 buses, 3 riders each, fused error stays within GPS noise",
            ScenarioId::SpeedSpoofers => "car-speed and off-route spoofers are never accepted or rewarded",
            ScenarioId::ReplayAttack => "reports replayed 45 minutes late are rejected as stale",
            ScenarioId::DirectoryOutage => "outage and slow directory reject retryably and leave state intact",
            ScenarioId::CrowdSurge => "confidence grows as riders board; disembarkation clears trackers",
        }
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
            "morning_commute" | "morningcommute" | "sim-001" => Ok(ScenarioId::MorningCommute),
            "speed_spoofers" | "speedspoofers" | "sim-002" => Ok(ScenarioId::SpeedSpoofers),
            "replay_attack" | "replayattack" | "sim-003" => Ok(ScenarioId::ReplayAttack),
            "directory_outage" | "directoryoutage" | "sim-004" => Ok(ScenarioId::DirectoryOutage),
            "crowd_surge" | "crowdsurge" | "sim-005" => Ok(ScenarioId::CrowdSurge),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
