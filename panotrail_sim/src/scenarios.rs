//! Navigation scenarios for deterministic session testing.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// NAV-001: Walk the whole track and bounce off both ends
    BoundaryWalk,

    /// NAV-002: Switching sides twice restores the view
    ToggleInvolution,

    /// NAV-003: Viewer engine moves on its own, including bogus ids
    EngineDrift,

    /// NAV-004: Slow and failing image loads never corrupt the view
    StaleFetch,

    /// NAV-005: Seeded random event stream with the oracle after every event
    RandomWalk,

    /// NAV-006: Provider query contract against the synthetic graph
    ProviderContract,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::BoundaryWalk,
            ScenarioId::ToggleInvolution,
            ScenarioId::EngineDrift,
            ScenarioId::StaleFetch,
            ScenarioId::RandomWalk,
            ScenarioId::ProviderContract,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::BoundaryWalk => "boundary_walk",
            ScenarioId::ToggleInvolution => "toggle_involution",
            ScenarioId::EngineDrift => "engine_drift",
            ScenarioId::StaleFetch => "stale_fetch",
            ScenarioId::RandomWalk => "random_walk",
            ScenarioId::ProviderContract => "provider_contract",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::BoundaryWalk => "Step from the first to the last point and push past both ends",
            ScenarioId::ToggleInvolution => "Switch view twice at random points, expect the original image",
            ScenarioId::EngineDrift => "Engine reports valid, echoed and unknown image ids",
            ScenarioId::StaleFetch => "Late and failing loads are discarded without touching state",
            ScenarioId::RandomWalk => "Random map, viewer and engine events, oracle after each",
            ScenarioId::ProviderContract => "Cell, id, sequence, byte and stub queries behave as promised",
        }
    }

    /// Returns true if the scenario needs the graph provider.
    pub fn needs_provider(&self) -> bool {
        matches!(self, ScenarioId::ProviderContract)
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
            "boundary_walk" | "boundarywalk" | "nav-001" => Ok(ScenarioId::BoundaryWalk),
            "toggle_involution" | "toggleinvolution" | "nav-002" => Ok(ScenarioId::ToggleInvolution),
            "engine_drift" | "enginedrift" | "nav-003" => Ok(ScenarioId::EngineDrift),
            "stale_fetch" | "stalefetch" | "nav-004" => Ok(ScenarioId::StaleFetch),
            "random_walk" | "randomwalk" | "nav-005" => Ok(ScenarioId::RandomWalk),
            "provider_contract" | "providercontract" | "nav-006" => Ok(ScenarioId::ProviderContract),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
