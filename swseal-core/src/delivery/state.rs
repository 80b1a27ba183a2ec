use serde::Serialize;
use std::fmt;

/// Where the loader stands with the delivered script
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// No verified script yet; requests wait
    #[default]
    Loading,
    /// A verified script is running and answers requests
    Ready,
    /// Transient failure, reset to `Loading` after a delay
    SoftFail,
    /// Missing or unverifiable script; only a restart recovers
    HardFail,
    /// The verified script faulted while running
    RunFail,
}

impl DeliveryState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryState::Loading => "LOADING",
            DeliveryState::Ready => "READY",
            DeliveryState::SoftFail => "SOFT_FAIL",
            DeliveryState::HardFail => "HARD_FAIL",
            DeliveryState::RunFail => "RUN_FAIL",
        }
    }

    /// States a queued request can be answered in
    pub fn is_resolvable(self) -> bool {
        self != DeliveryState::Loading
    }

    /// States that never recover on their own
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::HardFail | DeliveryState::RunFail)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for state in [
            DeliveryState::Loading,
            DeliveryState::Ready,
            DeliveryState::SoftFail,
            DeliveryState::HardFail,
            DeliveryState::RunFail,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeliveryState::HardFail.is_terminal());
        assert!(DeliveryState::RunFail.is_terminal());
        assert!(!DeliveryState::SoftFail.is_terminal());
        assert!(!DeliveryState::Loading.is_resolvable());
        assert!(DeliveryState::SoftFail.is_resolvable());
    }

    #[test]
    fn test_default_is_loading() {
        assert_eq!(DeliveryState::default(), DeliveryState::Loading);
    }
}
