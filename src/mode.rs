use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmconMode {
    /// No step taken yet
    Init,
    /// A step was taken and the criterion is still above epsilon
    Iterating,
    /// The criterion fell below epsilon
    Converged,
}

impl VmconMode {
    pub fn message(&self) -> &str {
        match self {
            VmconMode::Init => "Initializing solver.",
            VmconMode::Iterating => "Iteration taken, not yet converged.",
            VmconMode::Converged => "Optimization terminated successfully.",
        }
    }
}

impl std::fmt::Display for VmconMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}
