use thiserror::Error;

/// Error taxonomy shared by every solver entry point.
///
/// These are **kinds, not exceptions-as-control-flow**: each variant names an expected
/// numerical condition a caller may want to branch on. Earth-impact and the polynomial
/// multiple-root ambiguity are *annotations* carried on success values, not errors —
/// callers may still want the numbers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrbdetError {
    #[error("{solver} failed to converge after {iterations} iterations")]
    NotConverged {
        solver: &'static str,
        iterations: usize,
    },

    #[error("multi-revolution Lambert call requires a psi boundary from the minimum-time solver")]
    MissingPsiBoundary,

    #[error("observation epochs must strictly increase")]
    NonIncreasingEpochs,

    #[error("line-of-sight direction matrix is singular (observations may be coplanar)")]
    SingularDirectionMatrix,

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),

    #[error("position vectors are not coplanar (offset {angle_rad} rad exceeds tolerance)")]
    NotCoplanar { angle_rad: f64 },

    #[error("range polynomial has no positive real root")]
    NoPositiveRoot,

    #[error("transfer geometry unusable for the universal-variable formulation")]
    ImpossibleGeometry,

    #[error("no time-of-flight solution exists for the requested transfer")]
    NoTransferSolution,

    #[error("Gooding range iteration exhausted all {attempts} Lambert restart heuristics")]
    LambertRestartExhausted { attempts: usize },

    #[error("Aberth–Ehrlich method failed to find acceptable complex roots")]
    PolynomialRootFindingFailed,

    #[error("invalid IOD parameter: {0}")]
    InvalidIodParameter(String),
}
