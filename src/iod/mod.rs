//! # Angles-only Initial Orbit Determination (IOD)
//!
//! This module defines the [`ObservationTriple`] input type, the [`IodParams`]
//! configuration struct and its builder, the optional per-iteration [`TraceSink`],
//! and hosts the four independent IOD solvers:
//!
//! * [`laplace`] – Lagrange-differentiated line of sight, degree-8 range polynomial,
//! * [`gauss`] – direction-matrix inversion, same polynomial class, f/g refinement,
//! * [`double_r`] – two-range Newton iteration on Kepler-equation consistency,
//! * [`gooding`] – two-range Halley iteration with a Lambert/Kepler range oracle.
//!
//! ## Purpose of `IodParams`
//!
//! Every iteration cap and tolerance in the crate is injectable so an embedding
//! pipeline can bound worst-case latency; the defaults reproduce the reference
//! caps (50 for Kepler/universal anomaly, 8 outer Double-R iterations, 3 Lambert
//! restarts for Gooding) for output parity.
//!
//! ## Example
//!
//! ```rust,no_run
//! use orbdet::iod::IodParams;
//!
//! let params = IodParams::builder()
//!     .gauss_refine(true)
//!     .doubler_max_outer(20)
//!     .halley_eps(1e-10)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::constants::{Radian, Seconds};
use crate::orbdet_errors::OrbdetError;
use crate::state_vector::Epoch;

pub mod double_r;
pub mod gauss;
pub mod gooding;
pub mod laplace;
pub mod poly8;

/// One angles-only observation: a unit line-of-sight direction, the observing
/// site position in the common inertial frame, and the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unit line-of-sight vector from site to target (inertial frame)
    pub los: Vector3<f64>,
    /// Site position in the same inertial frame (km)
    pub site_eci: Vector3<f64>,
    /// Observation epoch
    pub epoch: Epoch,
}

impl Observation {
    pub fn new(los: Vector3<f64>, site_eci: Vector3<f64>, epoch: Epoch) -> Observation {
        Observation {
            los: los.normalize(),
            site_eci,
            epoch,
        }
    }
}

/// Three time-ordered angles-only observations.
///
/// Invariant: the three epochs strictly increase. Equal or out-of-order epochs are a
/// precondition violation rejected at construction, so the solvers never re-check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationTriple {
    obs: [Observation; 3],
}

impl ObservationTriple {
    /// Build a triple, validating that the epochs strictly increase.
    pub fn new(
        first: Observation,
        middle: Observation,
        last: Observation,
    ) -> Result<ObservationTriple, OrbdetError> {
        if middle.epoch.seconds_from(&first.epoch) <= 0.0
            || last.epoch.seconds_from(&middle.epoch) <= 0.0
        {
            return Err(OrbdetError::NonIncreasingEpochs);
        }
        Ok(ObservationTriple {
            obs: [first, middle, last],
        })
    }

    #[inline]
    pub fn first(&self) -> &Observation {
        &self.obs[0]
    }

    #[inline]
    pub fn middle(&self) -> &Observation {
        &self.obs[1]
    }

    #[inline]
    pub fn last(&self) -> &Observation {
        &self.obs[2]
    }

    /// Signed interval `t1 − t2` in seconds (negative by construction).
    #[inline]
    pub fn tau1(&self) -> Seconds {
        self.obs[0].epoch.seconds_from(&self.obs[1].epoch)
    }

    /// Signed interval `t3 − t2` in seconds (positive by construction).
    #[inline]
    pub fn tau3(&self) -> Seconds {
        self.obs[2].epoch.seconds_from(&self.obs[1].epoch)
    }

    /// Lazy sequence of noisy triple realizations for Monte Carlo error propagation.
    ///
    /// Always yields the **original triple first**, followed by `n_realizations`
    /// synthetic copies where each line of sight is tilted by Gaussian angular noise:
    /// two independent `N(0, 1)` draws scaled by the per-observation 1-σ uncertainty
    /// (times `noise_scale`), applied along two axes perpendicular to the nominal
    /// direction, then renormalized.
    ///
    /// Arguments
    /// -----------------
    /// * `sigma_los` – 1-σ angular uncertainty per observation (radians).
    /// * `n_realizations` – Number of noisy copies (excluding the original).
    /// * `noise_scale` – Scalar multiplier on the uncertainties.
    /// * `rng` – Random number generator for the standard normal draws.
    pub fn realizations_iter<'a, R: Rng + 'a>(
        &'a self,
        sigma_los: &'a [Radian; 3],
        n_realizations: usize,
        noise_scale: f64,
        rng: &'a mut R,
    ) -> impl Iterator<Item = ObservationTriple> + 'a {
        let mut i = 0usize;

        std::iter::from_fn(move || {
            if i == 0 {
                i += 1;
                return Some(*self);
            }
            if i > n_realizations {
                return None;
            }
            i += 1;

            let mut obs = self.obs;
            for (k, o) in obs.iter_mut().enumerate() {
                let sigma = sigma_los[k] * noise_scale;
                // Two axes perpendicular to the nominal direction.
                let helper = if o.los.x.abs() < 0.9 {
                    Vector3::x()
                } else {
                    Vector3::y()
                };
                let u = o.los.cross(&helper).normalize();
                let w = o.los.cross(&u);

                let (zu, zw): (f64, f64) =
                    (rng.sample(StandardNormal), rng.sample(StandardNormal));
                o.los = (o.los + u * (zu * sigma) + w * (zw * sigma)).normalize();
            }
            Some(ObservationTriple { obs })
        })
    }
}

// -------------------------------------------------------------------------------------------------
// Structured iteration tracing
// -------------------------------------------------------------------------------------------------

/// One per-iteration record emitted by the iterative solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationRecord {
    /// Solver tag (e.g. `"double_r"`, `"gooding"`)
    pub solver: &'static str,
    /// Iteration number, 1-based
    pub iteration: usize,
    /// Scalar convergence residual at this iteration
    pub residual: f64,
    /// Current estimate(s): ψ for Lambert, the two range magnitudes for Double-R/Gooding
    pub estimates: [f64; 2],
}

/// Optional structured trace consumer, carried in [`IodParams`].
///
/// Never required for correctness: the solvers call [`TraceSink::record`] once per
/// iteration and otherwise ignore the sink entirely.
pub trait TraceSink: Send + Sync {
    fn record(&self, rec: &IterationRecord);
}

/// A [`TraceSink`] that buffers every record in memory.
#[derive(Default)]
pub struct RecordingTrace {
    records: Mutex<Vec<IterationRecord>>,
}

impl RecordingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records collected so far.
    pub fn snapshot(&self) -> Vec<IterationRecord> {
        self.records.lock().expect("trace mutex poisoned").clone()
    }
}

impl TraceSink for RecordingTrace {
    fn record(&self, rec: &IterationRecord) {
        self.records.lock().expect("trace mutex poisoned").push(*rec);
    }
}

// -------------------------------------------------------------------------------------------------
// Solver configuration
// -------------------------------------------------------------------------------------------------

/// Configuration parameters shared by the Lambert and IOD solvers.
///
/// Fields
/// -----------------
/// **Universal-variable / Kepler**
/// * `kepler_max_iter` – Newton cap for the universal anomaly (reference: 50).
///
/// **Lambert**
/// * `lambert_max_iter` – ψ iteration cap for the universal-variable solver.
/// * `lambert_tof_tol_sec` – time-of-flight convergence tolerance (s).
/// * `lambert_singularity_tol` – threshold on `1 + cos Δν` below which the
///   universal-variable formulation delegates to Battin (near-180° transfers).
/// * `battin_max_iter` – outer iteration cap for the Battin recursion.
/// * `battin_cf_eps` – continued-fraction truncation tolerance.
///
/// **Degree-8 range polynomial (Laplace / Gauss)**
/// * `halley_max_iter`, `halley_eps` – Halley iteration controls (canonical units).
/// * `laplace_seed_er` – fixed range seed in Earth radii (GPS-altitude heuristic).
/// * `aberth_max_iter`, `aberth_eps`, `root_imag_eps` – Aberth–Ehrlich census controls.
///
/// **Gauss refinement**
/// * `gauss_refine` – enable the differential-correction loop (reference default: off).
/// * `gauss_refine_max_iter`, `gauss_refine_tol_km` – its cap and range tolerance.
///
/// **Double-R**
/// * `doubler_max_outer` – outer Newton cap (reference: 8).
/// * `doubler_range_tol_km` – convergence tolerance on both range updates.
/// * `doubler_step_clamp` – maximum single-step fraction of a range magnitude.
///
/// **Gooding**
/// * `gooding_max_iter` – Halley iteration cap.
/// * `gooding_crit_val` – scaled-residual convergence threshold.
/// * `gooding_pert_frac` – finite-difference perturbation fraction.
/// * `gooding_max_restarts` – Lambert-failure restart budget (reference: 3).
///
/// **Tracing**
/// * `trace` – optional [`TraceSink`] receiving one record per iteration.
#[derive(Clone)]
pub struct IodParams {
    pub kepler_max_iter: usize,

    pub lambert_max_iter: usize,
    pub lambert_tof_tol_sec: f64,
    pub lambert_singularity_tol: f64,
    pub battin_max_iter: usize,
    pub battin_cf_eps: f64,

    pub halley_max_iter: usize,
    pub halley_eps: f64,
    pub laplace_seed_er: f64,
    pub aberth_max_iter: u32,
    pub aberth_eps: f64,
    pub root_imag_eps: f64,

    pub gauss_refine: bool,
    pub gauss_refine_max_iter: usize,
    pub gauss_refine_tol_km: f64,

    pub doubler_max_outer: usize,
    pub doubler_range_tol_km: f64,
    pub doubler_step_clamp: f64,

    pub gooding_max_iter: usize,
    pub gooding_crit_val: f64,
    pub gooding_pert_frac: f64,
    pub gooding_max_restarts: usize,

    pub trace: Option<Arc<dyn TraceSink>>,
}

impl IodParams {
    /// Construct an [`IodParams`] with the reference default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`IodParamsBuilder`] for fluent configuration.
    pub fn builder() -> IodParamsBuilder {
        IodParamsBuilder::new()
    }

    /// Emit an iteration record to the configured trace sink, if any.
    #[inline]
    pub(crate) fn emit(&self, rec: IterationRecord) {
        if let Some(sink) = &self.trace {
            sink.record(&rec);
        }
    }
}

impl Default for IodParams {
    fn default() -> Self {
        IodParams {
            kepler_max_iter: 50,

            lambert_max_iter: 40,
            lambert_tof_tol_sec: 1e-6,
            lambert_singularity_tol: 1e-3,
            battin_max_iter: 30,
            battin_cf_eps: 1e-9,

            halley_max_iter: 15,
            halley_eps: 1e-8,
            laplace_seed_er: 3.13,
            aberth_max_iter: 50,
            aberth_eps: 1e-6,
            root_imag_eps: 1e-6,

            gauss_refine: false,
            gauss_refine_max_iter: 15,
            gauss_refine_tol_km: 0.1,

            doubler_max_outer: 8,
            doubler_range_tol_km: 1.0,
            doubler_step_clamp: 0.10,

            gooding_max_iter: 25,
            gooding_crit_val: 1e-10,
            gooding_pert_frac: 1e-5,
            gooding_max_restarts: 3,

            trace: None,
        }
    }
}

impl fmt::Debug for IodParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IodParams")
            .field("kepler_max_iter", &self.kepler_max_iter)
            .field("lambert_max_iter", &self.lambert_max_iter)
            .field("lambert_tof_tol_sec", &self.lambert_tof_tol_sec)
            .field("lambert_singularity_tol", &self.lambert_singularity_tol)
            .field("battin_max_iter", &self.battin_max_iter)
            .field("battin_cf_eps", &self.battin_cf_eps)
            .field("halley_max_iter", &self.halley_max_iter)
            .field("halley_eps", &self.halley_eps)
            .field("laplace_seed_er", &self.laplace_seed_er)
            .field("aberth_max_iter", &self.aberth_max_iter)
            .field("aberth_eps", &self.aberth_eps)
            .field("root_imag_eps", &self.root_imag_eps)
            .field("gauss_refine", &self.gauss_refine)
            .field("gauss_refine_max_iter", &self.gauss_refine_max_iter)
            .field("gauss_refine_tol_km", &self.gauss_refine_tol_km)
            .field("doubler_max_outer", &self.doubler_max_outer)
            .field("doubler_range_tol_km", &self.doubler_range_tol_km)
            .field("doubler_step_clamp", &self.doubler_step_clamp)
            .field("gooding_max_iter", &self.gooding_max_iter)
            .field("gooding_crit_val", &self.gooding_crit_val)
            .field("gooding_pert_frac", &self.gooding_pert_frac)
            .field("gooding_max_restarts", &self.gooding_max_restarts)
            .field("trace", &self.trace.as_ref().map(|_| "TraceSink"))
            .finish()
    }
}

/// Builder for [`IodParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct IodParamsBuilder {
    params: IodParams,
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, v: $ty) -> Self {
            self.params.$name = v;
            self
        }
    };
}

impl IodParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: IodParams::default(),
        }
    }

    setter!(kepler_max_iter, usize);
    setter!(lambert_max_iter, usize);
    setter!(lambert_tof_tol_sec, f64);
    setter!(lambert_singularity_tol, f64);
    setter!(battin_max_iter, usize);
    setter!(battin_cf_eps, f64);
    setter!(halley_max_iter, usize);
    setter!(halley_eps, f64);
    setter!(laplace_seed_er, f64);
    setter!(aberth_max_iter, u32);
    setter!(aberth_eps, f64);
    setter!(root_imag_eps, f64);
    setter!(gauss_refine, bool);
    setter!(gauss_refine_max_iter, usize);
    setter!(gauss_refine_tol_km, f64);
    setter!(doubler_max_outer, usize);
    setter!(doubler_range_tol_km, f64);
    setter!(doubler_step_clamp, f64);
    setter!(gooding_max_iter, usize);
    setter!(gooding_crit_val, f64);
    setter!(gooding_pert_frac, f64);
    setter!(gooding_max_restarts, usize);

    pub fn trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.params.trace = Some(sink);
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(std::cmp::Ordering::Greater)
    }

    /// Finalize the builder, validating parameter consistency.
    ///
    /// Validation rules
    /// -----------------
    /// * every tolerance strictly positive,
    /// * every iteration cap at least 1,
    /// * `doubler_step_clamp` in `(0, 1]`,
    /// * `laplace_seed_er > 1` (the seed must sit above the surface).
    pub fn build(self) -> Result<IodParams, OrbdetError> {
        let p = &self.params;

        for (name, v) in [
            ("lambert_tof_tol_sec", p.lambert_tof_tol_sec),
            ("lambert_singularity_tol", p.lambert_singularity_tol),
            ("battin_cf_eps", p.battin_cf_eps),
            ("halley_eps", p.halley_eps),
            ("aberth_eps", p.aberth_eps),
            ("gauss_refine_tol_km", p.gauss_refine_tol_km),
            ("doubler_range_tol_km", p.doubler_range_tol_km),
            ("gooding_crit_val", p.gooding_crit_val),
            ("gooding_pert_frac", p.gooding_pert_frac),
        ] {
            if !Self::gt0(v) {
                return Err(OrbdetError::InvalidIodParameter(format!(
                    "{name} must be > 0"
                )));
            }
        }
        if !Self::gt0(p.root_imag_eps) {
            return Err(OrbdetError::InvalidIodParameter(
                "root_imag_eps must be > 0".into(),
            ));
        }

        for (name, v) in [
            ("kepler_max_iter", p.kepler_max_iter),
            ("lambert_max_iter", p.lambert_max_iter),
            ("battin_max_iter", p.battin_max_iter),
            ("halley_max_iter", p.halley_max_iter),
            ("gauss_refine_max_iter", p.gauss_refine_max_iter),
            ("doubler_max_outer", p.doubler_max_outer),
            ("gooding_max_iter", p.gooding_max_iter),
        ] {
            if v == 0 {
                return Err(OrbdetError::InvalidIodParameter(format!(
                    "{name} must be >= 1"
                )));
            }
        }
        if p.aberth_max_iter == 0 {
            return Err(OrbdetError::InvalidIodParameter(
                "aberth_max_iter must be >= 1".into(),
            ));
        }

        if !(Self::gt0(p.doubler_step_clamp) && p.doubler_step_clamp <= 1.0) {
            return Err(OrbdetError::InvalidIodParameter(
                "doubler_step_clamp must be in (0, 1]".into(),
            ));
        }
        if !(p.laplace_seed_er > 1.0) {
            return Err(OrbdetError::InvalidIodParameter(
                "laplace_seed_er must be above the surface (> 1 Earth radius)".into(),
            ));
        }

        Ok(self.params)
    }
}

#[cfg(test)]
mod iod_params_test {
    use super::*;
    use crate::state_vector::Epoch;

    fn obs(t: f64) -> Observation {
        Observation::new(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(6378.0, 0.0, 0.0),
            Epoch::from_jd_split(2_460_000.5, t),
        )
    }

    #[test]
    fn test_builder_defaults_are_valid() {
        let p = IodParams::builder().build().unwrap();
        assert_eq!(p.kepler_max_iter, 50);
        assert_eq!(p.doubler_max_outer, 8);
        assert_eq!(p.gooding_max_restarts, 3);
        assert!(!p.gauss_refine);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(IodParams::builder().halley_eps(0.0).build().is_err());
        assert!(IodParams::builder().doubler_max_outer(0).build().is_err());
        assert!(IodParams::builder().doubler_step_clamp(1.5).build().is_err());
        assert!(IodParams::builder().laplace_seed_er(0.5).build().is_err());
    }

    #[test]
    fn test_triple_rejects_non_increasing_epochs() {
        assert!(ObservationTriple::new(obs(0.0), obs(0.1), obs(0.2)).is_ok());
        assert!(matches!(
            ObservationTriple::new(obs(0.0), obs(0.0), obs(0.2)),
            Err(OrbdetError::NonIncreasingEpochs)
        ));
        assert!(ObservationTriple::new(obs(0.2), obs(0.1), obs(0.0)).is_err());
    }

    #[test]
    fn test_realizations_iter_yields_original_first() {
        use rand::{rngs::StdRng, SeedableRng};

        let triple = ObservationTriple::new(obs(0.0), obs(0.1), obs(0.2)).unwrap();
        let sigmas = [1e-5, 1e-5, 1e-5];
        let mut rng = StdRng::seed_from_u64(42);

        let all: Vec<_> = triple.realizations_iter(&sigmas, 3, 1.0, &mut rng).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], triple);
        // Noisy copies keep unit line-of-sight vectors.
        for t in &all[1..] {
            assert!((t.middle().los.norm() - 1.0).abs() < 1e-12);
            assert_ne!(t.middle().los, triple.middle().los);
        }
    }

    #[test]
    fn test_recording_trace_collects() {
        let sink = Arc::new(RecordingTrace::new());
        let params = IodParams::builder().trace(sink.clone()).build().unwrap();

        params.emit(IterationRecord {
            solver: "test",
            iteration: 1,
            residual: 0.5,
            estimates: [1.0, 2.0],
        });
        let records = sink.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].iteration, 1);
    }
}
