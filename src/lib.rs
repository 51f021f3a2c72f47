pub mod constants;
pub mod gibbs;
pub mod iod;
pub mod kepler;
pub mod lambert;
pub mod orbdet_errors;
pub mod state_vector;
pub mod stumpff;
