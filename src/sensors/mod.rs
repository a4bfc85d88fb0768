//! Shaft motion sensing — quadrature position counter and the velocity
//! estimator that turns it into RPM.

pub mod encoder;
pub mod velocity;
