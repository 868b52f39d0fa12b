//! Relay Runtime - Runners, teams and the experiment driver
//!
//! A race is a set of rings. Each ring (team) passes a single baton: the
//! holder relocates to its target's post, hands the baton over and waits
//! for the acknowledgement. The captain of each ring counts laps from its
//! own location and reports completion to the judge, which times trials
//! with an increasing number of laps.

pub mod events;
pub mod runner;
pub mod team;
pub mod driver;
pub mod results;
pub mod logging;

pub use events::*;
pub use runner::*;
pub use team::*;
pub use driver::*;
pub use results::*;
pub use logging::*;
