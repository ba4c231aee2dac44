pub mod probe;

pub use probe::{pg_probe_factory, ActivityProbe, PgActivityProbe, ProbeFactory};

#[cfg(test)]
pub use probe::MockActivityProbe;
