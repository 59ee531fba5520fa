//! Pure decision logic: the access matrix and the complaint lifecycle graph.
//! No storage, no clocks — everything here is a function of its arguments,
//! so both components are testable in isolation.

pub mod access;
pub mod lifecycle;
