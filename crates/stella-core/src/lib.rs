pub mod artifact;
pub mod comparator;
pub mod domain;
pub mod numerics;
pub mod regression;
pub mod simulation;
