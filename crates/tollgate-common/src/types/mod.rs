//! Core types for the Tollgate pipeline

pub mod event;
