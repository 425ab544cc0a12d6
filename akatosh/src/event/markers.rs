//! Marker types for event actions.

/// Marker type for synchronous actions that take no argument.
#[derive(Debug)]
pub struct WithoutScheduler {}

/// Marker type for synchronous actions that take a scheduler reference.
#[derive(Debug)]
pub struct WithScheduler {}

/// Marker type for asynchronous actions that take no argument.
#[derive(Debug)]
pub struct AsyncWithoutScheduler {}

/// Marker type for asynchronous actions that take an owned scheduler handle.
#[derive(Debug)]
pub struct AsyncWithScheduler {}
