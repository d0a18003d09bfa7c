//! Integration Tests Module
//!
//! End-to-end tests of the diagnosis pipeline through the public API:
//! Guard scenarios, the Supervisor loop with scripted telemetry, and
//! sessions persisted in SQLite across service instances.
//!
//! No network or LLM calls are made. Telemetry backends are scripted.

// Shared scripted collaborators
mod support;

// Guard classification scenarios
mod guard_test;

// Supervisor loop: budgets, verification, approval gate
mod supervisor_test;

// DiagnosisService sessions and checkpoints
mod session_test;
