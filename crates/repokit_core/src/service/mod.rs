//! Use-case services built on the unit of work.
//!
//! # Responsibility
//! - Orchestrate repository calls into business operations with a clear
//!   transactional boundary.
//! - Keep hosts (CLI, HTTP handlers) decoupled from storage details.

pub mod teacher_service;
