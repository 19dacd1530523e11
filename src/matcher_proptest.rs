//! Property-based tests for the fragment matcher.
//!
//! These tests use proptest to generate random bodies and fragments and
//! verify that the matching contract holds for all inputs.
