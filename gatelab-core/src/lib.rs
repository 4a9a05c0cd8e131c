//! GateLab Core — decision gates, feature extraction, deterministic replay.
//!
//! This crate contains the heart of the evaluation engine:
//! - Domain types (candles, positions, trades, run identities)
//! - As-of feature extraction with fast/slow path equivalence
//! - Regime classification with persistence hysteresis
//! - Confidence scoring from probabilities and market quality
//! - Fibonacci retracement context (one implementation, HTF + LTF)
//! - The ordered decision gate pipeline with closed reason codes
//! - The replay loop with exit evaluation and reproducible artifacts
//! - Per-run bounded LRU feature cache keyed by (bar, window, config)

pub mod cache;
pub mod confidence;
pub mod config;
pub mod decision;
pub mod domain;
pub mod features;
pub mod fib;
pub mod indicators;
pub mod regime;
pub mod replay;
pub mod rng;
