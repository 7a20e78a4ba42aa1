//! `spe-fit` library crate: single-photoelectron spectrum fitting.
//!
//! The binary (`spe`) is a thin wrapper around this library so the fitting
//! engine is testable without spawning processes.
//!
//! - `data`: charge datasets and synthetic charge generators
//! - `models`: spectrum PDFs, parameter bookkeeping, and the spectrum registry
//! - `cost`: binned/unbinned likelihoods and least squares
//! - `fit`: the minimizer adapter and camera-level batch fitting

pub mod app;
pub mod cli;
pub mod cost;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod report;
