//! Errors surfaced by synthesis.

use std::fmt::Display;

use thiserror::Error;

use crate::grid::Geometry;
use crate::location::Location;

/// Reasons a synthesis run may fail outright.
///
/// An unsatisfiable trial is not an error, and neither is running out of trials;
/// see [`SearchOutcome`](crate::search::SearchOutcome).
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The satisfiability backend faulted; the whole search is abandoned.
    #[error("backend failed on trial ({geometry}): {message}")]
    Backend {
        /// The trial being solved.
        geometry: Geometry,
        /// What the backend reported.
        message: String,
    },
    /// Variables or views did not fit the array shape of the trial.
    #[error("variable array shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// A [`SearchConfig`](crate::search::SearchConfig) with empty or zero bounds.
    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),
    /// A view was asked about a timestep or cell outside the trial.
    #[error("t = {t}, {location} lies outside trial ({geometry})")]
    OutOfBounds {
        /// The trial that was solved.
        geometry: Geometry,
        /// The requested timestep.
        t: usize,
        /// The requested cell.
        location: Location,
    },
}

impl SynthesisError {
    pub(crate) fn backend(geometry: Geometry, error: impl Display) -> Self {
        Self::Backend { geometry, message: error.to_string() }
    }
}
