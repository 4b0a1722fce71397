#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Egomotion
//!
//! Estimation of the camera egomotion and of the local surface geometry from a
//! sparse set of optical flow vectors.
//!
//! The horizontal and vertical flow are each modelled as a plane over the image,
//! `u = a_u x + b_u y + c_u` and `v = a_v x + b_v y + c_v`, fitted robustly with
//! RANSAC. The motion quantities (divergence, relative velocity, time to contact,
//! focus of expansion and surface slope) are derived from the plane parameters.
//!
//! ## Example
//!
//! ```rust
//! use kornia_egomotion::{analyze_linear_flow_field, FlowFieldConfig, FlowVector, ImageSize};
//!
//! // flow of a camera approaching a fronto-parallel surface
//! let vectors = (0..20)
//!     .map(|i| {
//!         let (x, y) = ((i * 37 % 320) as f64, (i * 53 % 240) as f64);
//!         FlowVector::new([x, y], [0.01 * (x - 160.0), 0.01 * (y - 120.0)])
//!     })
//!     .collect::<Vec<_>>();
//!
//! let size = ImageSize { width: 320, height: 240 };
//! let outcome = analyze_linear_flow_field(&vectors, size, [0.0, 0.0], &FlowFieldConfig::default())?;
//!
//! if let Some(estimate) = outcome.estimate() {
//!     println!("divergence: {}", estimate.divergence);
//!     println!("time to contact: {:?}", estimate.time_to_contact);
//! }
//! # Ok::<(), kornia_egomotion::FlowFitError>(())
//! ```

mod error;
pub use error::FlowFitError;

/// Algebraic extraction of motion and geometry from the flow planes.
pub mod extract;
pub use extract::SlopeParams;

/// Temporal filtering of the divergence.
pub mod filter;
pub use filter::{DivergenceFilter, DivergenceFilterConfig};

mod flow_field;
pub use flow_field::*;

mod linalg;

/// RANSAC fit of the flow planes.
pub mod ransac;
pub use ransac::{fit_linear_flow_field, fit_linear_flow_field_with_rng, RansacParams};

mod types;
pub use types::*;
