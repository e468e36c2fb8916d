//! Source generation and result verification
//!
//! The harness fills the source tensor with uniform random values in
//! `[0, 1)`, runs the pipeline, and compares the destination element-wise
//! against `source + scalar` computed in f32.

use crate::config::Tolerance;
use crate::tile::Element;
use crate::{PipelineError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Random generator for source data, seeded when reproducibility matters
pub fn source_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// `count` elements drawn uniformly from `[0, 1)` and rounded to bf16
pub fn generate_source<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Element> {
    (0..count)
        .map(|_| Element::from_f32(rng.gen_range(0.0f32..1.0)))
        .collect()
}

/// Expected output of the scalar-add transform, computed in f32
pub fn expected_scalar_add(source: &[Element], scalar: f32) -> Vec<f32> {
    source.par_iter().map(|x| x.to_f32() + scalar).collect()
}

/// One element outside tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Flat element index into the tensor
    pub index: usize,
    pub expected: f32,
    pub actual: f32,
}

/// Outcome of comparing a destination tensor against its expected values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    /// Elements compared
    pub checked: usize,
    /// Every element outside tolerance, in index order
    pub mismatches: Vec<Mismatch>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Largest absolute deviation among the mismatches
    pub fn max_error(&self) -> f32 {
        self.mismatches
            .iter()
            .map(|m| (m.expected - m.actual).abs())
            .fold(0.0, f32::max)
    }

    /// `Ok` when every element passed, otherwise a verification error
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(PipelineError::Verification {
                mismatches: self.mismatches.len(),
                checked: self.checked,
            })
        }
    }
}

/// Compare `actual` against precomputed `expected` values
pub fn verify_against(expected: &[f32], actual: &[Element], tolerance: Tolerance) -> Result<VerificationReport> {
    check_lengths(expected.len(), actual.len())?;
    Ok(collect_report(expected, actual, |e| tolerance.bound_for(e)))
}

/// Check that `result[i] ≈ source[i] + scalar` for every element
pub fn verify_scalar_add(
    source: &[Element],
    result: &[Element],
    scalar: f32,
    tolerance: Tolerance,
) -> Result<VerificationReport> {
    verify_against(&expected_scalar_add(source, scalar), result, tolerance)
}

/// Check that a `+scalar` pass followed by a `-scalar` pass restored the original values
///
/// Both legs round the intermediate `x + scalar` to bf16, so the relative
/// term is taken against `|x| + |scalar|` rather than `|x|`.
pub fn verify_round_trip(
    original: &[Element],
    restored: &[Element],
    scalar: f32,
    tolerance: Tolerance,
) -> Result<VerificationReport> {
    check_lengths(original.len(), restored.len())?;
    let expected: Vec<f32> = original.par_iter().map(|x| x.to_f32()).collect();
    let magnitude = scalar.abs();
    Ok(collect_report(&expected, restored, |e| {
        tolerance.bound_for(e.abs() + magnitude)
    }))
}

fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot verify {} elements against {} expected values",
            actual, expected
        )));
    }
    Ok(())
}

fn collect_report(expected: &[f32], actual: &[Element], bound: impl Fn(f32) -> f32 + Sync) -> VerificationReport {
    let mismatches: Vec<Mismatch> = expected
        .par_iter()
        .zip(actual.par_iter())
        .enumerate()
        .filter_map(|(index, (&expected, actual))| {
            let actual = actual.to_f32();
            ((expected - actual).abs() > bound(expected)).then_some(Mismatch {
                index,
                expected,
                actual,
            })
        })
        .collect();

    let report = VerificationReport {
        checked: actual.len(),
        mismatches,
    };
    tracing::debug!(
        checked = report.checked,
        mismatches = report.mismatches.len(),
        max_error = report.max_error(),
        "verification finished"
    );
    report
}
