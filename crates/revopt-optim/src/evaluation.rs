//! Function/gradient evaluation shared by the gradient-based engines.
//!
//! An engine asks for `f` and `g` at a point. With an analytic gradient this
//! is a single [`Request::FunctionGradient`]. In numerical differentiation
//! mode it becomes a base [`Request::Function`] followed by one
//! [`Request::Function`] per stencil sample; the evaluator moves the
//! caller-visible `x` over the samples and restores it afterwards.

use revopt_core::{
    numerical_diff::NumericalGradient,
    optimizer::{Report, Request},
    types::{DVector, Real},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Analytic,
    Base,
    Sample,
}

#[derive(Debug, Clone)]
pub(crate) struct GradientEvaluator {
    numeric: Option<NumericalGradient>,
    point: DVector,
    f0: Real,
    phase: Phase,
}

impl GradientEvaluator {
    pub(crate) fn analytic(n: usize) -> Self {
        Self {
            numeric: None,
            point: DVector::zeros(n),
            f0: 0.0,
            phase: Phase::Idle,
        }
    }

    pub(crate) fn numeric(n: usize, diff_step: Real) -> Result<Self> {
        Ok(Self {
            numeric: Some(NumericalGradient::new(diff_step)?),
            ..Self::analytic(n)
        })
    }

    pub(crate) fn is_numeric(&self) -> bool {
        self.numeric.is_some()
    }

    /// Keeps sample points inside `[lower, upper]`.
    pub(crate) fn set_bounds(&mut self, lower: DVector, upper: DVector) {
        if let Some(ng) = self.numeric.as_mut() {
            ng.set_bounds(lower, upper);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Starts an evaluation at `point`; `x` receives the first point to query.
    pub(crate) fn begin(&mut self, point: &DVector, x: &mut DVector) -> Request {
        self.point.copy_from(point);
        x.copy_from(point);
        if self.numeric.is_some() {
            self.phase = Phase::Base;
            Request::Function
        } else {
            self.phase = Phase::Analytic;
            Request::FunctionGradient
        }
    }

    /// Consumes the caller's answer.
    ///
    /// Returns the next request while samples remain. `None` means the
    /// evaluation is complete: `x` is back at the evaluation point and `f`,
    /// `g` hold the value and the gradient there.
    pub(crate) fn resume(
        &mut self,
        x: &mut DVector,
        f: &mut Real,
        g: &mut DVector,
        s: &DVector,
        report: &mut Report,
    ) -> Option<Request> {
        match self.phase {
            Phase::Idle => None,
            Phase::Analytic => {
                report.function_evaluations += 1;
                report.gradient_evaluations += 1;
                self.phase = Phase::Idle;
                None
            }
            Phase::Base => {
                report.function_evaluations += 1;
                self.f0 = *f;
                if let Some(ng) = self.numeric.as_mut() {
                    ng.start(&self.point, s);
                }
                self.phase = Phase::Sample;
                self.next_sample(x, f, g, report)
            }
            Phase::Sample => {
                report.function_evaluations += 1;
                if let Some(ng) = self.numeric.as_mut() {
                    ng.record(*f);
                }
                self.next_sample(x, f, g, report)
            }
        }
    }

    fn next_sample(
        &mut self,
        x: &mut DVector,
        f: &mut Real,
        g: &mut DVector,
        report: &mut Report,
    ) -> Option<Request> {
        let ng = self.numeric.as_ref()?;
        x.copy_from(&self.point);
        match ng.next_sample() {
            Some((i, v)) => {
                x[i] = v;
                Some(Request::Function)
            }
            None => {
                *f = self.f0;
                g.copy_from(ng.gradient());
                report.gradient_evaluations += 1;
                self.phase = Phase::Idle;
                None
            }
        }
    }
}
